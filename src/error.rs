use thiserror::Error;
use tracing::{error, warn};

use crate::keys::ParseError;

/// Error severity for user-facing surfacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Warning, // recoverable, feature degraded
    Error,   // operation failed
}

/// Failure of the OS hotkey registration primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// Another process or registration already owns the combination
    #[error("hotkey '{combination}' is already registered")]
    Conflict { combination: String },

    /// The OS rejected the key code outright
    #[error("hotkey '{combination}' was rejected by the system: {reason}")]
    InvalidCombination { combination: String, reason: String },
}

/// The low-level keyboard hook could not be installed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookInstallError {
    #[error("keyboard hooks are not supported on this platform")]
    Unsupported,

    #[error("insufficient privilege to install a keyboard hook: {0}")]
    PermissionDenied(String),

    #[error("failed to install keyboard hook: {0}")]
    Os(String),
}

/// A `bind` request that did not produce a registration.
///
/// Carries the combination string exactly as the caller supplied it, so the
/// host can show the user what they typed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("invalid hotkey '{combination}': {source}")]
    Parse {
        combination: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to register hotkey '{combination}': {source}")]
    Register {
        combination: String,
        #[source]
        source: RegisterError,
    },

    #[error("fallback hotkeys are inactive, cannot bind '{combination}': {source}")]
    HookUnavailable {
        combination: String,
        #[source]
        source: HookInstallError,
    },
}

impl BindError {
    /// The combination string as the caller supplied it.
    pub fn combination(&self) -> &str {
        match self {
            Self::Parse { combination, .. }
            | Self::Register { combination, .. }
            | Self::HookUnavailable { combination, .. } => combination,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Parse { .. } => ErrorSeverity::Warning,
            Self::Register { .. } => ErrorSeverity::Error,
            Self::HookUnavailable { .. } => ErrorSeverity::Warning,
        }
    }

    pub fn title(&self) -> &'static str {
        "Hotkey Registration Failed"
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Parse { combination, source } => {
                format!("'{}' is not a valid hotkey: {}.", combination, source)
            }
            Self::Register {
                combination,
                source: RegisterError::Conflict { .. },
            } => format!(
                "Failed to register hotkey '{}'. It is already in use by another \
                 application. Try a different shortcut or close the conflicting app.",
                combination
            ),
            Self::Register {
                combination,
                source: RegisterError::InvalidCombination { reason, .. },
            } => format!(
                "Failed to register hotkey '{}'. The system rejected it ({}).",
                combination, reason
            ),
            Self::HookUnavailable { combination, source } => format!(
                "Hotkey '{}' needs a system keyboard hook, which is unavailable: {}.",
                combination, source
            ),
        }
    }
}

/// Error loading the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the caller has nothing to do with the error.
///
/// # Examples
///
/// ```ignore
/// use hotkey_dispatch::error::ResultExt;
///
/// // Log and carry on with the next binding
/// registry.bind(&combo, action).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = %err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = %err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
