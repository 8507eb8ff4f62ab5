//! Hotkey Dispatch - global hotkey registration and dispatch for desktop launchers
//!
//! Binds key combinations to actions system-wide. Ordinary combinations go
//! through the OS hotkey facility; bare Win keys, which that facility cannot
//! register, go through one shared low-level keyboard hook. Fired events
//! from either source are gated by the host's suppression check and handed
//! to a queue the host drains on its own main loop.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod keys;
pub mod logging;
pub mod registry;
pub mod service;
pub mod standard;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatch::{
    Action, ActionId, BackendKind, DispatchQueue, FireOutcome, SuppressionFlag, SuppressionGuard,
};
pub use error::{BindError, ErrorSeverity, HookInstallError, RegisterError};
pub use keys::{KeyCombination, ParseError};
pub use registry::{HotkeyRegistry, LoadReport, RegistryOptions};
pub use service::{HotkeyService, LauncherHost};
