//! Native keyboard hook seam.
//!
//! A hook delivers every keyboard event system-wide to one callback, on a
//! thread the hook owns. Dropping the `InstalledHook` uninstalls the hook and
//! joins that thread.

use std::sync::Arc;

use crate::error::HookInstallError;

/// A reserved key or any other key, as seen by the hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RawKey {
    LWin,
    RWin,
    /// Platform key code of anything that is not a Win/Command key
    Other(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub key: RawKey,
    pub direction: KeyDirection,
    /// Synthesized by software rather than a physical keyboard
    pub injected: bool,
}

impl RawKeyEvent {
    pub fn down(key: RawKey) -> Self {
        Self {
            key,
            direction: KeyDirection::Down,
            injected: false,
        }
    }

    pub fn up(key: RawKey) -> Self {
        Self {
            key,
            direction: KeyDirection::Up,
            injected: false,
        }
    }
}

/// What the hook does with the event after the callback ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookDecision {
    /// Pass the event to the rest of the hook chain
    Propagate,
    /// Keep the OS from acting on this event (Start menu on a bare Win tap)
    Swallow,
}

/// Runs on the hook thread for every keyboard event. Must return promptly.
pub type HookCallback = Box<dyn FnMut(RawKeyEvent) -> HookDecision + Send + 'static>;

/// Whether a key is physically down right now, according to the OS.
///
/// Called on the hook thread; must not block.
pub type KeyStateQuery = Arc<dyn Fn(RawKey) -> bool + Send + Sync>;

/// Live hook. Dropping it uninstalls.
pub trait InstalledHook: Send {}

pub trait HookInstaller: Send + Sync {
    fn install(&self, callback: HookCallback) -> Result<Box<dyn InstalledHook>, HookInstallError>;

    /// OS key state, used to recover from releases the hook never saw
    /// (the session locked or the secure desktop took input mid-chord).
    fn key_state(&self) -> Option<KeyStateQuery> {
        None
    }
}

/// Installs the low-level hook available on the current platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformHookInstaller;

impl HookInstaller for PlatformHookInstaller {
    fn install(&self, callback: HookCallback) -> Result<Box<dyn InstalledHook>, HookInstallError> {
        #[cfg(target_os = "windows")]
        {
            super::windows::install(callback).map(|hook| Box::new(hook) as Box<dyn InstalledHook>)
        }
        #[cfg(target_os = "macos")]
        {
            super::macos::install(callback).map(|hook| Box::new(hook) as Box<dyn InstalledHook>)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            drop(callback);
            Err(HookInstallError::Unsupported)
        }
    }

    fn key_state(&self) -> Option<KeyStateQuery> {
        #[cfg(target_os = "windows")]
        {
            Some(Arc::new(super::windows::is_key_down))
        }
        #[cfg(target_os = "macos")]
        {
            Some(Arc::new(super::macos::is_key_down))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn unsupported_platform_reports_unsupported() {
        let result = PlatformHookInstaller.install(Box::new(|_| HookDecision::Propagate));
        assert!(matches!(result, Err(HookInstallError::Unsupported)));
    }
}
