//! Reserved-key fallback backend.
//!
//! The OS hotkey facility cannot bind a bare Win key, so those combinations
//! are served by one system-wide low-level keyboard hook. The hook is shared:
//! installed with the first reserved binding, removed with the last.
//!
//! The hook callback owns a `TapDetector` and reads which reserved keys are
//! bound through an `arc-swap` snapshot, so it never takes a lock the
//! registry might hold.

mod hook;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::dispatch::{BackendKind, FireOutcome, Router};
use crate::error::HookInstallError;
use crate::keys::{Key, KeyCombination};

pub use hook::{
    HookCallback, HookDecision, HookInstaller, InstalledHook, KeyDirection, KeyStateQuery,
    PlatformHookInstaller, RawKey, RawKeyEvent,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookOptions {
    /// Keep the Start menu from opening after a bound bare Win tap.
    /// Honored on Windows only; the macOS tap is listen-only.
    pub swallow_reserved_keys: bool,
}

/// Detects a bare tap of a Win key: pressed and released with nothing else
/// pressed in between and nothing else held when it went down.
///
/// Fixed-size state, no allocation; safe to drive from the hook thread.
///
/// With a `KeyStateQuery`, every Win press first drops held keys the OS
/// reports as released. Win+L locks the session on the L press, so the hook
/// never sees L or Win come back up.
#[derive(Default)]
pub struct TapDetector {
    /// Non-Win keys currently held, indexed by key code
    held: [u64; 4],
    lwin_down: bool,
    rwin_down: bool,
    candidate: Option<RawKey>,
    key_state: Option<KeyStateQuery>,
}

impl TapDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_state(mut self, query: KeyStateQuery) -> Self {
        self.key_state = Some(query);
        self
    }

    /// Feed one event. Returns the reserved key whose tap just completed.
    pub fn on_event(&mut self, event: RawKeyEvent) -> Option<Key> {
        if event.injected {
            return None;
        }
        match (event.key, event.direction) {
            (RawKey::Other(code), KeyDirection::Down) => {
                self.set_held(code, true);
                self.candidate = None;
                None
            }
            (RawKey::Other(code), KeyDirection::Up) => {
                self.set_held(code, false);
                None
            }
            (win, KeyDirection::Down) => {
                if self.resync_released() {
                    // This key's own release was missed along with the rest
                    self.set_win_down(win, false);
                }
                if self.win_down(win) {
                    // auto-repeat
                    return None;
                }
                let chorded = self.any_held() || self.lwin_down || self.rwin_down;
                self.set_win_down(win, true);
                self.candidate = if chorded { None } else { Some(win) };
                None
            }
            (win, KeyDirection::Up) => {
                self.set_win_down(win, false);
                if self.candidate == Some(win) {
                    self.candidate = None;
                    return Some(match win {
                        RawKey::RWin => Key::RWin,
                        _ => Key::LWin,
                    });
                }
                None
            }
        }
    }

    /// Forget all key state. The OS key-state query is kept.
    pub fn reset(&mut self) {
        let key_state = self.key_state.take();
        *self = Self {
            key_state,
            ..Self::default()
        };
    }

    /// Clear keys we believe held but the OS reports released. Returns whether any were stale.
    fn resync_released(&mut self) -> bool {
        let Some(query) = self.key_state.clone() else {
            return false;
        };
        let mut stale = false;
        for word in 0..self.held.len() {
            let mut bits = self.held[word];
            while bits != 0 {
                let bit = bits.trailing_zeros() as u8;
                bits &= bits - 1;
                let code = ((word as u8) << 6) | bit;
                if !query(RawKey::Other(code)) {
                    self.set_held(code, false);
                    stale = true;
                }
            }
        }
        for win in [RawKey::LWin, RawKey::RWin] {
            if self.win_down(win) && !query(win) {
                self.set_win_down(win, false);
                stale = true;
            }
        }
        stale
    }

    fn win_down(&self, key: RawKey) -> bool {
        match key {
            RawKey::LWin => self.lwin_down,
            RawKey::RWin => self.rwin_down,
            RawKey::Other(_) => false,
        }
    }

    fn set_win_down(&mut self, key: RawKey, down: bool) {
        match key {
            RawKey::LWin => self.lwin_down = down,
            RawKey::RWin => self.rwin_down = down,
            RawKey::Other(_) => {}
        }
    }

    fn set_held(&mut self, code: u8, held: bool) {
        let (word, bit) = ((code >> 6) as usize, code & 63);
        if held {
            self.held[word] |= 1 << bit;
        } else {
            self.held[word] &= !(1 << bit);
        }
    }

    fn any_held(&self) -> bool {
        self.held.iter().any(|w| *w != 0)
    }
}

/// Which reserved keys the hook should act on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ReservedKeys {
    lwin: bool,
    rwin: bool,
}

impl ReservedKeys {
    fn from_entries(entries: &BTreeSet<KeyCombination>) -> Self {
        Self {
            lwin: entries.contains(&KeyCombination::bare(Key::LWin)),
            rwin: entries.contains(&KeyCombination::bare(Key::RWin)),
        }
    }

    fn contains(&self, key: Key) -> bool {
        match key {
            Key::LWin => self.lwin,
            Key::RWin => self.rwin,
            _ => false,
        }
    }
}

#[derive(Default)]
struct FallbackState {
    entries: BTreeSet<KeyCombination>,
    hook: Option<Box<dyn InstalledHook>>,
}

/// Owns the process's single low-level keyboard hook.
pub struct FallbackBackend {
    installer: Box<dyn HookInstaller>,
    router: Arc<Router>,
    options: HookOptions,
    state: Mutex<FallbackState>,
    keys: Arc<ArcSwap<ReservedKeys>>,
}

impl FallbackBackend {
    pub fn new(installer: Box<dyn HookInstaller>, router: Arc<Router>, options: HookOptions) -> Self {
        Self {
            installer,
            router,
            options,
            state: Mutex::new(FallbackState::default()),
            keys: Arc::new(ArcSwap::from_pointee(ReservedKeys::default())),
        }
    }

    /// Add a reserved combination, installing the hook if this is the first.
    ///
    /// If the hook cannot be installed the entry is not kept.
    pub fn register(&self, combo: KeyCombination) -> Result<(), HookInstallError> {
        let mut state = self.state.lock();
        state.entries.insert(combo);
        self.keys
            .store(Arc::new(ReservedKeys::from_entries(&state.entries)));

        if state.hook.is_none() {
            match self.installer.install(self.hook_callback()) {
                Ok(hook) => {
                    info!(
                        event_type = "hook_lifecycle",
                        action = "installed",
                        "Low-level keyboard hook installed"
                    );
                    state.hook = Some(hook);
                }
                Err(e) => {
                    state.entries.remove(&combo);
                    self.keys
                        .store(Arc::new(ReservedKeys::from_entries(&state.entries)));
                    warn!(
                        event_type = "hook_lifecycle",
                        combination = %combo,
                        error = %e,
                        "Keyboard hook unavailable, fallback hotkeys inactive"
                    );
                    return Err(e);
                }
            }
        }

        info!(
            event_type = "hotkey_register",
            backend = "reserved_fallback",
            combination = %combo,
            "Registered reserved hotkey"
        );
        Ok(())
    }

    /// Remove a reserved combination, removing the hook if it was the last. No-op if absent.
    pub fn unregister(&self, combo: &KeyCombination) {
        let released = {
            let mut state = self.state.lock();
            if !state.entries.remove(combo) {
                return;
            }
            self.keys
                .store(Arc::new(ReservedKeys::from_entries(&state.entries)));
            info!(
                event_type = "hotkey_unregister",
                backend = "reserved_fallback",
                combination = %combo,
                "Unregistered reserved hotkey"
            );
            if state.entries.is_empty() {
                state.hook.take()
            } else {
                None
            }
        };
        if let Some(hook) = released {
            Self::uninstall(hook);
        }
    }

    pub fn is_registered(&self, combo: &KeyCombination) -> bool {
        self.state.lock().entries.contains(combo)
    }

    pub fn is_hook_installed(&self) -> bool {
        self.state.lock().hook.is_some()
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Drop every entry and the hook.
    pub fn unregister_all(&self) {
        let released = {
            let mut state = self.state.lock();
            state.entries.clear();
            self.keys.store(Arc::new(ReservedKeys::default()));
            state.hook.take()
        };
        if let Some(hook) = released {
            Self::uninstall(hook);
        }
    }

    fn uninstall(hook: Box<dyn InstalledHook>) {
        drop(hook);
        info!(
            event_type = "hook_lifecycle",
            action = "removed",
            "Low-level keyboard hook removed"
        );
    }

    fn hook_callback(&self) -> HookCallback {
        let keys = Arc::clone(&self.keys);
        let router = Arc::clone(&self.router);
        let swallow = self.options.swallow_reserved_keys;
        let mut detector = match self.installer.key_state() {
            Some(query) => TapDetector::new().with_key_state(query),
            None => TapDetector::new(),
        };

        Box::new(move |event: RawKeyEvent| {
            let result = catch_unwind(AssertUnwindSafe(|| {
                let Some(key) = detector.on_event(event) else {
                    return HookDecision::Propagate;
                };
                if !keys.load().contains(key) {
                    return HookDecision::Propagate;
                }
                let combo = KeyCombination::bare(key);
                let outcome = router.fire(&combo, BackendKind::ReservedFallback);
                debug!(
                    event_type = "hotkey_fire",
                    combination = %combo,
                    outcome = ?outcome,
                    "Reserved hotkey tapped"
                );
                if swallow && outcome == FireOutcome::Queued {
                    HookDecision::Swallow
                } else {
                    HookDecision::Propagate
                }
            }));
            result.unwrap_or_else(|_| {
                warn!(event_type = "hook_fault", "Keyboard hook callback panicked");
                detector.reset();
                HookDecision::Propagate
            })
        })
    }
}

impl Drop for FallbackBackend {
    fn drop(&mut self) {
        self.unregister_all();
    }
}

#[cfg(test)]
#[path = "fallback_tests.rs"]
mod tests;
