//! In-crate fakes for the native seams.
//!
//! Both fakes share their state between clones, so a test keeps one clone
//! for inspection and hands the other to the backend under test.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use global_hotkey::{hotkey::HotKey, Error as HotkeyError};
use parking_lot::Mutex;

use crate::dispatch::SuppressionGuard;
use crate::error::HookInstallError;
use crate::fallback::{
    HookCallback, HookDecision, HookInstaller, InstalledHook, KeyDirection, KeyStateQuery, RawKey,
    RawKeyEvent,
};
use crate::keys::KeyCombination;
use crate::standard::{HotkeyApi, HotkeyEventHandler};

#[derive(Default)]
struct FakeOsState {
    registered: HashSet<u32>,
    /// Held by some other process
    external: HashSet<u32>,
    /// Key codes the OS refuses outright
    rejected: HashSet<u32>,
    handler: Option<HotkeyEventHandler>,
    register_calls: usize,
}

/// Stand-in for the OS hotkey facility that counts live handles.
#[derive(Clone, Default)]
pub struct FakeHotkeyApi {
    state: Arc<Mutex<FakeOsState>>,
}

fn native_id(combo: &KeyCombination) -> u32 {
    combo
        .to_hotkey()
        .map(|hk| hk.id())
        .expect("combination has an OS hotkey")
}

impl FakeHotkeyApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim_externally(&self, combo: &KeyCombination) {
        self.state.lock().external.insert(native_id(combo));
    }

    pub fn release_externally(&self, combo: &KeyCombination) {
        self.state.lock().external.remove(&native_id(combo));
    }

    pub fn reject(&self, combo: &KeyCombination) {
        self.state.lock().rejected.insert(native_id(combo));
    }

    pub fn active_handles(&self) -> usize {
        self.state.lock().registered.len()
    }

    pub fn is_registered(&self, combo: &KeyCombination) -> bool {
        self.state.lock().registered.contains(&native_id(combo))
    }

    pub fn register_calls(&self) -> usize {
        self.state.lock().register_calls
    }

    pub fn has_handler(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    /// Simulate the user pressing `combo`. Returns whether a handler saw it.
    pub fn press(&self, combo: &KeyCombination) -> bool {
        let id = native_id(combo);
        let handler = {
            let state = self.state.lock();
            if !state.registered.contains(&id) {
                return false;
            }
            state.handler.clone()
        };
        match handler {
            Some(handler) => {
                handler(id);
                true
            }
            None => false,
        }
    }
}

impl HotkeyApi for FakeHotkeyApi {
    fn register(&mut self, hotkey: HotKey) -> Result<(), HotkeyError> {
        let mut state = self.state.lock();
        state.register_calls += 1;
        let id = hotkey.id();
        if state.rejected.contains(&id) {
            return Err(HotkeyError::OsError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "key code rejected",
            )));
        }
        if state.external.contains(&id) || state.registered.contains(&id) {
            return Err(HotkeyError::AlreadyRegistered(hotkey));
        }
        state.registered.insert(id);
        Ok(())
    }

    fn unregister(&mut self, hotkey: HotKey) -> Result<(), HotkeyError> {
        self.state.lock().registered.remove(&hotkey.id());
        Ok(())
    }

    fn set_event_handler(&mut self, handler: Option<HotkeyEventHandler>) {
        self.state.lock().handler = handler;
    }
}

#[derive(Default)]
struct FakeHookState {
    installs: usize,
    active: usize,
    callback: Option<HookCallback>,
    failure: Option<HookInstallError>,
}

/// Stand-in for the low-level keyboard hook that counts installs.
#[derive(Clone, Default)]
pub struct FakeHookInstaller {
    state: Arc<Mutex<FakeHookState>>,
    /// Physical key state, when the fake answers key-state queries
    physical: Option<Arc<Mutex<HashSet<RawKey>>>>,
}

struct FakeHook {
    state: Arc<Mutex<FakeHookState>>,
}

impl InstalledHook for FakeHook {}

impl Drop for FakeHook {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.active -= 1;
        state.callback = None;
    }
}

impl FakeHookInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake that also reports physical key state, like the real platform hooks.
    pub fn with_key_state() -> Self {
        Self {
            physical: Some(Arc::default()),
            ..Self::default()
        }
    }

    pub fn failing(error: HookInstallError) -> Self {
        let installer = Self::default();
        installer.state.lock().failure = Some(error);
        installer
    }

    pub fn install_count(&self) -> usize {
        self.state.lock().installs
    }

    pub fn active_hooks(&self) -> usize {
        self.state.lock().active
    }

    /// Deliver one event to the installed callback, if any.
    pub fn send(&self, event: RawKeyEvent) -> Option<HookDecision> {
        self.set_physical(event);
        let mut state = self.state.lock();
        state.callback.as_mut().map(|cb| cb(event))
    }

    /// Change the physical key state without the hook seeing the event.
    pub fn send_unseen(&self, event: RawKeyEvent) {
        self.set_physical(event);
    }

    fn set_physical(&self, event: RawKeyEvent) {
        if let Some(physical) = &self.physical {
            let mut physical = physical.lock();
            match event.direction {
                KeyDirection::Down => physical.insert(event.key),
                KeyDirection::Up => physical.remove(&event.key),
            };
        }
    }

    /// Press and release `key`. Returns the decision for the release.
    pub fn tap(&self, key: RawKey) -> Option<HookDecision> {
        self.send(RawKeyEvent::down(key));
        self.send(RawKeyEvent::up(key))
    }
}

impl HookInstaller for FakeHookInstaller {
    fn install(&self, callback: HookCallback) -> Result<Box<dyn InstalledHook>, HookInstallError> {
        let mut state = self.state.lock();
        if let Some(err) = state.failure.clone() {
            return Err(err);
        }
        state.installs += 1;
        state.active += 1;
        state.callback = Some(callback);
        Ok(Box::new(FakeHook {
            state: Arc::clone(&self.state),
        }))
    }

    fn key_state(&self) -> Option<KeyStateQuery> {
        let physical = Arc::clone(self.physical.as_ref()?);
        Some(Arc::new(move |key| physical.lock().contains(&key)))
    }
}

/// Suppression guard that panics until `recover` is called.
pub struct FaultyGuard {
    failing: AtomicBool,
}

impl FaultyGuard {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(true),
        })
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

impl SuppressionGuard for FaultyGuard {
    fn should_suppress_dispatch(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            panic!("suppression guard failed");
        }
        false
    }
}
