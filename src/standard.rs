//! Standard registration backend - OS atomic global hotkeys.
//!
//! One OS registration per identifier. The OS delivers presses on its own
//! dispatch thread; the handler installed here only maps the native hotkey
//! id back to a combination and forwards it to the router.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use global_hotkey::{
    hotkey::HotKey, Error as HotkeyError, GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::dispatch::{BackendKind, Router};
use crate::error::RegisterError;
use crate::keys::KeyCombination;

/// Called with the native id of a pressed hotkey.
pub type HotkeyEventHandler = Arc<dyn Fn(u32) + Send + Sync + 'static>;

/// Native seam over the OS "register global hotkey" primitive.
pub trait HotkeyApi: Send {
    fn register(&mut self, hotkey: HotKey) -> Result<(), HotkeyError>;
    fn unregister(&mut self, hotkey: HotKey) -> Result<(), HotkeyError>;
    /// Install or clear the process-wide handler for pressed hotkeys.
    fn set_event_handler(&mut self, handler: Option<HotkeyEventHandler>);
}

/// `HotkeyApi` backed by `global_hotkey::GlobalHotKeyManager`.
///
/// NOTE: Must be created on the thread that runs the platform event loop.
pub struct GlobalHotKeyApi {
    manager: GlobalHotKeyManager,
}

impl GlobalHotKeyApi {
    pub fn new() -> Result<Self, HotkeyError> {
        Ok(Self {
            manager: GlobalHotKeyManager::new()?,
        })
    }
}

impl HotkeyApi for GlobalHotKeyApi {
    fn register(&mut self, hotkey: HotKey) -> Result<(), HotkeyError> {
        self.manager.register(hotkey)
    }

    fn unregister(&mut self, hotkey: HotKey) -> Result<(), HotkeyError> {
        self.manager.unregister(hotkey)
    }

    fn set_event_handler(&mut self, handler: Option<HotkeyEventHandler>) {
        match handler {
            Some(handler) => GlobalHotKeyEvent::set_event_handler(Some(
                move |event: GlobalHotKeyEvent| {
                    // Only respond to key PRESS, not release
                    if event.state == HotKeyState::Pressed {
                        handler(event.id);
                    }
                },
            )),
            None => GlobalHotKeyEvent::set_event_handler(None::<fn(GlobalHotKeyEvent)>),
        }
    }
}

/// Map an OS registration failure to the engine's taxonomy.
pub(crate) fn classify_register_error(e: &HotkeyError, combo: &KeyCombination) -> RegisterError {
    match e {
        HotkeyError::AlreadyRegistered(_) | HotkeyError::FailedToRegister(_) => {
            RegisterError::Conflict {
                combination: combo.to_string(),
            }
        }
        other => RegisterError::InvalidCombination {
            combination: combo.to_string(),
            reason: other.to_string(),
        },
    }
}

#[derive(Clone, Copy, Debug)]
struct StandardEntry {
    hotkey: HotKey,
    combination: KeyCombination,
}

/// Rolls an OS registration back unless tracking completed.
struct RegistrationGuard<'a> {
    api: &'a mut dyn HotkeyApi,
    hotkey: HotKey,
    armed: bool,
}

impl RegistrationGuard<'_> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(hotkey_id = self.hotkey.id(), "Rolling back OS hotkey registration");
            let _ = self.api.unregister(self.hotkey);
        }
    }
}

/// Owns every OS hotkey handle the process holds.
pub struct StandardBackend {
    api: Mutex<Box<dyn HotkeyApi>>,
    /// identifier -> registration
    entries: Mutex<HashMap<String, StandardEntry>>,
    /// native hotkey id -> combination, read from the OS dispatch thread
    by_native_id: Arc<RwLock<HashMap<u32, KeyCombination>>>,
}

impl StandardBackend {
    pub fn new(mut api: Box<dyn HotkeyApi>, router: Arc<Router>) -> Self {
        let by_native_id: Arc<RwLock<HashMap<u32, KeyCombination>>> = Arc::default();

        let lookup = Arc::clone(&by_native_id);
        api.set_event_handler(Some(Arc::new(move |native_id: u32| {
            let result = catch_unwind(AssertUnwindSafe(|| {
                let combo = lookup.read().get(&native_id).copied();
                match combo {
                    Some(combo) => {
                        let outcome = router.fire(&combo, BackendKind::Standard);
                        debug!(
                            event_type = "hotkey_fire",
                            combination = %combo,
                            outcome = ?outcome,
                            "Standard hotkey fired"
                        );
                    }
                    None => debug!(hotkey_id = native_id, "Unknown hotkey id fired"),
                }
            }));
            if result.is_err() {
                warn!(
                    event_type = "hook_fault",
                    hotkey_id = native_id,
                    "Hotkey event handler panicked"
                );
            }
        })));

        Self {
            api: Mutex::new(api),
            entries: Mutex::new(HashMap::new()),
            by_native_id,
        }
    }

    /// Register `combo` under `id`, replacing whatever `id` held before.
    pub fn register(&self, id: &str, combo: KeyCombination) -> Result<(), RegisterError> {
        let hotkey = combo
            .to_hotkey()
            .ok_or_else(|| RegisterError::InvalidCombination {
                combination: combo.to_string(),
                reason: "key has no system hotkey code".to_string(),
            })?;

        let mut api = self.api.lock();
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.get(id) {
            if existing.hotkey.id() == hotkey.id() {
                return Ok(());
            }
        }
        if let Some(previous) = entries.remove(id) {
            self.release(api.as_mut(), id, previous);
        }

        api.register(hotkey)
            .map_err(|e| classify_register_error(&e, &combo))?;

        let guard = RegistrationGuard {
            api: api.as_mut(),
            hotkey,
            armed: true,
        };
        self.by_native_id.write().insert(hotkey.id(), combo);
        entries.insert(
            id.to_string(),
            StandardEntry {
                hotkey,
                combination: combo,
            },
        );
        guard.commit();

        info!(
            event_type = "hotkey_register",
            backend = "standard",
            id = id,
            combination = %combo,
            hotkey_id = hotkey.id(),
            "Registered OS hotkey"
        );
        Ok(())
    }

    /// Release the registration held under `id`. No-op if absent.
    pub fn unregister(&self, id: &str) {
        let mut api = self.api.lock();
        if let Some(entry) = self.entries.lock().remove(id) {
            self.release(api.as_mut(), id, entry);
        }
    }

    fn release(&self, api: &mut dyn HotkeyApi, id: &str, entry: StandardEntry) {
        self.by_native_id.write().remove(&entry.hotkey.id());
        if let Err(e) = api.unregister(entry.hotkey) {
            // Tracking is already updated; the OS side is best effort
            warn!(
                id = id,
                combination = %entry.combination,
                error = %e,
                "Failed to unregister OS hotkey"
            );
        } else {
            info!(
                event_type = "hotkey_unregister",
                backend = "standard",
                id = id,
                combination = %entry.combination,
                "Unregistered OS hotkey"
            );
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Combination registered under `id`, if any.
    pub fn combination_of(&self, id: &str) -> Option<KeyCombination> {
        self.entries.lock().get(id).map(|e| e.combination)
    }

    /// Number of OS handles currently held.
    pub fn active_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Release every handle.
    pub fn unregister_all(&self) {
        let mut api = self.api.lock();
        let drained: Vec<(String, StandardEntry)> = self.entries.lock().drain().collect();
        for (id, entry) in drained {
            self.release(api.as_mut(), &id, entry);
        }
    }
}

impl Drop for StandardBackend {
    fn drop(&mut self) {
        self.unregister_all();
        self.api.get_mut().set_event_handler(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Action, NeverSuppress, Registration, RegistrationTable};
    use crate::test_support::{FakeHotkeyApi, FaultyGuard};

    fn combo(s: &str) -> KeyCombination {
        KeyCombination::parse(s).unwrap()
    }

    fn backend(api: &FakeHotkeyApi) -> (StandardBackend, Arc<Router>, crate::dispatch::DispatchQueue) {
        let (router, queue) = Router::new(
            Arc::new(RegistrationTable::default()),
            Arc::new(NeverSuppress),
            8,
        );
        let backend = StandardBackend::new(Box::new(api.clone()), Arc::clone(&router));
        (backend, router, queue)
    }

    #[test]
    fn register_holds_one_handle() {
        let api = FakeHotkeyApi::new();
        let (backend, _router, _queue) = backend(&api);
        backend.register("a", combo("Ctrl+Alt+Space")).unwrap();
        assert_eq!(api.active_handles(), 1);
        assert!(backend.is_registered("a"));
    }

    #[test]
    fn register_same_id_replaces() {
        let api = FakeHotkeyApi::new();
        let (backend, _router, _queue) = backend(&api);
        backend.register("a", combo("Ctrl+J")).unwrap();
        backend.register("a", combo("Ctrl+K")).unwrap();
        assert_eq!(api.active_handles(), 1);
        assert_eq!(backend.combination_of("a"), Some(combo("Ctrl+K")));
        assert!(!api.is_registered(&combo("Ctrl+J")));
    }

    #[test]
    fn conflict_is_reported_and_nothing_is_held() {
        let api = FakeHotkeyApi::new();
        api.claim_externally(&combo("Alt+Space"));
        let (backend, _router, _queue) = backend(&api);
        let err = backend.register("a", combo("Alt+Space")).unwrap_err();
        assert!(matches!(err, RegisterError::Conflict { .. }));
        assert!(!backend.is_registered("a"));
    }

    #[test]
    fn os_rejection_is_invalid_combination() {
        let api = FakeHotkeyApi::new();
        api.reject(&combo("Ctrl+F24"));
        let (backend, _router, _queue) = backend(&api);
        let err = backend.register("a", combo("Ctrl+F24")).unwrap_err();
        assert!(matches!(err, RegisterError::InvalidCombination { .. }));
    }

    #[test]
    fn reserved_key_cannot_be_registered() {
        let api = FakeHotkeyApi::new();
        let (backend, _router, _queue) = backend(&api);
        let err = backend.register("a", combo("LWin")).unwrap_err();
        assert!(matches!(err, RegisterError::InvalidCombination { .. }));
        assert_eq!(api.register_calls(), 0);
    }

    #[test]
    fn unregister_is_idempotent() {
        let api = FakeHotkeyApi::new();
        let (backend, _router, _queue) = backend(&api);
        backend.unregister("never");
        backend.register("a", combo("Ctrl+J")).unwrap();
        backend.unregister("a");
        backend.unregister("a");
        assert_eq!(api.active_handles(), 0);
    }

    #[test]
    fn press_reaches_router() {
        let api = FakeHotkeyApi::new();
        let (backend, router, queue) = backend(&api);
        let c = combo("Ctrl+Alt+Space");
        router.table().insert(Registration::new(
            c,
            BackendKind::Standard,
            Action::custom("noop", || {}),
        ));
        backend.register(&c.to_string(), c).unwrap();

        assert!(api.press(&c));
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn panicking_guard_is_contained_in_the_event_handler() {
        let api = FakeHotkeyApi::new();
        let guard = FaultyGuard::failing();
        let (router, queue) = Router::new(
            Arc::new(RegistrationTable::default()),
            guard.clone(),
            8,
        );
        let backend = StandardBackend::new(Box::new(api.clone()), Arc::clone(&router));
        let c = combo("Ctrl+Alt+Space");
        router.table().insert(Registration::new(
            c,
            BackendKind::Standard,
            Action::custom("noop", || {}),
        ));
        backend.register(&c.to_string(), c).unwrap();

        // Returns normally instead of unwinding into the OS dispatch thread
        assert!(api.press(&c));
        assert_eq!(queue.pending(), 0);

        guard.recover();
        assert!(api.press(&c));
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn drop_releases_everything() {
        let api = FakeHotkeyApi::new();
        {
            let (backend, _router, _queue) = backend(&api);
            backend.register("a", combo("Ctrl+J")).unwrap();
            backend.register("b", combo("Ctrl+K")).unwrap();
            assert!(api.has_handler());
        }
        assert_eq!(api.active_handles(), 0);
        assert!(!api.has_handler());
    }

    #[cfg(feature = "system-tests")]
    mod system_tests {
        use super::*;

        // GlobalHotKeyManager needs a running event loop and OS permissions
        fn create_test_backend() -> Option<StandardBackend> {
            let api = GlobalHotKeyApi::new().ok()?;
            let (router, _queue) = Router::new(
                Arc::new(RegistrationTable::default()),
                Arc::new(NeverSuppress),
                8,
            );
            Some(StandardBackend::new(Box::new(api), router))
        }

        #[test]
        fn test_register_and_release_real_hotkey() {
            if let Some(backend) = create_test_backend() {
                let c = combo("Ctrl+Alt+Shift+F19");
                if backend.register("system-test", c).is_ok() {
                    assert_eq!(backend.active_count(), 1);
                    backend.unregister("system-test");
                }
                assert_eq!(backend.active_count(), 0);
            }
        }
    }
}
