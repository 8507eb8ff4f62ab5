use super::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::HookInstallError;
use crate::fallback::RawKey;
use crate::test_support::{FakeHookInstaller, FakeHotkeyApi};

#[derive(Default)]
struct RecordingHost {
    toggles: AtomicUsize,
    queries: Mutex<Vec<String>>,
    notifications: Mutex<Vec<(String, String)>>,
    ignoring: AtomicBool,
}

impl LauncherHost for RecordingHost {
    fn toggle_launcher(&self) {
        self.toggles.fetch_add(1, Ordering::SeqCst);
    }

    fn show_with_query(&self, keyword: &str) {
        self.queries.lock().push(keyword.to_string());
    }

    fn should_ignore_hotkeys(&self) -> bool {
        self.ignoring.load(Ordering::SeqCst)
    }

    fn notify(&self, title: &str, message: &str) {
        self.notifications
            .lock()
            .push((title.to_string(), message.to_string()));
    }
}

struct Fixture {
    host: Arc<RecordingHost>,
    api: FakeHotkeyApi,
    hooks: FakeHookInstaller,
    service: HotkeyService<RecordingHost>,
    queue: DispatchQueue,
}

fn fixture_with(hooks: FakeHookInstaller) -> Fixture {
    let host = Arc::new(RecordingHost::default());
    let api = FakeHotkeyApi::new();
    let (service, queue) = HotkeyService::new(
        Arc::clone(&host),
        Box::new(api.clone()),
        Box::new(hooks.clone()),
        RegistryOptions::default(),
    );
    Fixture {
        host,
        api,
        hooks,
        service,
        queue,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeHookInstaller::new())
}

fn combo(s: &str) -> KeyCombination {
    KeyCombination::parse(s).unwrap()
}

fn settings() -> Config {
    Config {
        hotkey: "Alt+Space".to_string(),
        custom_hotkeys: vec![
            CustomBinding::new("Ctrl+Alt+W", "wiki"),
            CustomBinding::new("Ctrl+Nope", "broken"),
            CustomBinding::new("Ctrl+Alt+G", "g"),
        ],
        ..Config::default()
    }
}

#[test]
fn initialize_binds_toggle_and_custom_hotkeys() {
    let f = fixture();
    let report = f.service.initialize(&settings());

    assert_eq!(report.bound.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(f.api.active_handles(), 3);

    // The broken entry was surfaced to the user
    let notifications = f.host.notifications.lock();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].0, "Hotkey Registration Failed");
    assert!(notifications[0].1.contains("Ctrl+Nope"));
}

#[test]
fn toggle_hotkey_toggles_the_launcher() {
    let f = fixture();
    f.service.initialize(&settings());

    assert!(f.api.press(&combo("Alt+Space")));
    assert_eq!(f.queue.drain(), 1);
    assert_eq!(f.host.toggles.load(Ordering::SeqCst), 1);
}

#[test]
fn custom_hotkey_shows_with_keyword() {
    let f = fixture();
    f.service.initialize(&settings());

    assert!(f.api.press(&combo("Ctrl+Alt+W")));
    f.queue.drain();
    assert_eq!(*f.host.queries.lock(), vec!["wiki".to_string()]);
}

#[test]
fn ignored_hotkeys_do_nothing() {
    let f = fixture();
    f.service.initialize(&Config {
        hotkey: "LWin".to_string(),
        ..settings()
    });
    f.host.ignoring.store(true, Ordering::SeqCst);

    f.api.press(&combo("Ctrl+Alt+W"));
    f.hooks.tap(RawKey::LWin);
    assert_eq!(f.queue.drain(), 0);
    assert_eq!(f.host.toggles.load(Ordering::SeqCst), 0);
    assert!(f.host.queries.lock().is_empty());
}

#[test]
fn bare_win_toggle_uses_the_hook() {
    let f = fixture();
    f.service.initialize(&Config {
        hotkey: "LWin".to_string(),
        custom_hotkeys: Vec::new(),
        ..Config::default()
    });
    assert_eq!(f.api.active_handles(), 0);
    assert_eq!(f.hooks.active_hooks(), 1);

    f.hooks.tap(RawKey::LWin);
    f.queue.drain();
    assert_eq!(f.host.toggles.load(Ordering::SeqCst), 1);
}

#[test]
fn conflicting_toggle_is_surfaced_and_startup_continues() {
    let f = fixture();
    f.api.claim_externally(&combo("Alt+Space"));
    let report = f.service.initialize(&settings());

    assert!(report
        .failed
        .iter()
        .any(|e| e.combination() == "Alt+Space"));
    assert!(f.service.registry().is_bound(&combo("Ctrl+Alt+W")));
    let notifications = f.host.notifications.lock();
    assert!(notifications
        .iter()
        .any(|(_, message)| message.contains("already in use")));
}

#[test]
fn unavailable_hook_is_surfaced() {
    let f = fixture_with(FakeHookInstaller::failing(HookInstallError::Unsupported));
    let err = f.service.set_toggle_hotkey("Alt+Space", "RWin").unwrap_err();
    assert!(matches!(err, BindError::HookUnavailable { .. }));
    assert_eq!(f.host.notifications.lock().len(), 1);
}

#[test]
fn set_toggle_hotkey_moves_the_binding() {
    let f = fixture();
    f.service.initialize(&Config::default());
    assert!(f.api.is_registered(&combo("Alt+Space")));

    f.service
        .set_toggle_hotkey("Alt+Space", "Ctrl+Alt+Space")
        .unwrap();
    assert!(!f.api.is_registered(&combo("Alt+Space")));
    assert!(f.api.is_registered(&combo("Ctrl+Alt+Space")));

    // Same combination spelled differently keeps one handle
    f.service
        .set_toggle_hotkey("Ctrl+Alt+Space", "space+alt+ctrl")
        .unwrap();
    assert_eq!(f.api.active_handles(), 1);
}

#[test]
fn replace_custom_bindings_diffs_old_and_new() {
    let f = fixture();
    let old = vec![
        CustomBinding::new("Ctrl+Alt+W", "wiki"),
        CustomBinding::new("Ctrl+Alt+G", "g"),
    ];
    f.service.initialize(&Config {
        custom_hotkeys: old.clone(),
        ..Config::default()
    });

    let new = vec![
        CustomBinding::new("ctrl+alt+w", "wiki"),
        CustomBinding::new("Ctrl+Alt+Y", "yt"),
    ];
    let report = f.service.replace_custom_bindings(&old, &new);

    assert_eq!(report.bound, vec![combo("Ctrl+Alt+Y")]);
    assert!(f.service.registry().is_bound(&combo("Ctrl+Alt+W")));
    assert!(!f.service.registry().is_bound(&combo("Ctrl+Alt+G")));
    assert!(f.service.registry().is_bound(&combo("Ctrl+Alt+Y")));
}

#[test]
fn replace_custom_bindings_rebinds_changed_keyword() {
    let f = fixture();
    let old = vec![CustomBinding::new("Ctrl+Alt+W", "wiki")];
    f.service.initialize(&Config {
        custom_hotkeys: old.clone(),
        ..Config::default()
    });

    let new = vec![CustomBinding::new("Ctrl+Alt+W", "web")];
    f.service.replace_custom_bindings(&old, &new);

    f.api.press(&combo("Ctrl+Alt+W"));
    f.queue.drain();
    assert_eq!(*f.host.queries.lock(), vec!["web".to_string()]);
}

#[test]
fn check_availability_parses_first() {
    let f = fixture();
    assert!(f.service.check_availability("Ctrl+Shift+F9"));
    assert!(!f.service.check_availability("Ctrl+"));
    assert!(!f.service.check_availability(""));
    assert_eq!(f.api.active_handles(), 0);
}

#[test]
fn remove_hotkey_ignores_empty_and_absent() {
    let f = fixture();
    f.service.initialize(&Config::default());
    f.service.remove_hotkey("");
    f.service.remove_hotkey("Ctrl+Alt+Z");
    assert_eq!(f.api.active_handles(), 1);
    f.service.remove_hotkey("alt+space");
    assert_eq!(f.api.active_handles(), 0);
}

#[test]
fn shutdown_leaves_nothing_installed() {
    let f = fixture();
    f.service.initialize(&Config {
        custom_hotkeys: vec![CustomBinding::new("RWin", "r")],
        ..settings()
    });
    assert!(f.hooks.active_hooks() > 0);

    f.service.shutdown();
    assert_eq!(f.api.active_handles(), 0);
    assert_eq!(f.hooks.active_hooks(), 0);
}
