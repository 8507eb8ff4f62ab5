//! Listen-only CGEventTap on a dedicated CFRunLoop thread.
//!
//! The Command keys play the Win key role. They only produce
//! `FlagsChanged` events, so up/down comes from the device-dependent flag bits.

use std::cell::RefCell;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use tracing::warn;

use super::hook::{HookCallback, InstalledHook, KeyDirection, RawKey, RawKeyEvent};
use crate::error::HookInstallError;

const NX_DEVICELCTLKEYMASK: u64 = 0x0000_0001;
const NX_DEVICELSHIFTKEYMASK: u64 = 0x0000_0002;
const NX_DEVICERSHIFTKEYMASK: u64 = 0x0000_0004;
const NX_DEVICELCMDKEYMASK: u64 = 0x0000_0008;
const NX_DEVICERCMDKEYMASK: u64 = 0x0000_0010;
const NX_DEVICELALTKEYMASK: u64 = 0x0000_0020;
const NX_DEVICERALTKEYMASK: u64 = 0x0000_0040;
const NX_DEVICERCTLKEYMASK: u64 = 0x0000_2000;

/// kCGEventSourceStateCombinedSessionState
const COMBINED_SESSION_STATE: i32 = 0;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventSourceKeyState(state_id: i32, key: u16) -> bool;
}

const KEY_CODE_LEFT_COMMAND: u16 = 0x37;
const KEY_CODE_RIGHT_COMMAND: u16 = 0x36;

/// Modifier key code -> device flag that is set while it is held
const MODIFIER_MASKS: [(u16, u64); 8] = [
    (KEY_CODE_LEFT_COMMAND, NX_DEVICELCMDKEYMASK),
    (KEY_CODE_RIGHT_COMMAND, NX_DEVICERCMDKEYMASK),
    (0x38, NX_DEVICELSHIFTKEYMASK),
    (0x3C, NX_DEVICERSHIFTKEYMASK),
    (0x3B, NX_DEVICELCTLKEYMASK),
    (0x3E, NX_DEVICERCTLKEYMASK),
    (0x3A, NX_DEVICELALTKEYMASK),
    (0x3D, NX_DEVICERALTKEYMASK),
];

pub(super) struct MacHook {
    run_loop: CFRunLoop,
    thread: Option<JoinHandle<()>>,
}

impl InstalledHook for MacHook {}

impl Drop for MacHook {
    fn drop(&mut self) {
        self.run_loop.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Event tap thread panicked while stopping");
            }
        }
    }
}

pub(super) fn install(callback: HookCallback) -> Result<MacHook, HookInstallError> {
    let (startup_tx, startup_rx) = mpsc::channel::<Result<CFRunLoop, HookInstallError>>();

    let thread = thread::Builder::new()
        .name("hotkey-event-tap".to_string())
        .spawn(move || run_event_tap_thread(callback, startup_tx))
        .map_err(|e| HookInstallError::Os(format!("failed to spawn event tap thread: {e}")))?;

    match startup_rx.recv() {
        Ok(Ok(run_loop)) => Ok(MacHook {
            run_loop,
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(e) => {
            let _ = thread.join();
            Err(HookInstallError::Os(format!(
                "event tap thread exited during startup: {e}"
            )))
        }
    }
}

fn run_event_tap_thread(
    callback: HookCallback,
    startup_tx: mpsc::Sender<Result<CFRunLoop, HookInstallError>>,
) {
    let run_loop = CFRunLoop::get_current();
    let callback = RefCell::new(callback);

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        |_proxy, event_type, event| {
            match event_type {
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    warn!(
                        ?event_type,
                        "macOS event tap was disabled by the system; reserved hotkeys may stop firing"
                    );
                }
                _ => {
                    if let Some(raw) = translate(event_type, event) {
                        if let Ok(mut cb) = callback.try_borrow_mut() {
                            // Listen-only tap: the decision cannot be honored
                            let _ = (&mut *cb)(raw);
                        }
                    }
                }
            }
            None
        },
    ) {
        Ok(tap) => tap,
        Err(_) => {
            let _ = startup_tx.send(Err(HookInstallError::PermissionDenied(
                "CGEventTap creation failed; grant Input Monitoring access".to_string(),
            )));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = startup_tx.send(Err(HookInstallError::Os(
                "failed to create event tap runloop source".to_string(),
            )));
            return;
        }
    };

    // SAFETY: `kCFRunLoopCommonModes` is a valid CoreFoundation runloop mode.
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();

    if startup_tx.send(Ok(run_loop.clone())).is_err() {
        return;
    }

    CFRunLoop::run_current();

    // SAFETY: same mode used for add_source above.
    unsafe {
        run_loop.remove_source(&source, kCFRunLoopCommonModes);
    }
}

pub(super) fn is_key_down(key: RawKey) -> bool {
    let key_code = match key {
        RawKey::LWin => KEY_CODE_LEFT_COMMAND,
        RawKey::RWin => KEY_CODE_RIGHT_COMMAND,
        RawKey::Other(code) => u16::from(code),
    };
    // SAFETY: a pure query of the combined session key state.
    unsafe { CGEventSourceKeyState(COMBINED_SESSION_STATE, key_code) }
}

fn translate(event_type: CGEventType, event: &CGEvent) -> Option<RawKeyEvent> {
    let key_code =
        u16::try_from(event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE)).ok()?;
    let direction = match event_type {
        CGEventType::KeyDown => KeyDirection::Down,
        CGEventType::KeyUp => KeyDirection::Up,
        CGEventType::FlagsChanged => {
            let (_, mask) = MODIFIER_MASKS.iter().find(|(code, _)| *code == key_code)?;
            if event.get_flags().bits() & mask != 0 {
                KeyDirection::Down
            } else {
                KeyDirection::Up
            }
        }
        _ => return None,
    };
    let key = match key_code {
        KEY_CODE_LEFT_COMMAND => RawKey::LWin,
        KEY_CODE_RIGHT_COMMAND => RawKey::RWin,
        other => RawKey::Other(u8::try_from(other).ok()?),
    };
    Some(RawKeyEvent {
        key,
        direction,
        injected: false,
    })
}
