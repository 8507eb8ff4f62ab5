//! WH_KEYBOARD_LL hook on a dedicated message-loop thread.
//!
//! Low-level hooks are called on the installing thread while it pumps
//! messages, so the thread does nothing but `GetMessageW` until it receives
//! `WM_QUIT`.

use std::cell::RefCell;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::warn;
use windows_sys::Win32::Foundation::{GetLastError, ERROR_ACCESS_DENIED, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, VK_LWIN, VK_RWIN,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, PeekMessageW, PostThreadMessageW, SetWindowsHookExW,
    UnhookWindowsHookEx, HC_ACTION, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG, PM_NOREMOVE,
    WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_USER,
};

use super::hook::{HookCallback, HookDecision, InstalledHook, KeyDirection, RawKey, RawKeyEvent};
use crate::error::HookInstallError;

/// Unassigned virtual key, sent between Win down and up to keep the Start menu closed
const VK_MASK_KEY: u16 = 0xE8;

thread_local! {
    static CALLBACK: RefCell<Option<HookCallback>> = const { RefCell::new(None) };
}

pub(super) struct WindowsHook {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl InstalledHook for WindowsHook {}

impl Drop for WindowsHook {
    fn drop(&mut self) {
        // SAFETY: posting to a thread id is valid even if the thread already exited.
        unsafe {
            PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Keyboard hook thread panicked while stopping");
            }
        }
    }
}

pub(super) fn install(callback: HookCallback) -> Result<WindowsHook, HookInstallError> {
    let (startup_tx, startup_rx) = mpsc::channel::<Result<u32, HookInstallError>>();

    let thread = thread::Builder::new()
        .name("hotkey-keyboard-hook".to_string())
        .spawn(move || run_hook_thread(callback, startup_tx))
        .map_err(|e| HookInstallError::Os(format!("failed to spawn hook thread: {e}")))?;

    match startup_rx.recv() {
        Ok(Ok(thread_id)) => Ok(WindowsHook {
            thread_id,
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(e) => {
            let _ = thread.join();
            Err(HookInstallError::Os(format!(
                "hook thread exited during startup: {e}"
            )))
        }
    }
}

fn run_hook_thread(callback: HookCallback, startup_tx: mpsc::Sender<Result<u32, HookInstallError>>) {
    CALLBACK.with(|cell| *cell.borrow_mut() = Some(callback));

    // SAFETY: all pointers passed below are to live stack values or null where the API allows it.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        // Force creation of this thread's message queue before anyone posts WM_QUIT to it
        PeekMessageW(&mut msg, std::ptr::null_mut(), WM_USER, WM_USER, PM_NOREMOVE);

        let hook = SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), std::ptr::null_mut(), 0);
        if hook.is_null() {
            let code = GetLastError();
            let err = if code == ERROR_ACCESS_DENIED {
                HookInstallError::PermissionDenied(format!("SetWindowsHookExW error {code}"))
            } else {
                HookInstallError::Os(format!("SetWindowsHookExW error {code}"))
            };
            CALLBACK.with(|cell| cell.borrow_mut().take());
            let _ = startup_tx.send(Err(err));
            return;
        }

        if startup_tx.send(Ok(GetCurrentThreadId())).is_err() {
            UnhookWindowsHookEx(hook);
            CALLBACK.with(|cell| cell.borrow_mut().take());
            return;
        }

        // 0 on WM_QUIT, -1 on error
        while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {}

        UnhookWindowsHookEx(hook);
    }
    CALLBACK.with(|cell| cell.borrow_mut().take());
}

unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        // SAFETY: for HC_ACTION, lparam points to a KBDLLHOOKSTRUCT owned by the system.
        let info = unsafe { &*(lparam as *const KBDLLHOOKSTRUCT) };
        if let Some(event) = translate(wparam as u32, info) {
            let decision = CALLBACK.with(|cell| match cell.try_borrow_mut() {
                Ok(mut slot) => slot.as_mut().map(|cb| cb(event)),
                Err(_) => None,
            });
            if decision == Some(HookDecision::Swallow) && event.direction == KeyDirection::Up {
                if let Some(vk) = win_vk(event.key) {
                    mask_start_menu(vk);
                    return 1;
                }
            }
        }
    }
    // SAFETY: forwarding the unmodified arguments to the next hook.
    unsafe { CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam) }
}

fn translate(message: u32, info: &KBDLLHOOKSTRUCT) -> Option<RawKeyEvent> {
    let direction = match message {
        WM_KEYDOWN | WM_SYSKEYDOWN => KeyDirection::Down,
        WM_KEYUP | WM_SYSKEYUP => KeyDirection::Up,
        _ => return None,
    };
    let key = match info.vkCode as u16 {
        VK_LWIN => RawKey::LWin,
        VK_RWIN => RawKey::RWin,
        other => RawKey::Other(u8::try_from(other).ok()?),
    };
    Some(RawKeyEvent {
        key,
        direction,
        injected: info.flags & LLKHF_INJECTED != 0,
    })
}

pub(super) fn is_key_down(key: RawKey) -> bool {
    let vk = match key {
        RawKey::LWin => VK_LWIN,
        RawKey::RWin => VK_RWIN,
        RawKey::Other(code) => u16::from(code),
    };
    // SAFETY: GetAsyncKeyState has no preconditions.
    let state = unsafe { GetAsyncKeyState(i32::from(vk)) };
    // High bit: down right now
    state < 0
}

fn win_vk(key: RawKey) -> Option<u16> {
    match key {
        RawKey::LWin => Some(VK_LWIN),
        RawKey::RWin => Some(VK_RWIN),
        RawKey::Other(_) => None,
    }
}

/// Replace a swallowed Win release with mask key down/up plus a synthetic Win release.
fn mask_start_menu(win_vk: u16) {
    let key = |vk: u16, flags: u32| INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    let inputs = [
        key(VK_MASK_KEY, 0),
        key(VK_MASK_KEY, KEYEVENTF_KEYUP),
        key(win_vk, KEYEVENTF_KEYUP),
    ];
    // SAFETY: `inputs` is a live array of correctly sized INPUT structs.
    let sent = unsafe {
        SendInput(
            inputs.len() as u32,
            inputs.as_ptr(),
            std::mem::size_of::<INPUT>() as i32,
        )
    };
    if sent as usize != inputs.len() {
        warn!(sent = sent, "SendInput could not mask the Start menu");
    }
}
