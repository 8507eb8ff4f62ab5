//! Primary keys and modifier sets.
//!
//! This module provides:
//! - `Modifiers` - Bitmask of Ctrl/Alt/Shift/Win (order irrelevant)
//! - `Key` - The closed set of primary keys a combination can end in
//! - `Platform` - Target platform used for display formatting
//! - Alias canonicalization shared by the combination parser

use bitflags::bitflags;
use global_hotkey::hotkey::{Code, Modifiers as OsModifiers};

bitflags! {
    /// Modifier keys held together with the primary key.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Modifiers: u8 {
        const CTRL = 0b0001;
        const ALT = 0b0010;
        const SHIFT = 0b0100;
        /// Windows key on Windows, Command on macOS, Super on Linux
        const WIN = 0b1000;
    }
}

impl Modifiers {
    /// Canonical display order. Parsing accepts any order.
    pub const ORDERED: [(Modifiers, &'static str); 4] = [
        (Modifiers::CTRL, "Ctrl"),
        (Modifiers::ALT, "Alt"),
        (Modifiers::SHIFT, "Shift"),
        (Modifiers::WIN, "Win"),
    ];

    /// Map a single token to a modifier flag, if it names one.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "ctrl" | "control" | "ctl" | "^" | "⌃" => Some(Self::CTRL),
            "alt" | "option" | "opt" | "⌥" => Some(Self::ALT),
            "shift" | "shft" | "⇧" => Some(Self::SHIFT),
            "win" | "windows" | "meta" | "super" | "cmd" | "command" | "⌘" => Some(Self::WIN),
            _ => None,
        }
    }

    /// Convert to the flags understood by the OS registration facility.
    pub fn to_os(self) -> OsModifiers {
        let mut mods = OsModifiers::empty();
        if self.contains(Self::CTRL) {
            mods |= OsModifiers::CONTROL;
        }
        if self.contains(Self::ALT) {
            mods |= OsModifiers::ALT;
        }
        if self.contains(Self::SHIFT) {
            mods |= OsModifiers::SHIFT;
        }
        if self.contains(Self::WIN) {
            mods |= OsModifiers::META;
        }
        mods
    }
}

/// Platform enum for display formatting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            Platform::MacOS
        }
        #[cfg(target_os = "windows")]
        {
            Platform::Windows
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Platform::Linux
        }
    }
}

/// A primary (non-modifier) key.
///
/// `LWin` and `RWin` are the bare Windows keys. They are only meaningful as a
/// combination on their own; the OS hotkey facility has no key code for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    D0,
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    D8,
    D9,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
    F21,
    F22,
    F23,
    F24,
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    PrintScreen,
    Pause,
    Semicolon,
    Quote,
    Comma,
    Period,
    Slash,
    Backslash,
    BracketLeft,
    BracketRight,
    Minus,
    Equal,
    Backquote,
    LWin,
    RWin,
}

impl Key {
    pub const ALL: &'static [Key] = &[
        Key::A,
        Key::B,
        Key::C,
        Key::D,
        Key::E,
        Key::F,
        Key::G,
        Key::H,
        Key::I,
        Key::J,
        Key::K,
        Key::L,
        Key::M,
        Key::N,
        Key::O,
        Key::P,
        Key::Q,
        Key::R,
        Key::S,
        Key::T,
        Key::U,
        Key::V,
        Key::W,
        Key::X,
        Key::Y,
        Key::Z,
        Key::D0,
        Key::D1,
        Key::D2,
        Key::D3,
        Key::D4,
        Key::D5,
        Key::D6,
        Key::D7,
        Key::D8,
        Key::D9,
        Key::F1,
        Key::F2,
        Key::F3,
        Key::F4,
        Key::F5,
        Key::F6,
        Key::F7,
        Key::F8,
        Key::F9,
        Key::F10,
        Key::F11,
        Key::F12,
        Key::F13,
        Key::F14,
        Key::F15,
        Key::F16,
        Key::F17,
        Key::F18,
        Key::F19,
        Key::F20,
        Key::F21,
        Key::F22,
        Key::F23,
        Key::F24,
        Key::Space,
        Key::Enter,
        Key::Tab,
        Key::Escape,
        Key::Backspace,
        Key::Delete,
        Key::Insert,
        Key::Home,
        Key::End,
        Key::PageUp,
        Key::PageDown,
        Key::Up,
        Key::Down,
        Key::Left,
        Key::Right,
        Key::PrintScreen,
        Key::Pause,
        Key::Semicolon,
        Key::Quote,
        Key::Comma,
        Key::Period,
        Key::Slash,
        Key::Backslash,
        Key::BracketLeft,
        Key::BracketRight,
        Key::Minus,
        Key::Equal,
        Key::Backquote,
        Key::LWin,
        Key::RWin,
    ];

    /// Canonical name used in the persisted string form.
    pub fn name(self) -> &'static str {
        match self {
            Key::A => "A",
            Key::B => "B",
            Key::C => "C",
            Key::D => "D",
            Key::E => "E",
            Key::F => "F",
            Key::G => "G",
            Key::H => "H",
            Key::I => "I",
            Key::J => "J",
            Key::K => "K",
            Key::L => "L",
            Key::M => "M",
            Key::N => "N",
            Key::O => "O",
            Key::P => "P",
            Key::Q => "Q",
            Key::R => "R",
            Key::S => "S",
            Key::T => "T",
            Key::U => "U",
            Key::V => "V",
            Key::W => "W",
            Key::X => "X",
            Key::Y => "Y",
            Key::Z => "Z",
            Key::D0 => "0",
            Key::D1 => "1",
            Key::D2 => "2",
            Key::D3 => "3",
            Key::D4 => "4",
            Key::D5 => "5",
            Key::D6 => "6",
            Key::D7 => "7",
            Key::D8 => "8",
            Key::D9 => "9",
            Key::F1 => "F1",
            Key::F2 => "F2",
            Key::F3 => "F3",
            Key::F4 => "F4",
            Key::F5 => "F5",
            Key::F6 => "F6",
            Key::F7 => "F7",
            Key::F8 => "F8",
            Key::F9 => "F9",
            Key::F10 => "F10",
            Key::F11 => "F11",
            Key::F12 => "F12",
            Key::F13 => "F13",
            Key::F14 => "F14",
            Key::F15 => "F15",
            Key::F16 => "F16",
            Key::F17 => "F17",
            Key::F18 => "F18",
            Key::F19 => "F19",
            Key::F20 => "F20",
            Key::F21 => "F21",
            Key::F22 => "F22",
            Key::F23 => "F23",
            Key::F24 => "F24",
            Key::Space => "Space",
            Key::Enter => "Enter",
            Key::Tab => "Tab",
            Key::Escape => "Escape",
            Key::Backspace => "Backspace",
            Key::Delete => "Delete",
            Key::Insert => "Insert",
            Key::Home => "Home",
            Key::End => "End",
            Key::PageUp => "PageUp",
            Key::PageDown => "PageDown",
            Key::Up => "Up",
            Key::Down => "Down",
            Key::Left => "Left",
            Key::Right => "Right",
            Key::PrintScreen => "PrintScreen",
            Key::Pause => "Pause",
            Key::Semicolon => "Semicolon",
            Key::Quote => "Quote",
            Key::Comma => "Comma",
            Key::Period => "Period",
            Key::Slash => "Slash",
            Key::Backslash => "Backslash",
            Key::BracketLeft => "BracketLeft",
            Key::BracketRight => "BracketRight",
            Key::Minus => "Minus",
            Key::Equal => "Equal",
            Key::Backquote => "Backquote",
            Key::LWin => "LWin",
            Key::RWin => "RWin",
        }
    }

    /// Resolve a single key token (any case, any known alias).
    pub fn from_token(token: &str) -> Option<Self> {
        let canonical = canonicalize_key(token);
        Key::ALL
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(&canonical))
    }

    /// Key code for the OS registration facility.
    ///
    /// Returns `None` for the bare Windows keys, which that facility cannot bind.
    pub fn code(self) -> Option<Code> {
        let code = match self {
            Key::A => Code::KeyA,
            Key::B => Code::KeyB,
            Key::C => Code::KeyC,
            Key::D => Code::KeyD,
            Key::E => Code::KeyE,
            Key::F => Code::KeyF,
            Key::G => Code::KeyG,
            Key::H => Code::KeyH,
            Key::I => Code::KeyI,
            Key::J => Code::KeyJ,
            Key::K => Code::KeyK,
            Key::L => Code::KeyL,
            Key::M => Code::KeyM,
            Key::N => Code::KeyN,
            Key::O => Code::KeyO,
            Key::P => Code::KeyP,
            Key::Q => Code::KeyQ,
            Key::R => Code::KeyR,
            Key::S => Code::KeyS,
            Key::T => Code::KeyT,
            Key::U => Code::KeyU,
            Key::V => Code::KeyV,
            Key::W => Code::KeyW,
            Key::X => Code::KeyX,
            Key::Y => Code::KeyY,
            Key::Z => Code::KeyZ,
            Key::D0 => Code::Digit0,
            Key::D1 => Code::Digit1,
            Key::D2 => Code::Digit2,
            Key::D3 => Code::Digit3,
            Key::D4 => Code::Digit4,
            Key::D5 => Code::Digit5,
            Key::D6 => Code::Digit6,
            Key::D7 => Code::Digit7,
            Key::D8 => Code::Digit8,
            Key::D9 => Code::Digit9,
            Key::F1 => Code::F1,
            Key::F2 => Code::F2,
            Key::F3 => Code::F3,
            Key::F4 => Code::F4,
            Key::F5 => Code::F5,
            Key::F6 => Code::F6,
            Key::F7 => Code::F7,
            Key::F8 => Code::F8,
            Key::F9 => Code::F9,
            Key::F10 => Code::F10,
            Key::F11 => Code::F11,
            Key::F12 => Code::F12,
            Key::F13 => Code::F13,
            Key::F14 => Code::F14,
            Key::F15 => Code::F15,
            Key::F16 => Code::F16,
            Key::F17 => Code::F17,
            Key::F18 => Code::F18,
            Key::F19 => Code::F19,
            Key::F20 => Code::F20,
            Key::F21 => Code::F21,
            Key::F22 => Code::F22,
            Key::F23 => Code::F23,
            Key::F24 => Code::F24,
            Key::Space => Code::Space,
            Key::Enter => Code::Enter,
            Key::Tab => Code::Tab,
            Key::Escape => Code::Escape,
            Key::Backspace => Code::Backspace,
            Key::Delete => Code::Delete,
            Key::Insert => Code::Insert,
            Key::Home => Code::Home,
            Key::End => Code::End,
            Key::PageUp => Code::PageUp,
            Key::PageDown => Code::PageDown,
            Key::Up => Code::ArrowUp,
            Key::Down => Code::ArrowDown,
            Key::Left => Code::ArrowLeft,
            Key::Right => Code::ArrowRight,
            Key::PrintScreen => Code::PrintScreen,
            Key::Pause => Code::Pause,
            Key::Semicolon => Code::Semicolon,
            Key::Quote => Code::Quote,
            Key::Comma => Code::Comma,
            Key::Period => Code::Period,
            Key::Slash => Code::Slash,
            Key::Backslash => Code::Backslash,
            Key::BracketLeft => Code::BracketLeft,
            Key::BracketRight => Code::BracketRight,
            Key::Minus => Code::Minus,
            Key::Equal => Code::Equal,
            Key::Backquote => Code::Backquote,
            Key::LWin | Key::RWin => return None,
        };
        Some(code)
    }

    /// True for the bare Windows keys.
    pub fn is_win_key(self) -> bool {
        matches!(self, Key::LWin | Key::RWin)
    }

    /// Glyph used in the macOS menu-style rendering, if the key has one.
    pub fn glyph(self) -> Option<&'static str> {
        let glyph = match self {
            Key::Enter => "↵",
            Key::Escape => "⎋",
            Key::Tab => "⇥",
            Key::Space => "␣",
            Key::Backspace => "⌫",
            Key::Delete => "⌦",
            Key::Up => "↑",
            Key::Down => "↓",
            Key::Left => "←",
            Key::Right => "→",
            Key::Home => "↖",
            Key::End => "↘",
            Key::PageUp => "⇞",
            Key::PageDown => "⇟",
            Key::LWin | Key::RWin => "⌘",
            _ => return None,
        };
        Some(glyph)
    }
}

/// Canonicalize a key token to the spelling of a `Key::name()`.
///
/// Unknown tokens are returned unchanged (lowercased) so the caller can report them.
pub fn canonicalize_key(token: &str) -> String {
    let lower = token.trim().to_lowercase();
    if let Some(rest) = lower.strip_prefix("digit") {
        if rest.len() == 1 && rest.chars().all(|c| c.is_ascii_digit()) {
            return rest.to_string();
        }
    }
    if let Some(rest) = lower.strip_prefix("key") {
        if rest.len() == 1 && rest.chars().all(|c| c.is_ascii_alphabetic()) {
            return rest.to_string();
        }
    }
    if lower.len() == 2 && lower.starts_with('d') && lower[1..].chars().all(|c| c.is_ascii_digit())
    {
        return lower[1..].to_string();
    }
    match lower.as_str() {
        "arrowup" | "uparrow" => "up",
        "arrowdown" | "downarrow" => "down",
        "arrowleft" | "leftarrow" => "left",
        "arrowright" | "rightarrow" => "right",
        "return" => "enter",
        "esc" => "escape",
        "back" => "backspace",
        "del" => "delete",
        "ins" => "insert",
        "spacebar" => "space",
        "pgup" | "prior" => "pageup",
        "pgdn" | "pgdown" | "next" => "pagedown",
        "prtsc" | "printscr" | "snapshot" => "printscreen",
        "/" | "forwardslash" | "oem2" => "slash",
        "\\" | "oem5" => "backslash",
        ";" | "oem1" | "oemsemicolon" => "semicolon",
        "'" | "apostrophe" | "oem7" | "oemquotes" => "quote",
        "," | "oemcomma" => "comma",
        "." | "dot" | "oemperiod" => "period",
        "[" | "leftbracket" | "oem4" | "oemopenbrackets" => "bracketleft",
        "]" | "rightbracket" | "oem6" | "oemclosebrackets" => "bracketright",
        "-" | "dash" | "hyphen" | "oemminus" => "minus",
        "=" | "equals" | "oemplus" => "equal",
        "`" | "backtick" | "grave" | "oem3" | "oemtilde" => "backquote",
        "lwin" | "leftwin" | "lmeta" | "lcmd" => "lwin",
        "rwin" | "rightwin" | "rmeta" | "rcmd" => "rwin",
        _ => return lower,
    }
    .to_string()
}
