//! `KeyCombination` - canonical, comparable key + modifier set.
//!
//! Parsing is total: every input either yields a combination or a
//! `ParseError` describing what was wrong. The canonical string form
//! (`Ctrl+Alt+Space`) is what settings persist and what logs display.

use std::fmt;
use std::str::FromStr;

use global_hotkey::hotkey::HotKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::types::{Key, Modifiers, Platform};

/// Errors that can occur when parsing a combination string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("hotkey string is empty")]
    Empty,
    #[error("hotkey '{0}' contains an empty segment")]
    EmptyToken(String),
    #[error("hotkey '{0}' has no key, only modifiers")]
    MissingKey(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("hotkey has more than one key ('{0}' and '{1}')")]
    MultipleKeys(String, String),
}

/// A physical key plus the modifier set held with it. Immutable once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCombination {
    modifiers: Modifiers,
    key: Key,
}

impl KeyCombination {
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    /// A combination made of one key and no modifiers.
    pub fn bare(key: Key) -> Self {
        Self::new(Modifiers::empty(), key)
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut modifiers = Modifiers::empty();
        let mut key: Option<(Key, &str)> = None;

        for raw in trimmed.split('+') {
            let token = raw.trim();
            if token.is_empty() {
                return Err(ParseError::EmptyToken(trimmed.to_string()));
            }
            if let Some(flag) = Modifiers::from_token(token) {
                modifiers |= flag;
                continue;
            }
            let parsed = Key::from_token(token)
                .ok_or_else(|| ParseError::UnknownKey(token.to_string()))?;
            if let Some((_, previous)) = key {
                return Err(ParseError::MultipleKeys(
                    previous.to_string(),
                    token.to_string(),
                ));
            }
            key = Some((parsed, token));
        }

        let (key, _) = key.ok_or_else(|| ParseError::MissingKey(trimmed.to_string()))?;
        Ok(Self { modifiers, key })
    }

    /// True exactly for the bare Win-key variants, which the OS hotkey
    /// facility cannot register and the keyboard hook must serve instead.
    pub fn is_reserved(&self) -> bool {
        self.modifiers.is_empty() && self.key.is_win_key()
    }

    /// The OS-level hotkey, or `None` when the key has no OS key code.
    pub fn to_hotkey(&self) -> Option<HotKey> {
        let code = self.key.code()?;
        let mods = self.modifiers.to_os();
        Some(HotKey::new(
            if mods.is_empty() { None } else { Some(mods) },
            code,
        ))
    }

    pub fn to_canonical_string(&self) -> String {
        let mut parts: Vec<&str> = Modifiers::ORDERED
            .iter()
            .filter(|(flag, _)| self.modifiers.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        parts.push(self.key.name());
        parts.join("+")
    }

    pub fn display(&self) -> String {
        self.display_for_platform(Platform::current())
    }

    pub fn display_for_platform(&self, platform: Platform) -> String {
        match platform {
            Platform::MacOS => self.display_macos(),
            Platform::Windows | Platform::Linux => self.to_canonical_string(),
        }
    }

    fn display_macos(&self) -> String {
        let mut s = String::new();
        if self.modifiers.contains(Modifiers::CTRL) {
            s.push('⌃');
        }
        if self.modifiers.contains(Modifiers::ALT) {
            s.push('⌥');
        }
        if self.modifiers.contains(Modifiers::SHIFT) {
            s.push('⇧');
        }
        if self.modifiers.contains(Modifiers::WIN) {
            s.push('⌘');
        }
        s.push_str(self.key.glyph().unwrap_or(self.key.name()));
        s
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for KeyCombination {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for KeyCombination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for KeyCombination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Canonicalize a combination string without keeping the parsed value.
pub fn normalize(s: &str) -> Result<String, ParseError> {
    KeyCombination::parse(s).map(|combo| combo.to_canonical_string())
}
