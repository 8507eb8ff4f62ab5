//! Settings document types
//!
//! Hotkeys stay as raw strings here. They are parsed at bind time so one
//! malformed entry is reported on its own instead of failing the whole file.

use serde::{Deserialize, Serialize};

use super::defaults::*;

/// A persisted custom hotkey: combination plus the query keyword it injects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomBinding {
    pub hotkey: String,
    pub action_keyword: String,
}

impl CustomBinding {
    pub fn new(hotkey: impl Into<String>, action_keyword: impl Into<String>) -> Self {
        Self {
            hotkey: hotkey.into(),
            action_keyword: action_keyword.into(),
        }
    }
}

/// Dispatch engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,
    /// Swallow the release of a matched bare Win key so the Start menu stays closed
    #[serde(default = "default_swallow_reserved_keys")]
    pub swallow_reserved_keys: bool,
}

fn default_dispatch_queue_capacity() -> usize {
    DEFAULT_DISPATCH_QUEUE_CAPACITY
}

fn default_swallow_reserved_keys() -> bool {
    DEFAULT_SWALLOW_RESERVED_KEYS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
            swallow_reserved_keys: default_swallow_reserved_keys(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Primary launcher toggle
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default)]
    pub custom_hotkeys: Vec<CustomBinding>,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_hotkey() -> String {
    DEFAULT_TOGGLE_HOTKEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hotkey: default_hotkey(),
            custom_hotkeys: Vec::new(),
            engine: EngineConfig::default(),
        }
    }
}
