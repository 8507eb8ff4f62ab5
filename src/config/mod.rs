//! Configuration module - hotkey settings
//!
//! - Loading settings from ~/.hotkey-dispatch/settings.json
//! - Default values for every field
//! - Type definitions for the settings document
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Settings structs (Config, CustomBinding, EngineConfig)
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{DEFAULT_CONFIG_PATH, DEFAULT_DISPATCH_QUEUE_CAPACITY, DEFAULT_TOGGLE_HOTKEY};
pub use loader::{default_config_path, load_config, try_load_config};
pub use types::{Config, CustomBinding, EngineConfig};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
