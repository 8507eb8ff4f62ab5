//! Default configuration values

/// Settings file location before tilde expansion
pub const DEFAULT_CONFIG_PATH: &str = "~/.hotkey-dispatch/settings.json";

/// Primary launcher toggle
pub const DEFAULT_TOGGLE_HOTKEY: &str = "Alt+Space";

/// Fires that may wait for the host loop before new ones are dropped
pub const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 64;

pub const DEFAULT_SWALLOW_RESERVED_KEYS: bool = false;
