//! Configuration loading from file system

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::DEFAULT_CONFIG_PATH;
use super::types::Config;
use crate::error::ConfigError;

/// `~/.hotkey-dispatch/settings.json`, tilde-expanded.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref())
}

/// Read and parse the settings file.
pub fn try_load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str::<Config>(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load settings, falling back to `Config::default()` when the file is
/// missing or invalid.
#[instrument(name = "load_config", skip_all, fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        info!("Config file not found, using defaults");
        return Config::default();
    }

    match try_load_config(path) {
        Ok(config) => {
            info!(
                custom_hotkeys = config.custom_hotkeys.len(),
                "Successfully loaded config"
            );
            config
        }
        Err(ConfigError::Parse { source, .. }) => {
            let message = source.to_string();
            let hint = if message.contains("invalid type") && message.contains("customHotkeys") {
                "\n\nHint: 'customHotkeys' must be an array of objects. Example:\n\
                 \"customHotkeys\": [\n\
                   { \"hotkey\": \"Ctrl+Alt+W\", \"actionKeyword\": \"wiki\" }\n\
                 ]"
            } else if message.contains("missing field `actionKeyword`")
                || message.contains("missing field `hotkey`")
            {
                "\n\nHint: every custom hotkey needs both 'hotkey' and 'actionKeyword'."
            } else {
                ""
            };
            warn!(
                error = %source,
                hint = %hint,
                "Failed to parse config JSON, using defaults"
            );
            Config::default()
        }
        Err(e) => {
            warn!(error = %e, "Failed to read config, using defaults");
            Config::default()
        }
    }
}
