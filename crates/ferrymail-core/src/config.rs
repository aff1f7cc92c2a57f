//! Application configuration

use crate::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Settings read from `config.json` in the FerryMail config directory
///
/// Every field falls back to its default when missing from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,
    /// JSON file holding the user preferences
    pub preferences_path: PathBuf,
    /// `host:port` used to probe network reachability
    pub probe_address: String,
    pub probe_timeout_ms: u64,
    /// `tracing` filter directives, overridden by `RUST_LOG`
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ferrymail");
        Self {
            database_path: data_dir.join("ferrymail.db"),
            preferences_path: Self::config_dir().join("preferences.json"),
            probe_address: "1.1.1.1:443".to_string(),
            probe_timeout_ms: 3000,
            log_filter: "ferrymail_core=info,ferrymail_folders=debug".to_string(),
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ferrymail")
    }

    /// Load from the default location
    pub fn load() -> CoreResult<Self> {
        Self::load_from(Self::config_dir().join("config.json"))
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load_from(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => {
                info!("Loading config from {}", path.display());
                Ok(serde_json::from_str(&json)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
