//! Durable user preferences
//!
//! Flat boolean flags stored as JSON, written through on every change.

use crate::CoreResult;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

pub struct Preferences {
    /// `None` keeps the values in memory only
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, bool>>,
}

impl Preferences {
    /// Preferences that are never written anywhere
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load preferences from a JSON file; a missing file yields empty preferences
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let values = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No preferences at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            values: Mutex::new(values),
        })
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, bool>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values().get(key).copied().unwrap_or(default)
    }

    /// Set a flag and persist all preferences
    pub fn put_bool(&self, key: &str, value: bool) -> CoreResult<()> {
        let mut values = self.values();
        values.insert(key.to_string(), value);

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&*values)?)?;
            info!("Saved preference {}={}", key, value);
        }

        Ok(())
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_defaults() {
        let prefs = Preferences::in_memory();
        assert!(!prefs.get_bool("folder_sync", false));
        assert!(prefs.get_bool("folder_sync", true));

        prefs.put_bool("folder_sync", true).unwrap();
        assert!(prefs.get_bool("folder_sync", false));
    }

    #[test]
    fn test_persisted_across_loads() {
        let dir = std::env::temp_dir().join(format!(
            "ferrymail-prefs-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = dir.join("preferences.json");

        let prefs = Preferences::load(&path).unwrap();
        assert!(!prefs.get_bool("folder_actions", false));
        prefs.put_bool("folder_actions", true).unwrap();

        let reloaded = Preferences::load(&path).unwrap();
        assert!(reloaded.get_bool("folder_actions", false));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "ferrymail-prefs-corrupt-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "not json").unwrap();

        assert!(Preferences::load(&path).is_err());
        std::fs::remove_file(path).unwrap();
    }
}
