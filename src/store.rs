//! Key/value blob persistence for application state.
//!
//! Scan locations, saved chains, run history, icon overrides, and UI
//! preferences are all small serde-serializable blobs keyed by name in one
//! JSON file (`~/.scriptlet-runner/settings.json`). Saves are atomic
//! (write temp file, rename) so a crash mid-save never corrupts settings.
//! Nothing here is written while an execution is in flight; callers persist
//! before a run starts or after it fully ends.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Well-known store keys.
pub mod keys {
    pub const SCAN_LOCATIONS: &str = "scanLocations";
    pub const SAVED_CHAINS: &str = "savedChains";
    pub const RUN_HISTORY: &str = "runHistory";
    pub const APPEARANCE_MODE: &str = "appearanceMode";
    pub const CLEAR_CONSOLE_ON_RUN: &str = "clearConsoleOnRun";
    pub const SCRIPT_ICONS: &str = "scriptIcons";
}

/// A JSON-file-backed key/blob store.
#[derive(Debug)]
pub struct BlobStore {
    entries: BTreeMap<String, Value>,
    file_path: PathBuf,
    dirty: bool,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::with_path(Self::default_path())
    }

    /// A store over a custom file (for testing).
    pub fn with_path(file_path: PathBuf) -> Self {
        BlobStore {
            entries: BTreeMap::new(),
            file_path,
            dirty: false,
        }
    }

    fn default_path() -> PathBuf {
        PathBuf::from(shellexpand::tilde("~/.scriptlet-runner/settings.json").as_ref())
    }

    /// Load the store from disk. A missing file is an empty store.
    #[instrument(name = "store_load", skip(self))]
    pub fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            debug!(path = %self.file_path.display(), "Settings file not found, starting fresh");
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read settings: {}", self.file_path.display()))?;
        self.entries =
            serde_json::from_str(&content).context("Failed to parse settings JSON")?;

        debug!(
            path = %self.file_path.display(),
            key_count = self.entries.len(),
            "Loaded settings"
        );
        self.dirty = false;
        Ok(())
    }

    /// Save to disk using an atomic write (temp file + rename). No-op when
    /// nothing changed.
    #[instrument(name = "store_save", skip(self))]
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            debug!("No changes to save");
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize settings")?;

        let temp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json).with_context(|| {
            format!("Failed to write temp settings file: {}", temp_path.display())
        })?;
        std::fs::rename(&temp_path, &self.file_path).with_context(|| {
            format!("Failed to rename temp file to {}", self.file_path.display())
        })?;

        info!(
            path = %self.file_path.display(),
            bytes = json.len(),
            "Saved settings (atomic)"
        );
        self.dirty = false;
        Ok(())
    }

    /// Fetch and decode a blob. `None` when the key is absent; an error
    /// when the stored blob doesn't decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => {
                let decoded = serde_json::from_value(value.clone())
                    .with_context(|| format!("Stored value for '{}' has unexpected shape", key))?;
                Ok(Some(decoded))
            }
        }
    }

    /// Encode and store a blob under `key`.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)
            .with_context(|| format!("Failed to encode value for '{}'", key))?;
        self.entries.insert(key.to_string(), encoded);
        self.dirty = true;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ScanLocation;
    use tempfile::TempDir;

    fn test_store(dir: &TempDir) -> BlobStore {
        BlobStore::with_path(dir.path().join("settings.json"))
    }

    #[test]
    fn test_set_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = test_store(&dir);

        store.set(keys::CLEAR_CONSOLE_ON_RUN, &true).unwrap();
        assert_eq!(store.get::<bool>(keys::CLEAR_CONSOLE_ON_RUN).unwrap(), Some(true));
        assert_eq!(store.get::<bool>("missing").unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let locations = vec![ScanLocation::new("/home/user/scripts")];
        {
            let mut store = BlobStore::with_path(path.clone());
            store.set(keys::SCAN_LOCATIONS, &locations).unwrap();
            store.set(keys::APPEARANCE_MODE, &"dark").unwrap();
            store.save().unwrap();
        }

        let mut store = BlobStore::with_path(path);
        store.load().unwrap();
        let loaded: Vec<ScanLocation> = store.get(keys::SCAN_LOCATIONS).unwrap().unwrap();
        assert_eq!(loaded, locations);
        assert_eq!(
            store.get::<String>(keys::APPEARANCE_MODE).unwrap(),
            Some("dark".to_string())
        );
    }

    #[test]
    fn test_load_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let mut store = test_store(&dir);
        store.load().unwrap();
        assert!(!store.contains(keys::SAVED_CHAINS));
    }

    #[test]
    fn test_load_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let mut store = BlobStore::with_path(path);
        assert!(store.load().is_err());
    }

    #[test]
    fn test_save_skips_when_clean() {
        let dir = TempDir::new().unwrap();
        let mut store = test_store(&dir);
        store.save().unwrap();
        // Nothing was dirty, so no file appears
        assert!(!dir.path().join("settings.json").exists());
    }

    #[test]
    fn test_remove_marks_dirty_only_when_present() {
        let dir = TempDir::new().unwrap();
        let mut store = test_store(&dir);

        store.remove("never-there");
        store.save().unwrap();
        assert!(!dir.path().join("settings.json").exists());

        store.set(keys::SCRIPT_ICONS, &"terminal").unwrap();
        store.save().unwrap();
        store.remove(keys::SCRIPT_ICONS);
        store.save().unwrap();

        let mut reloaded = BlobStore::with_path(dir.path().join("settings.json"));
        reloaded.load().unwrap();
        assert!(!reloaded.contains(keys::SCRIPT_ICONS));
    }

    #[test]
    fn test_wrong_shape_is_an_error_not_none() {
        let dir = TempDir::new().unwrap();
        let mut store = test_store(&dir);
        store.set(keys::APPEARANCE_MODE, &"system").unwrap();
        assert!(store.get::<Vec<u32>>(keys::APPEARANCE_MODE).is_err());
    }
}
