//! Run history: a capped, newest-first log of script executions.
//!
//! An entry is recorded just before a run starts, carrying the argument
//! strings in display form; the exit code is patched onto the newest entry
//! once the run resolves. Both writes happen outside any execution window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::arguments;
use crate::scripts::ScriptArgument;
use crate::store::{keys, BlobStore};

/// Maximum number of entries kept.
const MAX_HISTORY_ENTRIES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunHistoryEntry {
    pub id: Uuid,
    pub script_path: String,
    pub script_name: String,
    pub run_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Store-backed history manager. Holds the list in memory; every mutation
/// writes through to the blob store (persisting is the caller's save call).
#[derive(Debug, Default)]
pub struct RunHistory {
    entries: Vec<RunHistoryEntry>,
}

impl RunHistory {
    /// Read history out of the store. Unreadable or absent history is
    /// simply empty.
    pub fn load(store: &BlobStore) -> Self {
        let entries = store
            .get::<Vec<RunHistoryEntry>>(keys::RUN_HISTORY)
            .unwrap_or_default()
            .unwrap_or_default();
        RunHistory { entries }
    }

    /// Record a run about to start. Newest first, capped.
    pub fn record(
        &mut self,
        script_path: &str,
        script_name: &str,
        script_arguments: &[ScriptArgument],
    ) {
        let entry = RunHistoryEntry {
            id: Uuid::new_v4(),
            script_path: script_path.to_string(),
            script_name: script_name.to_string(),
            run_date: Utc::now(),
            exit_code: None,
            arguments: arguments::history_strings(script_arguments),
        };
        debug!(script = script_path, "Recording history entry");
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY_ENTRIES);
    }

    /// Patch the exit code onto the most recent entry.
    pub fn record_exit_code(&mut self, exit_code: i32) {
        if let Some(latest) = self.entries.first_mut() {
            latest.exit_code = Some(exit_code);
        }
    }

    pub fn entries(&self) -> &[RunHistoryEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Write the current list into the store (caller saves the store).
    pub fn persist(&self, store: &mut BlobStore) -> anyhow::Result<()> {
        store.set(keys::RUN_HISTORY, &self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn enabled_flag(long: &str, requires_value: bool, value: &str) -> ScriptArgument {
        let placeholder = requires_value.then_some("VALUE");
        let mut arg = ScriptArgument::flag(None, Some(long), "desc", requires_value, placeholder);
        arg.is_enabled = true;
        arg.value = value.to_string();
        arg
    }

    #[test]
    fn test_record_is_newest_first() {
        let mut history = RunHistory::default();
        history.record("/s/first.sh", "first.sh", &[]);
        history.record("/s/second.sh", "second.sh", &[]);

        assert_eq!(history.entries()[0].script_name, "second.sh");
        assert_eq!(history.entries()[1].script_name, "first.sh");
    }

    #[test]
    fn test_record_captures_argument_display_form() {
        let mut history = RunHistory::default();
        let args = vec![
            enabled_flag("--verbose", false, ""),
            enabled_flag("--env", true, "staging"),
        ];
        history.record("/s/deploy.sh", "deploy.sh", &args);

        assert_eq!(
            history.entries()[0].arguments,
            vec!["--verbose", "--env staging"]
        );
        assert_eq!(history.entries()[0].exit_code, None);
    }

    #[test]
    fn test_exit_code_patches_newest_entry() {
        let mut history = RunHistory::default();
        history.record("/s/old.sh", "old.sh", &[]);
        history.record("/s/new.sh", "new.sh", &[]);
        history.record_exit_code(3);

        assert_eq!(history.entries()[0].exit_code, Some(3));
        assert_eq!(history.entries()[1].exit_code, None);
    }

    #[test]
    fn test_exit_code_on_empty_history_is_noop() {
        let mut history = RunHistory::default();
        history.record_exit_code(0);
        assert!(history.entries().is_empty());
    }

    #[test]
    fn test_history_is_capped() {
        let mut history = RunHistory::default();
        for i in 0..60 {
            history.record(&format!("/s/{}.sh", i), &format!("{}.sh", i), &[]);
        }
        assert_eq!(history.entries().len(), 50);
        // Newest kept, oldest dropped
        assert_eq!(history.entries()[0].script_name, "59.sh");
        assert_eq!(history.entries()[49].script_name, "10.sh");
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        {
            let mut store = BlobStore::with_path(path.clone());
            let mut history = RunHistory::default();
            history.record("/s/a.sh", "a.sh", &[]);
            history.record_exit_code(0);
            history.persist(&mut store).unwrap();
            store.save().unwrap();
        }

        let mut store = BlobStore::with_path(path);
        store.load().unwrap();
        let history = RunHistory::load(&store);
        assert_eq!(history.entries().len(), 1);
        assert_eq!(history.entries()[0].script_name, "a.sh");
        assert_eq!(history.entries()[0].exit_code, Some(0));
    }
}
