//! Centralized tracking of spawned script processes.
//!
//! Every child process group the engine spawns is registered here and
//! persisted to `~/.scriptlet-runner/active-pids.json`, so a crashed or
//! killed host can find and clean up orphaned script processes on the next
//! start. Hung scripts have no timeout; without this, a chain abandoned by
//! a crash would leave its current step running forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{LazyLock, RwLock};
use sysinfo::{Pid, System};
use tracing::{debug, info, warn};

/// Global singleton registry
pub static PROCESS_REGISTRY: LazyLock<ProcessRegistry> = LazyLock::new(ProcessRegistry::new);

/// Information about a tracked child process group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Process ID (equals the PGID; children are spawned with process_group(0))
    pub pid: u32,
    /// Path to the script being executed
    pub script_path: String,
    /// Timestamp when the process was started
    pub started_at: DateTime<Utc>,
}

/// Thread-safe registry of live script process groups
#[derive(Debug)]
pub struct ProcessRegistry {
    active: RwLock<HashMap<u32, ProcessInfo>>,
    active_pids_path: PathBuf,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".scriptlet-runner"))
            .unwrap_or_else(|| std::env::temp_dir().join(".scriptlet-runner"));
        Self::with_path(base.join("active-pids.json"))
    }

    /// Registry persisting to a custom path (for testing)
    pub fn with_path(active_pids_path: PathBuf) -> Self {
        ProcessRegistry {
            active: RwLock::new(HashMap::new()),
            active_pids_path,
        }
    }

    /// Track a newly spawned process group and persist the set.
    pub fn register(&self, pid: u32, script_path: &str) {
        debug!(pid = pid, script = script_path, "Registering process");
        if let Ok(mut active) = self.active.write() {
            active.insert(
                pid,
                ProcessInfo {
                    pid,
                    script_path: script_path.to_string(),
                    started_at: Utc::now(),
                },
            );
        }
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist active PIDs");
        }
    }

    /// Stop tracking a process group and persist the set.
    pub fn unregister(&self, pid: u32) {
        debug!(pid = pid, "Unregistering process");
        if let Ok(mut active) = self.active.write() {
            active.remove(&pid);
        }
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist active PIDs");
        }
    }

    pub fn active_processes(&self) -> Vec<ProcessInfo> {
        self.active
            .read()
            .map(|a| a.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        self.active.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_process_running(&self, pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        system.process(Pid::from_u32(pid)).is_some()
    }

    /// Kill every tracked process group. Used during shutdown.
    pub fn kill_all(&self) {
        let processes = self.active_processes();
        if processes.is_empty() {
            return;
        }
        info!(count = processes.len(), "Killing active process groups");
        for process_info in &processes {
            kill_group(process_info.pid);
        }
        if let Ok(mut active) = self.active.write() {
            active.clear();
        }
        let _ = fs::remove_file(&self.active_pids_path);
    }

    /// Detect and clean up orphaned processes from a previous crash.
    ///
    /// Reads the persisted PID file, kills whichever of those processes are
    /// still running, and clears the file. Returns the number killed.
    pub fn cleanup_orphans(&self) -> usize {
        let orphans = self.load_persisted();
        if orphans.is_empty() {
            return 0;
        }

        info!(count = orphans.len(), "Checking potentially orphaned processes");
        let mut killed = 0;
        for process_info in &orphans {
            if self.is_process_running(process_info.pid) {
                warn!(
                    pid = process_info.pid,
                    script = %process_info.script_path,
                    "Killing orphaned script process"
                );
                kill_group(process_info.pid);
                killed += 1;
            }
        }

        let _ = fs::remove_file(&self.active_pids_path);
        if killed > 0 {
            info!(killed = killed, "Cleaned up orphaned processes");
        }
        killed
    }

    fn persist(&self) -> std::io::Result<()> {
        let processes = self.active_processes();
        if let Some(parent) = self.active_pids_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&processes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.active_pids_path, json)
    }

    fn load_persisted(&self) -> Vec<ProcessInfo> {
        if !self.active_pids_path.exists() {
            return Vec::new();
        }
        let contents = match fs::read_to_string(&self.active_pids_path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "Failed to read active PIDs file");
                return Vec::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(pids) => pids,
            Err(e) => {
                warn!(error = %e, "Failed to parse active PIDs file");
                Vec::new()
            }
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use crate::executor::unix_process;
    if let Err(e) = unix_process::kill_process_group(pid, libc::SIGKILL) {
        debug!(pid = pid, error = e, "Process group kill reported");
    }
}

#[cfg(not(unix))]
fn kill_group(pid: u32) {
    debug!(pid = pid, "Non-Unix platform: cannot kill process group");
}
