//! Script execution engine.
//!
//! Owns the lifecycle of one external-process invocation: builds the
//! command, spawns the child in its own process group, captures stdout and
//! stderr continuously, and resolves to an [`ExecutionOutcome`] delivered
//! over the event bus.
//!
//! ## Stream capture
//!
//! Each stream gets a dedicated reader thread that forwards raw chunks over
//! an internal channel to a single pump thread. The pump is the only writer
//! to the output log, so appends are atomic per chunk and observers never
//! see partial writes. stderr chunks are prefixed with `[stderr] ` per
//! chunk. Because the channel is FIFO and the termination message is sent
//! only after both readers hit EOF, all output is flushed into the log
//! before `Finished` is emitted.
//!
//! Ordering between the two streams is whatever the OS delivers; only each
//! stream's own internal order is preserved.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::arguments;
use crate::error::{Result, RunnerError};
use crate::output::{EventBus, OutputLog, RunEvent};
use crate::process_registry::PROCESS_REGISTRY;
use crate::scripts::{Script, ScriptArgument};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Sentinel exit status for a process that never launched, and for
/// processes the OS reports no exit code for (killed by signal).
pub const LAUNCH_FAILURE_CODE: i32 = -1;

// Unix-specific process control using libc for correctness and performance
#[cfg(unix)]
pub(crate) mod unix_process {
    use libc::{c_int, pid_t, ESRCH};

    /// Send a signal to a process group (negative PID targets the group)
    pub fn kill_process_group(pgid: u32, signal: c_int) -> std::result::Result<(), &'static str> {
        // Safety: kill() is a simple syscall with no memory safety concerns
        let rc = unsafe { libc::kill(-(pgid as pid_t), signal) };
        if rc == 0 {
            Ok(())
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            match errno {
                libc::ESRCH => Err("No such process group"),
                libc::EPERM => Err("Permission denied"),
                libc::EINVAL => Err("Invalid signal"),
                _ => Err("Unknown error"),
            }
        }
    }

    /// Check if any process in the group is still alive.
    ///
    /// Signal 0 checks existence without delivering anything. EPERM means
    /// the group exists but we can't signal it; that still counts as alive.
    pub fn process_group_alive(pgid: u32) -> bool {
        let rc = unsafe { libc::kill(-(pgid as pid_t), 0) };
        if rc == 0 {
            true
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            errno != ESRCH
        }
    }

    pub const SIGTERM: c_int = libc::SIGTERM;
    pub const SIGKILL: c_int = libc::SIGKILL;
}

/// How an execution resolved.
///
/// `Exited` means the process launched and terminated; the code is the
/// OS-reported status, or [`LAUNCH_FAILURE_CODE`] when the OS reports none
/// (signal-killed). `LaunchFailed` means no process ever started and is a
/// distinct outcome, never conflated with a non-zero exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Exited(i32),
    LaunchFailed(String),
}

impl ExecutionOutcome {
    /// Collapse to a plain exit code where one is required.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionOutcome::Exited(code) => *code,
            ExecutionOutcome::LaunchFailed(_) => LAUNCH_FAILURE_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Exited(0))
    }
}

/// How the script gets invoked.
///
/// `Direct` passes the materialized tokens straight as the child's argv; no
/// shell is involved and values cannot be reinterpreted. `ShellString`
/// reproduces the legacy contract: one composed command line handed to the
/// preferred shell with `-c`, naive double quoting only. Values containing
/// shell metacharacters are expanded by the shell in that mode; it exists
/// for callers who want that, and is opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Invocation {
    #[default]
    Direct,
    ShellString,
}

/// The user's preferred shell: `$SHELL`, then `bash` from PATH, then
/// `/bin/sh`.
pub fn preferred_shell() -> PathBuf {
    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.is_empty() {
            return PathBuf::from(shell);
        }
    }
    which::which("bash").unwrap_or_else(|_| PathBuf::from("/bin/sh"))
}

/// Tracks the spawned process group so it can be signaled after the `Child`
/// has been handed to the waiter thread.
///
/// Registered with the process registry at spawn and unregistered on drop.
/// Dropping a handle whose process was not observed to exit kills the
/// group.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Process ID (used as PGID since we spawn with process_group(0))
    pid: u32,
    killed: bool,
    exited: bool,
}

impl ProcessHandle {
    fn new(pid: u32, script_path: &str) -> Self {
        PROCESS_REGISTRY.register(pid, script_path);
        ProcessHandle {
            pid,
            killed: false,
            exited: false,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Record that the process exited on its own, so drop doesn't signal a
    /// possibly-recycled pid.
    fn mark_exited(&mut self) {
        self.exited = true;
    }

    /// Kill the process group with graceful escalation (Unix) or mark only
    /// (other platforms).
    ///
    /// 1. SIGTERM to the group
    /// 2. wait up to the grace period for the group to disappear
    /// 3. SIGKILL if anything is still alive
    pub fn kill(&mut self) {
        /// Grace period after SIGTERM before escalating to SIGKILL
        const TERM_GRACE_MS: u64 = 250;
        const POLL_INTERVAL_MS: u64 = 50;

        if self.killed || self.exited {
            debug!(pid = self.pid, "Process already down, skipping kill");
            return;
        }
        self.killed = true;

        #[cfg(unix)]
        {
            use unix_process::{kill_process_group, process_group_alive, SIGKILL, SIGTERM};

            // Since we spawned with process_group(0), the PGID equals the PID
            let pgid = self.pid;

            debug!(pgid = pgid, "Sending SIGTERM to process group");
            match kill_process_group(pgid, SIGTERM) {
                Ok(()) => {}
                Err("No such process group") => {
                    debug!(pgid = pgid, "Process group already exited");
                    return;
                }
                Err(e) => {
                    warn!(pgid = pgid, error = e, "SIGTERM failed");
                    // Continue to try SIGKILL anyway
                }
            }

            let start = std::time::Instant::now();
            let grace = std::time::Duration::from_millis(TERM_GRACE_MS);
            let poll = std::time::Duration::from_millis(POLL_INTERVAL_MS);
            while start.elapsed() < grace {
                if !process_group_alive(pgid) {
                    debug!(pgid = pgid, "Process group terminated after SIGTERM");
                    return;
                }
                thread::sleep(poll);
            }

            info!(
                pgid = pgid,
                grace_ms = TERM_GRACE_MS,
                "Process group survived SIGTERM, escalating to SIGKILL"
            );
            match kill_process_group(pgid, SIGKILL) {
                Ok(()) | Err("No such process group") => {}
                Err(e) => error!(pgid = pgid, error = e, "SIGKILL failed"),
            }
        }

        #[cfg(not(unix))]
        {
            debug!(pid = self.pid, "Non-Unix platform: process marked as killed");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        PROCESS_REGISTRY.unregister(self.pid);
        self.kill();
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

enum PumpMessage {
    Chunk { kind: StreamKind, text: String },
    Finished { outcome: ExecutionOutcome },
}

/// The execution engine. One instance supports at most one in-flight
/// execution; `start` while running is rejected.
///
/// The log and event bus are shared handles: the chain orchestrator
/// constructs its engine over the chain's own log so step output and
/// banners land in one transcript.
pub struct ScriptExecutor {
    log: OutputLog,
    events: EventBus,
    active: Arc<Mutex<Option<ProcessHandle>>>,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self::with_log(OutputLog::new(), EventBus::new())
    }

    pub fn with_log(log: OutputLog, events: EventBus) -> Self {
        ScriptExecutor {
            log,
            events,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn log(&self) -> &OutputLog {
        &self.log
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.log.is_running()
    }

    /// Launch `script` with the given runtime argument state.
    ///
    /// Returns `Err(AlreadyRunning)` without touching any state if an
    /// execution is in flight. A process that cannot be spawned resolves
    /// through the event bus as [`ExecutionOutcome::LaunchFailed`] rather
    /// than an error here, so callers observe every run the same way.
    ///
    /// The log is appended to, not cleared; clearing is the caller's
    /// decision (the orchestrator keeps banners across steps).
    #[instrument(skip_all, fields(script = %script.path))]
    pub fn start(
        &self,
        script: &Script,
        script_arguments: &[ScriptArgument],
        invocation: Invocation,
    ) -> Result<()> {
        let mut active = self.active.lock();
        if self.log.is_running() || active.is_some() {
            debug!("Execution already in progress, rejecting start");
            return Err(RunnerError::AlreadyRunning);
        }

        let mut command = build_command(script, script_arguments, invocation);

        self.log.set_exit_code(None);
        self.log.set_running(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "Process spawn failed");
                let chunk = format!("Failed to start script: {}\n", e);
                self.log.append(&chunk);
                self.log.set_exit_code(Some(LAUNCH_FAILURE_CODE));
                self.log.set_running(false);
                self.events.emit(RunEvent::OutputAppended { chunk });
                self.events.emit(RunEvent::Finished {
                    outcome: ExecutionOutcome::LaunchFailed(e.to_string()),
                });
                return Ok(());
            }
        };

        let pid = child.id();
        info!(pid = pid, pgid = pid, "Process spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        *active = Some(ProcessHandle::new(pid, &script.path));
        drop(active);

        self.events.emit(RunEvent::Started { pid });

        let (tx, rx) = channel::<PumpMessage>();

        let mut readers = Vec::new();
        if let Some(stdout) = stdout {
            readers.push(spawn_chunk_reader(stdout, StreamKind::Stdout, tx.clone()));
        }
        if let Some(stderr) = stderr {
            readers.push(spawn_chunk_reader(stderr, StreamKind::Stderr, tx.clone()));
        }

        // Waiter: readers drain to EOF first (pipes close when the process
        // exits), so Finished is enqueued strictly after every chunk.
        let active = Arc::clone(&self.active);
        thread::spawn(move || {
            for reader in readers {
                let _ = reader.join();
            }
            let outcome = match child.wait() {
                Ok(status) => {
                    let code = status.code().unwrap_or(LAUNCH_FAILURE_CODE);
                    debug!(exit_code = code, "Process exited");
                    ExecutionOutcome::Exited(code)
                }
                Err(e) => {
                    error!(error = %e, "Failed to wait for child");
                    ExecutionOutcome::Exited(LAUNCH_FAILURE_CODE)
                }
            };
            let mut active = active.lock();
            if let Some(handle) = active.as_mut() {
                handle.mark_exited();
            }
            *active = None;
            drop(active);
            let _ = tx.send(PumpMessage::Finished { outcome });
        });

        // Pump: the single writer to the log.
        let log = self.log.clone();
        let events = self.events.clone();
        thread::spawn(move || {
            while let Ok(message) = rx.recv() {
                match message {
                    PumpMessage::Chunk { kind, text } => {
                        let chunk = match kind {
                            StreamKind::Stdout => text,
                            StreamKind::Stderr => format!("[stderr] {}", text),
                        };
                        log.append(&chunk);
                        events.emit(RunEvent::OutputAppended { chunk });
                    }
                    PumpMessage::Finished { outcome } => {
                        log.set_exit_code(Some(outcome.exit_code()));
                        log.set_running(false);
                        events.emit(RunEvent::Finished { outcome });
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Request termination of the live process. Advisory: the request is
    /// issued and the engine resolves whenever the OS reports the exit.
    /// No-op when nothing is running.
    pub fn cancel(&self) {
        let mut active = self.active.lock();
        match active.as_mut() {
            Some(handle) => {
                info!(pid = handle.pid(), "Cancellation requested");
                handle.kill();
            }
            None => debug!("Cancel with no active process is a no-op"),
        }
    }

    /// Wait for the current execution (if any) to resolve. Test and CLI
    /// convenience; the orchestrator listens on the event bus instead.
    pub fn wait_for_finish(&self) -> Option<ExecutionOutcome> {
        let rx = self.events.subscribe();
        if !self.is_running() {
            return self.log.exit_code().map(ExecutionOutcome::Exited);
        }
        for event in rx {
            if let RunEvent::Finished { outcome } = event {
                return Some(outcome);
            }
        }
        None
    }
}

/// Build the `Command` for an invocation: program + argv per the invocation
/// mode, working directory pinned to the script's own directory, and the
/// inherited environment with `HOME`, `USER`, and `TERM` forced so
/// TTY-sensitive tooling inside scripts behaves.
fn build_command(
    script: &Script,
    script_arguments: &[ScriptArgument],
    invocation: Invocation,
) -> Command {
    let mut command = match invocation {
        Invocation::Direct => {
            let mut command = Command::new(&script.path);
            command.args(arguments::materialize(script_arguments));
            command
        }
        Invocation::ShellString => {
            let mut command = Command::new(preferred_shell());
            command.arg("-c");
            command.arg(arguments::compose_command_line(
                &script.path,
                script_arguments,
            ));
            command
        }
    };

    command.current_dir(script.directory());

    if let Some(home) = dirs::home_dir() {
        command.env("HOME", home);
    }
    if let Ok(user) = std::env::var("USER") {
        command.env("USER", user);
    }
    command.env("TERM", "xterm-256color");

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // New process group so cancellation reaches the script's own children.
    // process_group(0) means the child's PID becomes the PGID.
    #[cfg(unix)]
    command.process_group(0);

    command
}

/// Read raw chunks until EOF, forwarding each to the pump. Chunks that are
/// not valid UTF-8 are dropped whole, not substituted.
fn spawn_chunk_reader<R: Read + Send + 'static>(
    mut reader: R,
    kind: StreamKind,
    tx: Sender<PumpMessage>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => match std::str::from_utf8(&buf[..n]) {
                    Ok(text) => {
                        let _ = tx.send(PumpMessage::Chunk {
                            kind,
                            text: text.to_string(),
                        });
                    }
                    Err(_) => {
                        debug!(bytes = n, "Dropping non-UTF-8 chunk");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Stream read error");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_executable_script(dir: &Path, name: &str, body: &str) -> Script {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).unwrap();
        }
        Script::new(&path.to_string_lossy())
    }

    #[test]
    fn test_outcome_exit_code_collapse() {
        assert_eq!(ExecutionOutcome::Exited(0).exit_code(), 0);
        assert_eq!(ExecutionOutcome::Exited(7).exit_code(), 7);
        assert_eq!(
            ExecutionOutcome::LaunchFailed("nope".to_string()).exit_code(),
            LAUNCH_FAILURE_CODE
        );
        assert!(ExecutionOutcome::Exited(0).is_success());
        assert!(!ExecutionOutcome::Exited(1).is_success());
        assert!(!ExecutionOutcome::LaunchFailed("nope".to_string()).is_success());
    }

    #[test]
    fn test_preferred_shell_is_absolute_or_findable() {
        let shell = preferred_shell();
        assert!(!shell.as_os_str().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let script =
            write_executable_script(dir.path(), "hello.sh", "#!/bin/sh\nprintf 'hello out'\n");

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        let outcome = executor.wait_for_finish().unwrap();

        assert_eq!(outcome, ExecutionOutcome::Exited(0));
        assert_eq!(executor.log().contents(), "hello out");
        assert!(!executor.is_running());
        assert_eq!(executor.log().exit_code(), Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_chunks_are_prefixed() {
        let dir = TempDir::new().unwrap();
        let script = write_executable_script(
            dir.path(),
            "noisy.sh",
            "#!/bin/sh\nprintf 'warning' >&2\n",
        );

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        executor.wait_for_finish().unwrap();

        let output = executor.log().contents();
        assert!(
            output.contains("[stderr] "),
            "stderr output should carry the marker: {:?}",
            output
        );
        assert!(output.contains("warning"));
    }

    #[cfg(unix)]
    #[test]
    fn test_both_streams_eventually_appear() {
        let dir = TempDir::new().unwrap();
        let script = write_executable_script(
            dir.path(),
            "both.sh",
            "#!/bin/sh\necho from-stdout\necho from-stderr >&2\n",
        );

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        executor.wait_for_finish().unwrap();

        // No cross-stream ordering assertion: only that all bytes landed.
        let output = executor.log().contents();
        assert!(output.contains("from-stdout"));
        assert!(output.contains("from-stderr"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_data_not_error() {
        let dir = TempDir::new().unwrap();
        let script = write_executable_script(dir.path(), "fail.sh", "#!/bin/sh\nexit 3\n");

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        let outcome = executor.wait_for_finish().unwrap();

        assert_eq!(outcome, ExecutionOutcome::Exited(3));
        assert_eq!(executor.log().exit_code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_failure_is_distinct_outcome() {
        let script = Script::new("/definitely/not/a/real/script.sh");

        let executor = ScriptExecutor::new();
        let rx = executor.events().subscribe();
        executor.start(&script, &[], Invocation::Direct).unwrap();

        let outcome = loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                RunEvent::Finished { outcome } => break outcome,
                _ => continue,
            }
        };
        assert!(matches!(outcome, ExecutionOutcome::LaunchFailed(_)));
        assert_eq!(executor.log().exit_code(), Some(LAUNCH_FAILURE_CODE));
        assert!(!executor.is_running());
        assert!(executor.log().contents().starts_with("Failed to start script:"));
    }

    #[cfg(unix)]
    #[test]
    fn test_start_while_running_is_rejected_without_touching_state() {
        let dir = TempDir::new().unwrap();
        let script =
            write_executable_script(dir.path(), "slow.sh", "#!/bin/sh\nsleep 5\n");

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        assert!(executor.is_running());

        let before = executor.log().contents();
        let second = executor.start(&script, &[], Invocation::Direct);
        assert!(matches!(second, Err(RunnerError::AlreadyRunning)));
        assert_eq!(executor.log().contents(), before);
        assert!(executor.is_running());

        executor.cancel();
        executor.wait_for_finish();
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_terminates_a_running_process() {
        let dir = TempDir::new().unwrap();
        let script =
            write_executable_script(dir.path(), "forever.sh", "#!/bin/sh\nsleep 300\n");

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        assert!(executor.is_running());

        executor.cancel();
        let outcome = executor.wait_for_finish().unwrap();

        // Killed by signal: the OS reports no exit code, we record the sentinel.
        assert_eq!(outcome, ExecutionOutcome::Exited(LAUNCH_FAILURE_CODE));
        assert!(!executor.is_running());
    }

    #[test]
    fn test_cancel_when_idle_is_a_noop() {
        let executor = ScriptExecutor::new();
        executor.cancel();
        assert!(!executor.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_arguments_reach_the_script_as_argv() {
        let dir = TempDir::new().unwrap();
        let script = write_executable_script(
            dir.path(),
            "echo-args.sh",
            "#!/bin/sh\nprintf '%s|' \"$@\"\n",
        );

        let mut flag = ScriptArgument::flag(None, Some("--msg"), "Message", true, Some("TEXT"));
        flag.is_enabled = true;
        flag.value = "hello world; echo injected".to_string();

        let executor = ScriptExecutor::new();
        executor.start(&script, &[flag], Invocation::Direct).unwrap();
        executor.wait_for_finish().unwrap();

        // Direct mode: the whole value is one argv entry, metacharacters inert.
        assert_eq!(
            executor.log().contents(),
            "--msg|hello world; echo injected|"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_string_mode_goes_through_the_shell() {
        let dir = TempDir::new().unwrap();
        let script = write_executable_script(
            dir.path(),
            "count-args.sh",
            "#!/bin/sh\necho \"argc=$#\"\n",
        );

        let mut flag = ScriptArgument::flag(None, Some("--msg"), "Message", true, Some("TEXT"));
        flag.is_enabled = true;
        flag.value = "two words".to_string();

        let executor = ScriptExecutor::new();
        executor
            .start(&script, &[flag], Invocation::ShellString)
            .unwrap();
        executor.wait_for_finish().unwrap();

        // The quoted composition keeps "two words" one argument.
        assert_eq!(executor.log().contents(), "argc=2\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_working_directory_is_script_directory() {
        let dir = TempDir::new().unwrap();
        let script = write_executable_script(dir.path(), "whereami.sh", "#!/bin/sh\npwd\n");

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        executor.wait_for_finish().unwrap();

        let reported = executor.log().contents();
        let reported = Path::new(reported.trim());
        // Compare canonicalized: the tempdir may sit behind a symlink.
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_forced_environment_reaches_the_script() {
        let dir = TempDir::new().unwrap();
        let script =
            write_executable_script(dir.path(), "env.sh", "#!/bin/sh\nprintf '%s' \"$TERM\"\n");

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        executor.wait_for_finish().unwrap();

        assert_eq!(executor.log().contents(), "xterm-256color");
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_is_reusable_after_a_run() {
        let dir = TempDir::new().unwrap();
        let script =
            write_executable_script(dir.path(), "twice.sh", "#!/bin/sh\nprintf 'run\\n'\n");

        let executor = ScriptExecutor::new();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        executor.wait_for_finish().unwrap();
        executor.start(&script, &[], Invocation::Direct).unwrap();
        executor.wait_for_finish().unwrap();

        // The engine appends; clearing between runs is the caller's call.
        assert_eq!(executor.log().contents(), "run\nrun\n");
    }
}
