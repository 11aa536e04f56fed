//! Sequential chain orchestration.
//!
//! Drives a [`ScriptChain`]'s steps one at a time on a dedicated
//! coordinating thread, delegating each execution to the engine and
//! advancing only from the engine's termination notification. Per-step
//! status lives here, keyed by step id, never inside the chain itself; the
//! chain is taken by value and never mutated.
//!
//! The orchestrator keeps its own transcript, distinct from any single-run
//! log: chain-start, step-boundary, and chain-end banners frame each step's
//! output, so the whole run is reconstructable from the buffer alone.
//! Because a step's banner is only appended after the previous step's
//! `Finished` event (which the engine emits after draining its readers),
//! step output never bleeds past its boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::arguments;
use crate::chains::{ChainStepStatus, ScriptChain};
use crate::error::{Result, RunnerError};
use crate::executor::{ExecutionOutcome, Invocation, ScriptExecutor, LAUNCH_FAILURE_CODE};
use crate::output::{EventBus, OutputLog, RunEvent};
use crate::scripts::ScriptCatalog;

/// Orchestrates one chain run at a time.
///
/// State machine per run:
/// `Idle -> Running(step) -> { Running(step + 1) | Stopped }* -> Idle`
pub struct ChainRunner {
    log: OutputLog,
    events: EventBus,
    executor: Arc<ScriptExecutor>,
    statuses: Arc<Mutex<HashMap<Uuid, ChainStepStatus>>>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    overall_success: Arc<AtomicBool>,
    current_step: Arc<AtomicUsize>,
    invocation: Invocation,
}

impl Default for ChainRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainRunner {
    pub fn new() -> Self {
        Self::with_invocation(Invocation::default())
    }

    /// A runner whose steps use the given invocation mode (argv-direct by
    /// default; shell-string is the legacy opt-in).
    pub fn with_invocation(invocation: Invocation) -> Self {
        let log = OutputLog::new();
        let events = EventBus::new();
        let executor = Arc::new(ScriptExecutor::with_log(log.clone(), events.clone()));
        ChainRunner {
            log,
            events,
            executor,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            overall_success: Arc::new(AtomicBool::new(true)),
            current_step: Arc::new(AtomicUsize::new(0)),
            invocation,
        }
    }

    pub fn log(&self) -> &OutputLog {
        &self.log
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True when every finished step's outcome was successful so far.
    pub fn overall_success(&self) -> bool {
        self.overall_success.load(Ordering::SeqCst)
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step.load(Ordering::SeqCst)
    }

    pub fn status_of(&self, step_id: Uuid) -> Option<ChainStepStatus> {
        self.statuses.lock().get(&step_id).cloned()
    }

    pub fn statuses(&self) -> HashMap<Uuid, ChainStepStatus> {
        self.statuses.lock().clone()
    }

    /// Begin a chain run. Rejected without touching any state while a run
    /// is in flight.
    ///
    /// Resets every step to `Pending`, overall-success to true, clears the
    /// transcript, and drives steps from a coordinating thread. Progress is
    /// observable through [`Self::events`] and the status accessors.
    #[instrument(skip_all, fields(chain = %chain.name, steps = chain.steps.len()))]
    pub fn run(&self, chain: ScriptChain, catalog: ScriptCatalog) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Chain already running, rejecting run");
            return Err(RunnerError::AlreadyRunning);
        }

        info!(chain = %chain.name, "Chain run starting");
        self.stop_requested.store(false, Ordering::SeqCst);
        self.overall_success.store(true, Ordering::SeqCst);
        self.current_step.store(0, Ordering::SeqCst);
        {
            let mut statuses = self.statuses.lock();
            statuses.clear();
            for step in &chain.steps {
                statuses.insert(step.id, ChainStepStatus::Pending);
            }
        }
        self.log.clear();

        let driver = Driver {
            log: self.log.clone(),
            events: self.events.clone(),
            executor: Arc::clone(&self.executor),
            statuses: Arc::clone(&self.statuses),
            running: Arc::clone(&self.running),
            stop_requested: Arc::clone(&self.stop_requested),
            overall_success: Arc::clone(&self.overall_success),
            current_step: Arc::clone(&self.current_step),
            invocation: self.invocation,
        };
        thread::spawn(move || driver.drive(chain, catalog));

        Ok(())
    }

    /// Request a cooperative stop: the flag is checked before each step,
    /// and the currently running process is asked to terminate. Steps
    /// already finished keep their statuses; steps not reached stay
    /// `Pending`.
    pub fn stop(&self) {
        if !self.is_running() {
            debug!("Stop with no active chain run is a no-op");
            return;
        }
        info!("Chain stop requested");
        self.stop_requested.store(true, Ordering::SeqCst);
        self.executor.cancel();
    }

    /// Block until the current run (if any) reaches Idle. Convenience for
    /// tests and the CLI.
    pub fn wait_for_finish(&self) {
        let rx = self.events.subscribe();
        if !self.is_running() {
            return;
        }
        for event in rx {
            if matches!(event, RunEvent::ChainFinished { .. }) {
                break;
            }
        }
    }
}

/// Everything the coordinating thread owns for one run.
struct Driver {
    log: OutputLog,
    events: EventBus,
    executor: Arc<ScriptExecutor>,
    statuses: Arc<Mutex<HashMap<Uuid, ChainStepStatus>>>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    overall_success: Arc<AtomicBool>,
    current_step: Arc<AtomicUsize>,
    invocation: Invocation,
}

impl Driver {
    /// Append transcript text and publish it, so event observers see the
    /// same stream the log accumulates.
    fn append(&self, text: String) {
        self.log.append(&text);
        self.events.emit(RunEvent::OutputAppended { chunk: text });
    }

    fn drive(self, chain: ScriptChain, catalog: ScriptCatalog) {
        self.append(format!(
            "=== Starting Chain: {} ===\nTotal steps: {}\n\n",
            chain.name,
            chain.steps.len()
        ));

        for (index, step) in chain.steps.iter().enumerate() {
            if self.stop_requested.load(Ordering::SeqCst) {
                self.finalize_stopped();
                return;
            }

            self.current_step.store(index, Ordering::SeqCst);
            self.set_status(step.id, ChainStepStatus::Running);
            self.append(format!("--- Step {}: {} ---\n", index + 1, step.script_name));
            self.events.emit(RunEvent::StepStarted {
                index,
                step_id: step.id,
                name: step.script_name.clone(),
            });

            let Some(script) = catalog.find_by_path(&step.script_path) else {
                warn!(path = %step.script_path, "Chain step script not found in catalog");
                let status = ChainStepStatus::Failed {
                    reason: "Script not found".to_string(),
                };
                self.set_status(step.id, status.clone());
                self.append(format!(
                    "ERROR: Script not found at {}\n\n",
                    step.script_path
                ));
                self.overall_success.store(false, Ordering::SeqCst);
                self.events.emit(RunEvent::StepFinished {
                    index,
                    step_id: step.id,
                    status,
                });
                if step.continue_on_error {
                    continue;
                }
                self.finalize_errored();
                return;
            };

            let step_arguments = arguments::apply_step_overrides(script, step);

            // Subscribe before starting so a synchronous launch failure
            // cannot slip past us.
            let rx = self.events.subscribe();
            if let Err(e) = self.executor.start(script, &step_arguments, self.invocation) {
                // Single driver, single engine: this does not happen in
                // practice, but resolve the step rather than wedge the chain.
                warn!(error = %e, "Engine rejected step start");
                let status = ChainStepStatus::Failed {
                    reason: e.to_string(),
                };
                self.set_status(step.id, status.clone());
                self.overall_success.store(false, Ordering::SeqCst);
                self.events.emit(RunEvent::StepFinished {
                    index,
                    step_id: step.id,
                    status,
                });
                if step.continue_on_error {
                    continue;
                }
                self.finalize_errored();
                return;
            }

            // Advance only from the termination notification; by the time
            // Finished arrives the engine has drained both streams into the
            // transcript.
            let outcome = rx
                .into_iter()
                .find_map(|event| match event {
                    RunEvent::Finished { outcome } => Some(outcome),
                    _ => None,
                })
                .unwrap_or(ExecutionOutcome::Exited(LAUNCH_FAILURE_CODE));

            let unsuccessful = match outcome {
                ExecutionOutcome::Exited(code) => {
                    // Non-zero completion is recorded as completed, not
                    // failed; failed is reserved for structural problems.
                    let status = ChainStepStatus::Completed { exit_code: code };
                    self.set_status(step.id, status.clone());
                    self.append(format!("Step completed with exit code: {}\n\n", code));
                    if code != 0 {
                        self.overall_success.store(false, Ordering::SeqCst);
                    }
                    self.events.emit(RunEvent::StepFinished {
                        index,
                        step_id: step.id,
                        status,
                    });
                    code != 0
                }
                ExecutionOutcome::LaunchFailed(_) => {
                    let status = ChainStepStatus::Failed {
                        reason: format!("Exit code: {}", LAUNCH_FAILURE_CODE),
                    };
                    self.set_status(step.id, status.clone());
                    self.append(format!(
                        "Step failed with exit code: {}\n\n",
                        LAUNCH_FAILURE_CODE
                    ));
                    self.overall_success.store(false, Ordering::SeqCst);
                    self.events.emit(RunEvent::StepFinished {
                        index,
                        step_id: step.id,
                        status,
                    });
                    true
                }
            };

            if unsuccessful && !step.continue_on_error {
                self.finalize_errored();
                return;
            }
        }

        self.finalize_completed();
    }

    fn set_status(&self, step_id: Uuid, status: ChainStepStatus) {
        self.statuses.lock().insert(step_id, status);
    }

    fn finalize_completed(&self) {
        let success = self.overall_success.load(Ordering::SeqCst);
        self.append(format!(
            "\n=== Chain Completed ===\n{}",
            if success {
                "All steps succeeded!\n"
            } else {
                "Some steps failed.\n"
            }
        ));
        info!(success = success, "Chain run completed");
        self.running.store(false, Ordering::SeqCst);
        self.events.emit(RunEvent::ChainFinished {
            success,
            stopped: false,
        });
    }

    fn finalize_errored(&self) {
        self.append("=== Chain Stopped Due to Error ===\n".to_string());
        info!("Chain stopped due to step error");
        self.running.store(false, Ordering::SeqCst);
        self.events.emit(RunEvent::ChainFinished {
            success: false,
            stopped: false,
        });
    }

    fn finalize_stopped(&self) {
        let success = self.overall_success.load(Ordering::SeqCst);
        self.append("\n=== Chain Stopped by User ===\n".to_string());
        info!("Chain stopped by user");
        self.running.store(false, Ordering::SeqCst);
        self.events.emit(RunEvent::ChainFinished {
            success,
            stopped: true,
        });
    }
}
