//! The live output surface shared by single runs and chain runs.
//!
//! [`OutputLog`] is the append-only text value observers render, together
//! with the running flag and the last exit code. Clones share state, so the
//! engine, the orchestrator, and any number of observers can hold the same
//! log. All appends funnel through a single writer context (the engine's
//! pump thread, or the orchestrator's coordinating thread between steps),
//! so observers never see interleaved partial writes.
//!
//! [`EventBus`] replaces implicit property observation with discrete
//! state-transition events: subscribers get their own channel and receive
//! every event emitted after they subscribed.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::chains::ChainStepStatus;
use crate::executor::ExecutionOutcome;

/// Discrete state transitions published by the engine and the orchestrator.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A process was spawned.
    Started { pid: u32 },
    /// Text was appended to the output log. The chunk is exactly what was
    /// appended, stderr marker included.
    OutputAppended { chunk: String },
    /// The execution resolved to an outcome.
    Finished { outcome: ExecutionOutcome },
    /// A chain step began executing.
    StepStarted {
        index: usize,
        step_id: Uuid,
        name: String,
    },
    /// A chain step reached a terminal status.
    StepFinished {
        index: usize,
        step_id: Uuid,
        status: ChainStepStatus,
    },
    /// The whole chain finished or was stopped; `success` reflects whether
    /// every step's outcome was successful.
    ChainFinished { success: bool, stopped: bool },
}

#[derive(Debug, Default)]
struct LogState {
    text: String,
    running: bool,
    exit_code: Option<i32>,
}

/// Append-only text log plus running flag and last exit code.
#[derive(Debug, Clone, Default)]
pub struct OutputLog {
    inner: Arc<Mutex<LogState>>,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, chunk: &str) {
        self.inner.lock().text.push_str(chunk);
    }

    /// Reset for a new run: text cleared, exit code cleared.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.text.clear();
        state.exit_code = None;
    }

    pub fn contents(&self) -> String {
        self.inner.lock().text.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    pub fn set_running(&self, running: bool) {
        self.inner.lock().running = running;
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.inner.lock().exit_code
    }

    pub fn set_exit_code(&self, code: Option<i32>) {
        self.inner.lock().exit_code = code;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().text.is_empty()
    }
}

/// Fan-out of [`RunEvent`]s to any number of subscribers.
///
/// Subscribers that drop their receiver are pruned on the next emit.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<RunEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<RunEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: RunEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_append_accumulates() {
        let log = OutputLog::new();
        log.append("hello ");
        log.append("world");
        assert_eq!(log.contents(), "hello world");
        assert_eq!(log.len(), 11);
    }

    #[test]
    fn test_log_clones_share_state() {
        let log = OutputLog::new();
        let view = log.clone();
        log.append("shared");
        log.set_running(true);
        log.set_exit_code(Some(0));

        assert_eq!(view.contents(), "shared");
        assert!(view.is_running());
        assert_eq!(view.exit_code(), Some(0));
    }

    #[test]
    fn test_log_clear_resets_text_and_exit_code_but_not_running() {
        let log = OutputLog::new();
        log.append("old run");
        log.set_exit_code(Some(2));
        log.set_running(true);

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.exit_code(), None);
        assert!(log.is_running());
    }

    #[test]
    fn test_bus_delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.emit(RunEvent::Started { pid: 42 });

        for rx in [rx1, rx2] {
            match rx.try_recv().unwrap() {
                RunEvent::Started { pid } => assert_eq!(pid, 42),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_bus_prunes_dropped_subscribers() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(RunEvent::OutputAppended {
            chunk: "x".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_bus_preserves_event_order_per_subscriber() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        for i in 0..5 {
            bus.emit(RunEvent::OutputAppended {
                chunk: format!("chunk {}", i),
            });
        }

        let chunks: Vec<String> = rx
            .try_iter()
            .map(|e| match e {
                RunEvent::OutputAppended { chunk } => chunk,
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!(chunks, vec!["chunk 0", "chunk 1", "chunk 2", "chunk 3", "chunk 4"]);
    }
}
