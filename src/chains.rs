//! Chain models: ordered sequences of script invocations with per-step
//! argument overrides and error policy.
//!
//! A chain is snapshot configuration. Steps reference scripts by path and
//! carry their own enabled-set and value overrides; editing a step never
//! mutates the underlying script's argument definitions. Run-time status
//! lives outside the chain, keyed by step id, so the orchestrator can take
//! a chain by value and never write back into it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in a chain: a target script plus this step's argument
/// configuration and error policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptChainStep {
    pub id: Uuid,
    /// Resolved against the live catalog by exact path at run time.
    pub script_path: String,
    /// Cached for display; the catalog copy wins when the step runs.
    pub script_name: String,
    /// Argument id -> override value.
    #[serde(default)]
    pub arguments: HashMap<String, String>,
    /// Argument ids enabled for this step.
    #[serde(default)]
    pub enabled_flags: HashSet<String>,
    /// Permit the chain to advance past this step's failure.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl ScriptChainStep {
    pub fn new(script_path: &str, script_name: &str) -> Self {
        ScriptChainStep {
            id: Uuid::new_v4(),
            script_path: script_path.to_string(),
            script_name: script_name.to_string(),
            arguments: HashMap::new(),
            enabled_flags: HashSet::new(),
            continue_on_error: false,
        }
    }
}

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptChain {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<ScriptChainStep>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ScriptChain {
    pub fn new(name: &str) -> Self {
        ScriptChain {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            steps: Vec::new(),
            created_at: Utc::now(),
            last_run_at: None,
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Closed per-step run state, held externally to the chain and reset at the
/// start of every run.
///
/// `Completed` records any exit code, zero or not; `Failed` is reserved for
/// structural problems (script not found, process never launched).
/// `Skipped` exists for future policy branches and is not produced by the
/// current orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ChainStepStatus {
    Pending,
    Running,
    Completed { exit_code: i32 },
    Failed { reason: String },
    Skipped,
}

impl ChainStepStatus {
    /// Whether this status counts as a successful outcome for the
    /// overall-success flag.
    pub fn is_success(&self) -> bool {
        matches!(self, ChainStepStatus::Completed { exit_code: 0 })
    }

    /// Whether the step reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChainStepStatus::Pending | ChainStepStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success_classification() {
        assert!(ChainStepStatus::Completed { exit_code: 0 }.is_success());
        assert!(!ChainStepStatus::Completed { exit_code: 3 }.is_success());
        assert!(!ChainStepStatus::Failed {
            reason: "Script not found".to_string()
        }
        .is_success());
        assert!(!ChainStepStatus::Pending.is_success());
        assert!(!ChainStepStatus::Skipped.is_success());
    }

    #[test]
    fn test_status_terminal_classification() {
        assert!(!ChainStepStatus::Pending.is_terminal());
        assert!(!ChainStepStatus::Running.is_terminal());
        assert!(ChainStepStatus::Completed { exit_code: 1 }.is_terminal());
        assert!(ChainStepStatus::Failed {
            reason: "x".to_string()
        }
        .is_terminal());
        assert!(ChainStepStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_chain_serialization_round_trip() {
        let mut chain = ScriptChain::new("deploy");
        chain.description = "Build then deploy".to_string();
        let mut step = ScriptChainStep::new("/scripts/build.sh", "build.sh");
        step.continue_on_error = true;
        step.arguments
            .insert("some-arg-id".to_string(), "release".to_string());
        step.enabled_flags.insert("some-arg-id".to_string());
        chain.steps.push(step);

        let json = serde_json::to_string(&chain).unwrap();
        let parsed: ScriptChain = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, chain);
    }

    #[test]
    fn test_step_defaults() {
        let step = ScriptChainStep::new("/s/a.sh", "a.sh");
        assert!(!step.continue_on_error);
        assert!(step.arguments.is_empty());
        assert!(step.enabled_flags.is_empty());
    }
}
