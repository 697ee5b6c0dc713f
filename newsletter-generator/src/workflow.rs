use crate::config::RunOverrides;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Where an interactive session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    InterestsEntered,
    Configured,
    Generating,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::InterestsEntered => "interests_entered",
            WorkflowState::Configured => "configured",
            WorkflowState::Generating => "generating",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    EnterInterests(Vec<String>),
    Configure(RunOverrides),
    StartGeneration,
    GenerationSucceeded { run_id: Uuid },
    GenerationFailed { run_id: Uuid, reason: String },
    Cancel,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::EnterInterests(_) => "enter_interests",
            Trigger::Configure(_) => "configure",
            Trigger::StartGeneration => "start_generation",
            Trigger::GenerationSucceeded { .. } => "generation_succeeded",
            Trigger::GenerationFailed { .. } => "generation_failed",
            Trigger::Cancel => "cancel",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("cannot {trigger} while {state}")]
    InvalidTransition { state: WorkflowState, trigger: &'static str },

    #[error("result for run {run_id} does not belong to the current run")]
    StaleRun { run_id: Uuid },
}

/// Explicit state machine behind the web GUI's multi-step form.
///
/// A rejected trigger returns an error and leaves the workflow untouched.
#[derive(Debug, Clone)]
pub struct Workflow {
    state: WorkflowState,
    interests: Vec<String>,
    overrides: RunOverrides,
    current_run: Option<Uuid>,
    failure: Option<String>,
}

impl Workflow {
    pub fn new(interests: Vec<String>) -> Self {
        Self {
            state: WorkflowState::InterestsEntered,
            interests,
            overrides: RunOverrides::default(),
            current_run: None,
            failure: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn interests(&self) -> &[String] {
        &self.interests
    }

    pub fn overrides(&self) -> &RunOverrides {
        &self.overrides
    }

    /// Id of the run started by the last `StartGeneration`.
    pub fn current_run(&self) -> Option<Uuid> {
        self.current_run
    }

    /// Reason of the last failure, while in `Failed`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn apply(&mut self, trigger: Trigger) -> Result<WorkflowState, WorkflowError> {
        use WorkflowState::*;

        let invalid = |state: WorkflowState, trigger: &Trigger| WorkflowError::InvalidTransition {
            state,
            trigger: trigger.name(),
        };

        let next = match (self.state, &trigger) {
            (Generating, Trigger::GenerationSucceeded { run_id })
            | (Generating, Trigger::GenerationFailed { run_id, .. }) => {
                if self.current_run != Some(*run_id) {
                    return Err(WorkflowError::StaleRun { run_id: *run_id });
                }
                if matches!(trigger, Trigger::GenerationSucceeded { .. }) {
                    Completed
                } else {
                    Failed
                }
            }
            (Generating, Trigger::Cancel) => Failed,
            (Generating, _) => return Err(invalid(self.state, &trigger)),

            (_, Trigger::EnterInterests(_)) => InterestsEntered,
            (_, Trigger::Configure(_)) => Configured,
            (Configured | Completed | Failed, Trigger::StartGeneration) => Generating,
            (state, trigger) => return Err(invalid(state, trigger)),
        };

        debug!("Workflow {} --{}--> {}", self.state, trigger.name(), next);
        match trigger {
            Trigger::EnterInterests(interests) => self.interests = interests,
            Trigger::Configure(overrides) => self.overrides = overrides,
            Trigger::StartGeneration => self.current_run = Some(Uuid::new_v4()),
            Trigger::GenerationSucceeded { .. } => {}
            Trigger::GenerationFailed { reason, .. } => self.failure = Some(reason),
            Trigger::Cancel => self.failure = Some("cancelled".to_string()),
        }
        if next != Failed {
            self.failure = None;
        }
        self.state = next;
        Ok(next)
    }
}
