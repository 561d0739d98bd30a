//! Runtime workflow values shared between the engine and its hosts.
//!
//! The runner advances one step per call and reports what happened through
//! [`Advance`] values and, for hosts that prefer to observe, [`RunnerEvent`]s.
//! Every model invocation is recorded as a [`HistoryEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::ModelConfig;

/// Outcome of a single executed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    /// Identifier of the step that ran.
    pub step_id: String,
    /// Zero-based position of the step within its workflow.
    pub index: usize,
    /// Rendered prompts in invocation order (one per loop iteration for loop steps).
    pub prompts: Vec<String>,
    /// Structured results returned through the response tool, aligned with `prompts`.
    pub results: Vec<JsonValue>,
    /// True when the step iterated a context array.
    #[serde(default)]
    pub looped: bool,
}

impl StepReport {
    /// Returns the single prompt/result pair of a non-loop step.
    pub fn single(&self) -> Option<(&str, &JsonValue)> {
        match (self.prompts.as_slice(), self.results.as_slice()) {
            ([prompt], [result]) if !self.looped => Some((prompt.as_str(), result)),
            _ => None,
        }
    }
}

/// Value returned each time the host asks the runner to make progress.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// A step ran to completion.
    Step(StepReport),
    /// No steps remain; the workflow is finished.
    Finished,
}

impl Advance {
    /// Returns true once the workflow has finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, Advance::Finished)
    }
}

/// Notifications emitted while a workflow runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// A step completed and its results were folded into the context.
    StepFinished {
        step_id: String,
        prompts: Vec<String>,
        results: Vec<JsonValue>,
    },
    /// The final step has completed; no further steps will run.
    WorkflowFinished { workflow_id: String, at: DateTime<Utc> },
}

/// Lifecycle state of a workflow runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunnerState {
    /// `start` has not been called.
    #[default]
    NotStarted,
    /// The step at `step_index` completed; the next call advances past it.
    Running { step_index: usize },
    /// The step at `step_index` is executing (a model call is outstanding).
    InFlight { step_index: usize },
    /// Every step has run.
    Finished,
    /// The step at `step_index` failed; the runner accepts no further calls.
    Failed { step_index: usize, message: String },
}

/// One model invocation, recorded for observability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Step that issued the invocation.
    pub step_id: String,
    /// Loop iteration index, when the step iterates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
    /// Rendered user prompt.
    pub prompt: String,
    /// Arguments the model supplied to the response tool.
    pub response: JsonValue,
    /// Serialized assistant sent as the system prompt.
    pub assistant_config: String,
    /// Effective model for the invocation.
    #[serde(default)]
    pub model: Option<ModelConfig>,
    /// Wall-clock time the response was folded into the context.
    pub recorded_at: DateTime<Utc>,
}
