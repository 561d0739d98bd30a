//! Error type shared by every engine operation.
//!
//! The engine never recovers locally: each failure is returned to the caller
//! that triggered it (`load`, `find_workflow`, `start`, `submit_step`).

use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed document ({location}): {reason}")]
    MalformedDocument { location: String, reason: String },

    #[error("failed to read document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow with id '{id}' not found")]
    WorkflowNotFound { id: String },

    #[error("step '{step_id}' declares no output schema to bind the model response to")]
    MissingOutputSchema { step_id: String },

    #[error("model invocation failed for step '{step_id}': {source}")]
    ModelInvocation {
        step_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("template variable '{variable}' is not present in the context")]
    MissingVariable { variable: String },

    #[error("step '{step_id}' loops over context key '{key}', which is {found} instead of an array")]
    InvalidLoopSource {
        step_id: String,
        key: String,
        found: &'static str,
    },

    #[error("model did not call response tool '{tool}' for step '{step_id}'")]
    ResponseToolNotCalled { step_id: String, tool: String },

    #[error("response for step '{step_id}' does not match its output schema: {}", .errors.join("; "))]
    SchemaViolation { step_id: String, errors: Vec<String> },

    #[error("workflow runner has not been started")]
    NotStarted,

    #[error("workflow runner has already been started")]
    AlreadyStarted,

    #[error("step {step_index} is still in flight")]
    StepInFlight { step_index: usize },

    #[error("workflow runner stopped after step {step_index} failed: {message}")]
    RunnerFailed { step_index: usize, message: String },
}

impl EngineError {
    pub(crate) fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::MalformedDocument {
            location: location.into(),
            reason: reason.into(),
        }
    }
}
