//! Workflow execution: a step-at-a-time state machine over one workflow.
//!
//! - `runner::ModelService` abstracts how a model is called
//! - `response_tool::ResponseTool` turns a step's output schema into the single tool offered to the model
//! - `step_once` runs a plain step; `repeat` runs a loop step once per context array item
//!
//! The host drives progress explicitly: [`WorkflowRunner::start`] runs the first
//! step, and each [`WorkflowRunner::submit_step`] runs the next one. Once the last
//! step has run, the following call reports [`Advance::Finished`].

use std::sync::Arc;

use aispec_types::{Advance, HistoryEntry, ModelConfig, RunnerEvent, RunnerState, StepReport};
use chrono::Utc;
use serde_json::{Map as JsonMap, Value};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::model::{Assistant, Entity, Step, Workflow};
use crate::resolve::RunContext;

mod repeat;
pub mod response_tool;
pub mod runner;
mod step_once;

pub use response_tool::ResponseTool;
pub use runner::{ModelReply, ModelRequest, ModelService, ScriptedModelService};

/// Drives one workflow against a model service.
pub struct WorkflowRunner {
    assistant: Arc<Assistant>,
    workflow: Arc<Workflow>,
    model_service: Arc<dyn ModelService>,
    system_prompt: String,
    context: RunContext,
    history: Vec<HistoryEntry>,
    state: RunnerState,
    event_tx: Option<UnboundedSender<RunnerEvent>>,
}

impl std::fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("workflow", &self.workflow.id())
            .field("state", &self.state)
            .field("context", &self.context)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowRunner {
    /// Creates a runner. `assistant` is serialized once and sent as the system prompt of every call.
    pub fn new(assistant: Arc<Assistant>, workflow: Arc<Workflow>, model_service: Arc<dyn ModelService>) -> Result<Self> {
        let system_prompt = assistant.to_document_string()?;
        Ok(Self {
            assistant,
            workflow,
            model_service,
            system_prompt,
            context: RunContext::default(),
            history: Vec::new(),
            state: RunnerState::NotStarted,
            event_tx: None,
        })
    }

    /// Returns a receiver for step and completion events.
    ///
    /// Only one subscriber is kept; subscribing again replaces the previous one.
    pub fn subscribe(&mut self) -> UnboundedReceiver<RunnerEvent> {
        let (event_tx, event_rx) = unbounded_channel();
        self.event_tx = Some(event_tx);
        event_rx
    }

    pub fn assistant(&self) -> &Arc<Assistant> {
        &self.assistant
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Every model invocation so far, in order.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunnerState::Finished)
    }

    /// True while a `submit_step` call would make progress.
    pub fn has_next(&self) -> bool {
        matches!(self.state, RunnerState::Running { .. })
    }

    /// Seeds the context with `initial` and runs the first step.
    pub async fn start(&mut self, initial: JsonMap<String, Value>) -> Result<Advance> {
        if self.state != RunnerState::NotStarted {
            return Err(EngineError::AlreadyStarted);
        }
        self.context.merge(initial);
        info!(
            workflow_id = %self.workflow.id(),
            steps = self.workflow.steps().len(),
            "workflow run started"
        );
        self.advance_to(0).await
    }

    /// Runs the next step, or reports completion once every step has run.
    pub async fn submit_step(&mut self) -> Result<Advance> {
        let next_index = match &self.state {
            RunnerState::NotStarted => return Err(EngineError::NotStarted),
            RunnerState::Running { step_index } => step_index + 1,
            RunnerState::InFlight { step_index } => return Err(EngineError::StepInFlight { step_index: *step_index }),
            RunnerState::Finished => return Ok(Advance::Finished),
            RunnerState::Failed { step_index, message } => {
                return Err(EngineError::RunnerFailed {
                    step_index: *step_index,
                    message: message.clone(),
                });
            }
        };
        self.advance_to(next_index).await
    }

    /// Starts the workflow and submits steps until it finishes.
    pub async fn run_to_completion(&mut self, initial: JsonMap<String, Value>) -> Result<&RunContext> {
        let mut advance = self.start(initial).await?;
        while !advance.is_finished() {
            advance = self.submit_step().await?;
        }
        Ok(&self.context)
    }

    async fn advance_to(&mut self, step_index: usize) -> Result<Advance> {
        let workflow = Arc::clone(&self.workflow);
        let Some(step) = workflow.steps().get(step_index) else {
            self.finish();
            return Ok(Advance::Finished);
        };

        self.state = RunnerState::InFlight { step_index };
        let outcome = match step.loop_directive() {
            Some(directive) => self.run_loop_step(step_index, step, directive).await,
            None => self.run_single_step(step_index, step).await,
        };

        match outcome {
            Ok(report) => {
                self.state = RunnerState::Running { step_index };
                info!(step_id = %report.step_id, invocations = report.results.len(), "step finished");
                self.emit(RunnerEvent::StepFinished {
                    step_id: report.step_id.clone(),
                    prompts: report.prompts.clone(),
                    results: report.results.clone(),
                });
                Ok(Advance::Step(report))
            }
            Err(error) => {
                warn!(step_id = %step.id(), error = %error, "step failed");
                self.state = RunnerState::Failed {
                    step_index,
                    message: error.to_string(),
                };
                Err(error)
            }
        }
    }

    fn finish(&mut self) {
        if self.is_finished() {
            return;
        }
        self.state = RunnerState::Finished;
        info!(workflow_id = %self.workflow.id(), invocations = self.history.len(), "workflow run finished");
        self.emit(RunnerEvent::WorkflowFinished {
            workflow_id: self.workflow.id().to_string(),
            at: Utc::now(),
        });
    }

    fn emit(&self, event: RunnerEvent) {
        if let Some(event_tx) = &self.event_tx {
            let _ = event_tx.send(event);
        }
    }

    /// Model of the step, else of the workflow, else of the assistant.
    fn effective_model(&self, step: &Step) -> Option<ModelConfig> {
        step.model().or(self.workflow.model()).or(self.assistant.model()).cloned()
    }

    fn record(&mut self, step: &Step, iteration: Option<usize>, prompt: &str, response: &Value, model: Option<ModelConfig>) {
        self.history.push(HistoryEntry {
            step_id: step.id().to_string(),
            iteration,
            prompt: prompt.to_string(),
            response: response.clone(),
            assistant_config: self.system_prompt.clone(),
            model,
            recorded_at: Utc::now(),
        });
    }
}

fn step_report(step_index: usize, step: &Step, prompts: Vec<String>, results: Vec<Value>, looped: bool) -> StepReport {
    StepReport {
        step_id: step.id().to_string(),
        index: step_index,
        prompts,
        results,
        looped,
    }
}

/// Results that are merged into the context must be JSON objects.
fn expect_object(step: &Step, result: Value) -> Result<JsonMap<String, Value>> {
    match result {
        Value::Object(entries) => Ok(entries),
        _ => Err(EngineError::SchemaViolation {
            step_id: step.id().to_string(),
            errors: vec!["result must be a JSON object to merge into the context".to_string()],
        }),
    }
}
