//! Single-invocation step execution and the model call shared with loop steps.

use serde_json::Value;
use tracing::{debug, warn};

use super::{ModelReply, ModelRequest, ResponseTool, WorkflowRunner, expect_object, step_report};
use crate::error::{EngineError, Result};
use crate::model::{Output, Step};
use aispec_types::StepReport;

impl WorkflowRunner {
    /// Renders the prompt against the context, calls the model once, and merges the result.
    pub(super) async fn run_single_step(&mut self, step_index: usize, step: &Step) -> Result<StepReport> {
        if let Some(push) = step.output().and_then(Output::push) {
            warn!(step_id = %step.id(), push, "push applies to loop steps only; merging result instead");
        }

        let prompt = step.prompt().interpolate(self.context.values())?;
        let result = self.invoke_model(step, &prompt, None).await?;
        self.context.merge(expect_object(step, result.clone())?);

        Ok(step_report(step_index, step, vec![prompt], vec![result], false))
    }

    /// Calls the model with the step's response tool and returns the validated arguments.
    pub(super) async fn invoke_model(&mut self, step: &Step, prompt: &str, iteration: Option<usize>) -> Result<Value> {
        let output = step.output().ok_or_else(|| EngineError::MissingOutputSchema {
            step_id: step.id().to_string(),
        })?;
        let tool = ResponseTool::for_output(step.id(), output)?;
        let model = self.effective_model(step);

        debug!(
            step_id = %step.id(),
            iteration,
            tool = %tool.name(),
            prompt = %prompt,
            model = model.as_ref().map(|model| model.name_or_default()).unwrap_or_default(),
            "invoking model"
        );
        let request = ModelRequest {
            system_prompt: &self.system_prompt,
            prompt,
            tools: std::slice::from_ref(&tool),
            model: model.as_ref(),
        };
        let reply = self
            .model_service
            .invoke(request)
            .await
            .map_err(|source| EngineError::ModelInvocation {
                step_id: step.id().to_string(),
                source,
            })?;

        let result = match reply {
            ModelReply::ToolCall { name, arguments } if name == tool.name() => tool.execute(step.id(), arguments)?,
            ModelReply::ToolCall { name, .. } => {
                warn!(step_id = %step.id(), called = %name, expected = %tool.name(), "model called an unknown tool");
                return Err(EngineError::ResponseToolNotCalled {
                    step_id: step.id().to_string(),
                    tool: tool.name().to_string(),
                });
            }
            ModelReply::Text(text) => match serde_json::from_str::<Value>(text.trim()) {
                Ok(arguments @ Value::Object(_)) => {
                    warn!(step_id = %step.id(), "model answered in text; treating JSON object reply as tool arguments");
                    tool.execute(step.id(), arguments)?
                }
                _ => {
                    return Err(EngineError::ResponseToolNotCalled {
                        step_id: step.id().to_string(),
                        tool: tool.name().to_string(),
                    });
                }
            },
        };

        self.record(step, iteration, prompt, &result, model);
        Ok(result)
    }
}
