//! Loop step execution.
//!
//! A loop step runs once per item of a context array. Each iteration sees the
//! item under the step's binding name. Results are appended to the `push`
//! array when the output declares one, otherwise merged like a plain step.
//! Iterations already completed keep their context updates if a later one fails.

use serde_json::Value;
use tracing::info;

use super::{WorkflowRunner, expect_object, step_report};
use crate::error::{EngineError, Result};
use crate::hydrate::describe_value;
use crate::model::{LoopDirective, Output, Step};
use aispec_types::StepReport;

impl WorkflowRunner {
    pub(super) async fn run_loop_step(&mut self, step_index: usize, step: &Step, directive: &LoopDirective) -> Result<StepReport> {
        let items = match self.context.get(&directive.source) {
            Some(Value::Array(items)) => items.clone(),
            other => {
                return Err(EngineError::InvalidLoopSource {
                    step_id: step.id().to_string(),
                    key: directive.source.clone(),
                    found: describe_value(other),
                });
            }
        };
        let push_key = step.output().and_then(Output::push).map(str::to_string);
        if let Some(key) = &push_key {
            self.context.ensure_array(key);
        }

        info!(
            step_id = %step.id(),
            source = %directive.source,
            binding = %directive.binding,
            items = items.len(),
            "loop step started"
        );

        let mut prompts = Vec::with_capacity(items.len());
        let mut results = Vec::with_capacity(items.len());
        for (iteration, item) in items.into_iter().enumerate() {
            let scope = self.context.with_binding(&directive.binding, item);
            let prompt = step.prompt().interpolate(&scope)?;
            let result = self.invoke_model(step, &prompt, Some(iteration)).await?;

            match &push_key {
                Some(key) => self.context.push(key, result.clone()),
                None => self.context.merge(expect_object(step, result.clone())?),
            }
            prompts.push(prompt);
            results.push(result);
        }

        Ok(step_report(step_index, step, prompts, results, true))
    }
}
