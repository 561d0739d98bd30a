//! The per-step response tool.
//!
//! Each model call offers exactly one tool whose parameter schema is the
//! step's output schema. The model's arguments to that tool are the step's
//! structured result.

use serde_json::{Value, json};

use crate::error::{EngineError, Result};
use crate::model::Output;

/// Tool name used when the output has no usable name.
pub const DEFAULT_RESPONSE_TOOL_NAME: &str = "respond";

pub struct ResponseTool {
    name: String,
    description: String,
    parameters: Value,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for ResponseTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl ResponseTool {
    /// Builds the response tool for a step's output contract.
    pub fn for_output(step_id: &str, output: &Output) -> Result<Self> {
        let parameters = output.schema().cloned().ok_or_else(|| EngineError::MissingOutputSchema {
            step_id: step_id.to_string(),
        })?;
        let validator = jsonschema::validator_for(&parameters)
            .map_err(|error| EngineError::malformed(format!("step '{step_id}' output schema"), error.to_string()))?;

        let name = output
            .name()
            .map(sanitize_tool_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_RESPONSE_TOOL_NAME.to_string());
        let description = output
            .description()
            .or(output.name())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Submit the structured result of step '{step_id}'"));

        Ok(Self {
            name,
            description,
            parameters,
            validator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON Schema of the tool arguments.
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Function-tool descriptor in the shape chat-completion backends expect.
    pub fn definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }

    /// Validates the model's arguments against the schema and returns them unchanged.
    pub fn execute(&self, step_id: &str, arguments: Value) -> Result<Value> {
        let errors: Vec<String> = self.validator.iter_errors(&arguments).map(|error| error.to_string()).collect();
        if !errors.is_empty() {
            return Err(EngineError::SchemaViolation {
                step_id: step_id.to_string(),
                errors,
            });
        }
        Ok(arguments)
    }
}

fn sanitize_tool_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|character| if character.is_ascii_alphanumeric() || character == '_' || character == '-' { character } else { '_' })
        .collect()
}
