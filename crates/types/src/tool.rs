//! Interface for integration tools consumed by a host's tool-dispatch layer.
//!
//! Tools are request/response wrappers (filesystem, git, issue trackers, ...).
//! The workflow runner never calls them; hosts that expose tools to a model
//! describe them with [`ToolDefinition`] and check incoming arguments with
//! [`validate_tool_parameters`] before calling [`Tool::handle`].

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

/// Primitive type accepted by a tool parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ToolParameterType {
    fn accepts(self, value: &JsonValue) -> bool {
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Object => value.is_object(),
            ToolParameterType::Array => value.is_array(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Object => "object",
            ToolParameterType::Array => "array",
        }
    }
}

/// A single named parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: ToolParameterType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Static description of a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
    /// Free-form description of the handler's return value.
    #[serde(default)]
    pub return_type: Option<String>,
}

/// An integration tool that a host can dispatch to.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's static definition.
    fn definition(&self) -> &ToolDefinition;

    /// Handles a call whose parameters already passed [`validate_tool_parameters`].
    async fn handle(&self, parameters: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue>;
}

/// Errors produced when call arguments do not match a tool definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolParameterError {
    #[error("tool '{tool}' is missing required parameter '{parameter}'")]
    Missing { tool: String, parameter: String },

    #[error("tool '{tool}' parameter '{parameter}' must be of type {expected}")]
    WrongType {
        tool: String,
        parameter: String,
        expected: &'static str,
    },

    #[error("tool '{tool}' does not accept parameter '{parameter}'")]
    Unknown { tool: String, parameter: String },
}

/// Checks that `parameters` satisfies the required/type constraints of `definition`.
///
/// `null` is treated like an absent value for optional parameters.
pub fn validate_tool_parameters(definition: &ToolDefinition, parameters: &JsonMap<String, JsonValue>) -> Result<(), ToolParameterError> {
    for name in parameters.keys() {
        if !definition.parameters.iter().any(|parameter| &parameter.name == name) {
            return Err(ToolParameterError::Unknown {
                tool: definition.id.clone(),
                parameter: name.clone(),
            });
        }
    }

    for parameter in &definition.parameters {
        match parameters.get(&parameter.name) {
            None | Some(JsonValue::Null) => {
                if parameter.required {
                    return Err(ToolParameterError::Missing {
                        tool: definition.id.clone(),
                        parameter: parameter.name.clone(),
                    });
                }
            }
            Some(value) if !parameter.r#type.accepts(value) => {
                return Err(ToolParameterError::WrongType {
                    tool: definition.id.clone(),
                    parameter: parameter.name.clone(),
                    expected: parameter.r#type.as_str(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_file_definition() -> ToolDefinition {
        serde_json::from_value(json!({
            "id": "read_file",
            "name": "Read file",
            "description": "Reads a UTF-8 file from disk",
            "parameters": [
                {"name": "path", "type": "string", "required": true},
                {"name": "max_bytes", "type": "integer"}
            ],
            "returnType": "string"
        }))
        .expect("definition")
    }

    struct EchoTool {
        definition: ToolDefinition,
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn handle(&self, parameters: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
            Ok(JsonValue::Object(parameters.clone()))
        }
    }

    #[test]
    fn accepts_matching_parameters() {
        let definition = read_file_definition();
        let parameters = json!({"path": "/tmp/a.txt", "max_bytes": 10});
        assert!(validate_tool_parameters(&definition, parameters.as_object().expect("object")).is_ok());
    }

    #[test]
    fn rejects_missing_required_parameter() {
        let definition = read_file_definition();
        let parameters = json!({"max_bytes": 10});
        let error = validate_tool_parameters(&definition, parameters.as_object().expect("object")).expect_err("missing path");
        assert_eq!(
            error,
            ToolParameterError::Missing {
                tool: "read_file".into(),
                parameter: "path".into()
            }
        );
    }

    #[test]
    fn rejects_wrong_type_and_unknown_parameters() {
        let definition = read_file_definition();
        let wrong_type = json!({"path": "/tmp/a.txt", "max_bytes": 1.5});
        let error = validate_tool_parameters(&definition, wrong_type.as_object().expect("object")).expect_err("float");
        assert!(error.to_string().contains("must be of type integer"));

        let unknown = json!({"path": "/tmp/a.txt", "mode": "r"});
        let error = validate_tool_parameters(&definition, unknown.as_object().expect("object")).expect_err("unknown");
        assert!(matches!(error, ToolParameterError::Unknown { .. }));
    }

    #[tokio::test]
    async fn tools_are_usable_as_trait_objects() {
        let tool: Box<dyn Tool> = Box::new(EchoTool {
            definition: read_file_definition(),
        });
        let parameters = json!({"path": "notes.md"});
        let output = tool.handle(parameters.as_object().expect("object")).await.expect("handle");
        assert_eq!(output["path"], "notes.md");
        assert_eq!(tool.definition().return_type.as_deref(), Some("string"));
    }
}
