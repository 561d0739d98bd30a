//! Shared data types for the AISpec assistant engine and its hosts.
//!
//! Nothing in this crate performs I/O or drives execution. The engine produces
//! these values while running a workflow; hosts (the CLI, UIs, tool dispatch
//! layers) consume them.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

pub mod tool;
pub mod workflow;

pub use tool::{Tool, ToolDefinition, ToolParameter, ToolParameterError, ToolParameterType, validate_tool_parameters};
pub use workflow::{Advance, HistoryEntry, RunnerEvent, RunnerState, StepReport};

/// Model selection and sampling parameters declared on an assistant, workflow, or step.
///
/// Only the commonly used knobs are typed. Anything else authored under the `model`
/// element is preserved in `extra` so backends can forward it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend model identifier (for example, `gpt-4o`).
    #[serde(default)]
    pub name: Option<String>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Upper bound on generated tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Additional backend-specific fields.
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl ModelConfig {
    /// Convenience constructor for a config that only names the model.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Returns the model name, or an empty string when none was declared.
    pub fn name_or_default(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_config_keeps_unknown_fields() {
        let config: ModelConfig = serde_json::from_value(json!({
            "name": "gpt-4o",
            "temperature": 0.2,
            "max_tokens": 512,
            "top_p": 0.9
        }))
        .expect("deserialize model config");

        assert_eq!(config.name.as_deref(), Some("gpt-4o"));
        assert_eq!(config.max_tokens, Some(512));
        assert_eq!(config.extra.get("top_p"), Some(&json!(0.9)));
    }

    #[test]
    fn model_config_parses_from_yaml() {
        let config: ModelConfig = serde_yaml::from_str("name: o1-mini\n").expect("parse yaml");
        assert_eq!(config.name_or_default(), "o1-mini");
        assert!(config.temperature.is_none());
    }
}
