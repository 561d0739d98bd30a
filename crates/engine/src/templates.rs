//! Prompt templates with `${path}` placeholders.

use serde_json::{Map as JsonMap, Value};

use crate::error::{EngineError, Result};
use crate::resolve::{render_value, resolve_path};

/// A prompt template.
///
/// Placeholders take the form `${path}`, where `path` is a dotted lookup into
/// the run context (`${user.name}`). Whitespace inside the braces is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    template: String,
    variables: Vec<String>,
}

impl Prompt {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = extract_variables(&template);
        Self { template, variables }
    }

    /// The raw template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Distinct placeholder paths in first-appearance order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Renders the template against `values`.
    ///
    /// Every placeholder must resolve to a non-null value; the first one that
    /// does not fails with [`EngineError::MissingVariable`].
    pub fn interpolate(&self, values: &JsonMap<String, Value>) -> Result<String> {
        let mut rendered = String::with_capacity(self.template.len());
        let mut remainder = self.template.as_str();

        while let Some(start) = remainder.find("${") {
            let after_start = &remainder[start + 2..];
            let Some(end) = after_start.find('}') else {
                break;
            };
            let expression = after_start[..end].trim();
            rendered.push_str(&remainder[..start]);
            if expression.is_empty() {
                rendered.push_str(&remainder[start..start + 2 + end + 1]);
            } else {
                match resolve_path(values, expression) {
                    Some(value) if !value.is_null() => rendered.push_str(&render_value(value)),
                    _ => {
                        return Err(EngineError::MissingVariable {
                            variable: expression.to_string(),
                        });
                    }
                }
            }
            remainder = &after_start[end + 1..];
        }

        rendered.push_str(remainder);
        Ok(rendered)
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}

/// Extracts distinct placeholder paths from a template, preserving first-appearance order.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    let mut remainder = template;

    while let Some(start) = remainder.find("${") {
        let after_start = &remainder[start + 2..];
        let Some(end) = after_start.find('}') else {
            break;
        };
        let expression = after_start[..end].trim();
        if !expression.is_empty() && !variables.iter().any(|existing| existing == expression) {
            variables.push(expression.to_string());
        }
        remainder = &after_start[end + 1..];
    }

    variables
}
