use serde_json::Value;

use super::Entity;
use crate::error::{EngineError, Result};
use crate::hydrate::{FromNode, NodeView};

/// Declared shape of the data a step consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    schema: Option<Value>,
    node: Value,
}

impl Input {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }
}

impl FromNode for Input {
    fn from_node(view: &NodeView<'_>) -> Result<Self> {
        Ok(Self {
            id: view.text("@id"),
            name: view.text("name"),
            description: view.text("description"),
            schema: parse_schema(view)?,
            node: view.raw().clone(),
        })
    }
}

impl Entity for Input {
    const TAG: &'static str = "input";

    fn node(&self) -> &Value {
        &self.node
    }
}

/// Declared shape of the data a step produces.
///
/// The schema becomes the parameter schema of the step's response tool. When
/// `push` is set on a loop step, each iteration's result is appended to the
/// context array of that name instead of being merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    schema: Option<Value>,
    push: Option<String>,
    node: Value,
}

impl Output {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Context key loop iterations append to.
    pub fn push(&self) -> Option<&str> {
        self.push.as_deref()
    }
}

impl FromNode for Output {
    fn from_node(view: &NodeView<'_>) -> Result<Self> {
        Ok(Self {
            id: view.text("@id"),
            name: view.text("name"),
            description: view.text("description"),
            schema: parse_schema(view)?,
            push: view.text("@push").map(|key| key.trim().to_string()).filter(|key| !key.is_empty()),
            node: view.raw().clone(),
        })
    }
}

impl Entity for Output {
    const TAG: &'static str = "output";

    fn node(&self) -> &Value {
        &self.node
    }
}

/// Reads the `schema` field, which is JSON Schema either embedded as JSON text or authored as a mapping.
fn parse_schema(view: &NodeView<'_>) -> Result<Option<Value>> {
    let location = || format!("{}.schema", view.location());
    match view.value("schema") {
        None => Ok(None),
        Some(Value::Object(map)) if map.contains_key(crate::document::xml::TEXT_KEY) => match view.text("schema") {
            Some(text) => parse_schema_text(&text, location()),
            None => Ok(None),
        },
        Some(schema @ Value::Object(_)) => Ok(Some(schema.clone())),
        Some(Value::String(text)) => parse_schema_text(text, location()),
        Some(_) => Err(EngineError::malformed(location(), "schema must be JSON text or a mapping")),
    }
}

fn parse_schema_text(text: &str, location: String) -> Result<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(text) {
        Ok(schema @ Value::Object(_)) => Ok(Some(schema)),
        Ok(_) => Err(EngineError::malformed(location, "schema must be a JSON object")),
        Err(error) => Err(EngineError::malformed(location, format!("schema is not valid JSON: {error}"))),
    }
}
