//! Typed entities hydrated from resolved assistant documents.
//!
//! Each entity keeps the resolved node it was built from. Serialization
//! writes that node back out as XML, minus the fields the entity excludes
//! (model selection is never shown to the model itself).

use aispec_types::ModelConfig;
use serde_json::{Map as JsonMap, Value};

use crate::document::xml::write_xml;
use crate::error::{EngineError, Result};
use crate::hydrate::NodeView;

mod assistant;
mod contract;
mod skill;
mod step;
mod workflow;

pub use assistant::{Assistant, WorkflowMatch};
pub use contract::{Input, Output};
pub use skill::Skill;
pub use step::{LoopDirective, Step};
pub use workflow::Workflow;

/// Common behavior of every hydrated entity.
pub trait Entity {
    /// Element name used when the entity is serialized.
    const TAG: &'static str;

    /// Top-level fields omitted from serialization.
    const EXCLUDED_FIELDS: &'static [&'static str] = &[];

    /// The resolved node this entity was hydrated from.
    fn node(&self) -> &Value;

    /// Node that is written out by [`Entity::to_document_string`].
    fn document_node(&self) -> Value {
        strip_fields(self.node(), Self::EXCLUDED_FIELDS)
    }

    /// Serializes the entity as an indented XML document.
    fn to_document_string(&self) -> Result<String> {
        write_xml(Self::TAG, &self.document_node())
    }
}

pub(crate) fn strip_fields(node: &Value, excluded: &[&str]) -> Value {
    match node {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !excluded.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replaces `container.child` in `node` with `children`, when the container is present.
pub(crate) fn replace_children(node: &mut Value, container: &str, child: &str, children: Vec<Value>) {
    if let Some(Value::Object(section)) = node.get_mut(container) {
        section.insert(child.to_string(), Value::Array(children));
    }
}

/// Reads an optional model declaration.
///
/// A bare string names the model. A mapping is read as a full [`ModelConfig`].
pub(crate) fn model_config(view: &NodeView<'_>) -> Result<Option<ModelConfig>> {
    match view.value("model") {
        None => Ok(None),
        Some(Value::String(name)) if name.trim().is_empty() => Ok(None),
        Some(Value::String(name)) => Ok(Some(ModelConfig::named(name.trim()))),
        Some(Value::Object(map)) => {
            let mut fields: JsonMap<String, Value> = map.clone();
            if let Some(name) = fields.get_mut("name")
                && !name.is_string()
                && !name.is_null()
            {
                *name = Value::String(name.to_string());
            }
            serde_json::from_value(Value::Object(fields))
                .map(Some)
                .map_err(|error| EngineError::malformed(format!("{}.model", view.location()), error.to_string()))
        }
        Some(_) => Err(EngineError::malformed(
            format!("{}.model", view.location()),
            "model must be a name or a mapping",
        )),
    }
}
