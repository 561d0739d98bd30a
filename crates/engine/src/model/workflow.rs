use std::collections::HashSet;

use aispec_types::ModelConfig;
use serde_json::Value;

use super::{Entity, Step, model_config, replace_children};
use crate::error::{EngineError, Result};
use crate::hydrate::{FromNode, NodeView};

/// An ordered sequence of steps, identified by id within its assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    id: String,
    name: Option<String>,
    description: Option<String>,
    model: Option<ModelConfig>,
    steps: Vec<Step>,
    node: Value,
}

impl Workflow {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn model(&self) -> Option<&ModelConfig> {
        self.model.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl FromNode for Workflow {
    fn from_node(view: &NodeView<'_>) -> Result<Self> {
        let id = view.require_text("@id")?.trim().to_string();
        let mut steps: Vec<Step> = view.mount_many("steps.step")?.unwrap_or_default();

        let mut seen = HashSet::new();
        for (index, step) in steps.iter_mut().enumerate() {
            if step.id.is_empty() {
                step.id = format!("step-{}", index + 1);
            }
            if !seen.insert(step.id.clone()) {
                return Err(EngineError::malformed(
                    view.location(),
                    format!("workflow '{id}' declares step '{}' more than once", step.id),
                ));
            }
        }

        Ok(Self {
            id,
            name: view.text("name"),
            description: view.text("description"),
            model: model_config(view)?,
            steps,
            node: view.raw().clone(),
        })
    }
}

impl Entity for Workflow {
    const TAG: &'static str = "workflow";
    const EXCLUDED_FIELDS: &'static [&'static str] = &["model"];

    fn document_node(&self) -> Value {
        let mut node = super::strip_fields(&self.node, Self::EXCLUDED_FIELDS);
        replace_children(&mut node, "steps", "step", self.steps.iter().map(Entity::document_node).collect());
        node
    }

    fn node(&self) -> &Value {
        &self.node
    }
}
