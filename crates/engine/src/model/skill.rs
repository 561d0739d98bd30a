use std::sync::Arc;

use serde_json::{Map as JsonMap, Value};

use super::{Entity, Workflow, replace_children};
use crate::error::Result;
use crate::hydrate::{FromNode, NodeView};

/// A named capability grouping workflows, optionally depending on other skills.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    dependencies: Vec<Skill>,
    workflows: Vec<Arc<Workflow>>,
    node: Value,
}

impl Skill {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn dependencies(&self) -> &[Skill] {
        &self.dependencies
    }

    pub fn workflows(&self) -> &[Arc<Workflow>] {
        &self.workflows
    }

    /// Node carrying only the skill's name and description.
    pub(crate) fn summary_node(&self) -> Value {
        let mut summary = JsonMap::new();
        for key in ["name", "description"] {
            if let Some(value) = self.node.get(key) {
                summary.insert(key.to_string(), value.clone());
            }
        }
        Value::Object(summary)
    }
}

impl FromNode for Skill {
    fn from_node(view: &NodeView<'_>) -> Result<Self> {
        let workflows: Vec<Workflow> = view.mount_many("workflows.workflow")?.unwrap_or_default();
        Ok(Self {
            id: view.text("@id").map(|id| id.trim().to_string()).filter(|id| !id.is_empty()),
            name: view.text("name"),
            description: view.text("description"),
            dependencies: view.mount_many("dependencies.skill")?.unwrap_or_default(),
            workflows: workflows.into_iter().map(Arc::new).collect(),
            node: view.raw().clone(),
        })
    }
}

impl Entity for Skill {
    const TAG: &'static str = "skill";

    fn document_node(&self) -> Value {
        let mut node = self.node.clone();
        replace_children(
            &mut node,
            "workflows",
            "workflow",
            self.workflows.iter().map(|workflow| workflow.document_node()).collect(),
        );
        replace_children(&mut node, "dependencies", "skill", self.dependencies.iter().map(Entity::document_node).collect());
        node
    }

    fn node(&self) -> &Value {
        &self.node
    }
}
