use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
};

use aispec_types::ModelConfig;
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value, json};
use tracing::{debug, info};

use super::{Entity, Skill, Workflow, model_config, replace_children};
use crate::document::{self, DocumentFormat};
use crate::error::{EngineError, Result};
use crate::executor::{ModelService, WorkflowRunner};
use crate::hydrate::{FromNode, NodeView};

const LOCATION: &str = "assistant";

/// A registered workflow and the index of the skill that owns it, if any.
#[derive(Debug, Clone, PartialEq)]
struct Registration {
    workflow: Arc<Workflow>,
    skill: Option<usize>,
}

/// Result of [`Assistant::find_workflow`].
#[derive(Debug, Clone, Copy)]
pub struct WorkflowMatch<'a> {
    pub workflow: &'a Arc<Workflow>,
    /// Skill that declares the workflow; `None` for top-level workflows.
    pub skill: Option<&'a Skill>,
}

/// Root of an assistant document.
///
/// Construction registers every workflow (top-level and skill-owned) under its
/// id. Ids must be unique across the whole assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct Assistant {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    model: Option<ModelConfig>,
    skills: Vec<Skill>,
    top_level_workflows: Vec<Arc<Workflow>>,
    registry: IndexMap<String, Registration>,
    node: Value,
}

impl Assistant {
    /// Loads an assistant document from disk, resolving references relative to each file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let node = document::load_resolved(path)?;
        let assistant = Self::from_resolved(&node)?;
        info!(
            path = %path.display(),
            skills = assistant.skills.len(),
            workflows = assistant.registry.len(),
            "loaded assistant"
        );
        Ok(assistant)
    }

    /// Parses document text and resolves its references against `base_dir`.
    pub fn from_document_str(content: &str, format: DocumentFormat, base_dir: impl AsRef<Path>) -> Result<Self> {
        let node = document::parse_document_str(content, format, "<inline>")?;
        Self::from_value(&node, base_dir)
    }

    pub fn from_xml_str(xml: &str, base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_document_str(xml, DocumentFormat::Xml, base_dir)
    }

    /// Builds an assistant from a root node holding only a reference to `path`.
    ///
    /// Relative paths resolve against the working directory.
    pub fn from_reference(path: impl AsRef<Path>) -> Result<Self> {
        let mut node = JsonMap::new();
        node.insert(document::REFERENCE_KEY.to_string(), Value::String(path.as_ref().display().to_string()));
        Self::from_value(&Value::Object(node), Path::new("."))
    }

    /// Resolves references within an already parsed node, then hydrates it.
    pub fn from_value(node: &Value, base_dir: impl AsRef<Path>) -> Result<Self> {
        let resolved = document::resolve_references(node, base_dir.as_ref())?;
        Self::from_resolved(&resolved)
    }

    /// Hydrates a node that contains no reference markers.
    pub fn from_resolved(node: &Value) -> Result<Self> {
        Self::from_node(&NodeView::new(node, LOCATION)?)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
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

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    /// Workflows declared directly on the assistant.
    pub fn top_level_workflows(&self) -> &[Arc<Workflow>] {
        &self.top_level_workflows
    }

    /// Every registered workflow: top-level ones first, then each skill's in declaration order.
    pub fn workflows(&self) -> impl Iterator<Item = &Arc<Workflow>> {
        self.registry.values().map(|registration| &registration.workflow)
    }

    /// Finds a workflow by id, along with the skill that owns it.
    pub fn find_workflow(&self, workflow_id: &str) -> Result<WorkflowMatch<'_>> {
        let registration = self.registry.get(workflow_id).ok_or_else(|| EngineError::WorkflowNotFound {
            id: workflow_id.to_string(),
        })?;
        Ok(WorkflowMatch {
            workflow: &registration.workflow,
            skill: registration.skill.and_then(|index| self.skills.get(index)),
        })
    }

    /// Builds the minimal assistant used as the system prompt for one workflow.
    ///
    /// The projection keeps the assistant's name, description, and model. Skills
    /// other than the owning one are reduced to name and description; the owning
    /// skill is kept whole and placed last. A top-level workflow is carried in the
    /// `workflows` section instead.
    pub fn scoped_to(&self, workflow_id: &str) -> Result<Assistant> {
        let found = self.find_workflow(workflow_id)?;
        let owner = self.registry.get(workflow_id).and_then(|registration| registration.skill);

        let mut projected = JsonMap::new();
        for key in ["name", "description", "model"] {
            if let Some(value) = self.node.get(key) {
                projected.insert(key.to_string(), value.clone());
            }
        }

        let mut skills: Vec<Value> = self
            .skills
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != owner)
            .map(|(_, skill)| skill.summary_node())
            .collect();
        if let Some(skill) = found.skill {
            skills.push(skill.node().clone());
        }
        projected.insert("skills".to_string(), json!({ "skill": skills }));

        if found.skill.is_none() {
            projected.insert("workflows".to_string(), json!({ "workflow": [found.workflow.node().clone()] }));
        }

        debug!(workflow_id, owning_skill = found.skill.and_then(Skill::id), "projected assistant for workflow");
        Self::from_resolved(&Value::Object(projected))
    }

    /// Creates a runner for `workflow_id` whose system prompt is the scoped assistant.
    pub fn load_workflow(&self, workflow_id: &str, model_service: Arc<dyn ModelService>) -> Result<WorkflowRunner> {
        let workflow = Arc::clone(self.find_workflow(workflow_id)?.workflow);
        let scoped = self.scoped_to(workflow_id)?;
        WorkflowRunner::new(Arc::new(scoped), workflow, model_service)
    }
}

impl FromNode for Assistant {
    fn from_node(view: &NodeView<'_>) -> Result<Self> {
        let skills: Vec<Skill> = view.mount_many("skills.skill")?.unwrap_or_default();
        let top_level_workflows: Vec<Arc<Workflow>> = view
            .mount_many::<Workflow>("workflows.workflow")?
            .unwrap_or_default()
            .into_iter()
            .map(Arc::new)
            .collect();

        let mut registry: IndexMap<String, Registration> = IndexMap::new();
        let owned = skills
            .iter()
            .enumerate()
            .flat_map(|(index, skill)| skill.workflows().iter().map(move |workflow| (workflow, Some(index))));
        for (workflow, skill) in top_level_workflows.iter().map(|workflow| (workflow, None)).chain(owned) {
            if registry.contains_key(workflow.id()) {
                return Err(EngineError::malformed(
                    view.location(),
                    format!("workflow id '{}' is declared more than once", workflow.id()),
                ));
            }
            registry.insert(
                workflow.id().to_string(),
                Registration {
                    workflow: Arc::clone(workflow),
                    skill,
                },
            );
        }

        check_dependency_cycles(&skills, view.location())?;

        Ok(Self {
            id: view.text("@id").map(|id| id.trim().to_string()).filter(|id| !id.is_empty()),
            name: view.text("name"),
            description: view.text("description"),
            model: model_config(view)?,
            skills,
            top_level_workflows,
            registry,
            node: view.raw().clone(),
        })
    }
}

impl Entity for Assistant {
    const TAG: &'static str = "assistant";
    const EXCLUDED_FIELDS: &'static [&'static str] = &["model"];

    fn document_node(&self) -> Value {
        let mut node = super::strip_fields(&self.node, Self::EXCLUDED_FIELDS);
        replace_children(&mut node, "skills", "skill", self.skills.iter().map(Entity::document_node).collect());
        replace_children(
            &mut node,
            "workflows",
            "workflow",
            self.top_level_workflows.iter().map(|workflow| workflow.document_node()).collect(),
        );
        node
    }

    fn node(&self) -> &Value {
        &self.node
    }
}

/// Rejects skills whose dependency chain leads back to themselves.
///
/// Skills are matched by id, so a dependency declared as a bare `<skill id="x"/>`
/// links to the dependencies declared for `x` anywhere in the document.
fn check_dependency_cycles(skills: &[Skill], location: &str) -> Result<()> {
    fn collect(skill: &Skill, edges: &mut HashMap<String, Vec<String>>) {
        if let Some(id) = skill.id() {
            let dependency_ids: Vec<String> = skill.dependencies().iter().filter_map(Skill::id).map(str::to_string).collect();
            let entry = edges.entry(id.to_string()).or_default();
            for dependency_id in dependency_ids {
                if !entry.contains(&dependency_id) {
                    entry.push(dependency_id);
                }
            }
        }
        for dependency in skill.dependencies() {
            collect(dependency, edges);
        }
    }

    fn visit(id: &str, edges: &HashMap<String, Vec<String>>, path: &mut Vec<String>, done: &mut HashSet<String>) -> Option<Vec<String>> {
        if let Some(position) = path.iter().position(|visited| visited == id) {
            let mut cycle = path[position..].to_vec();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if done.contains(id) {
            return None;
        }
        path.push(id.to_string());
        for next in edges.get(id).into_iter().flatten() {
            if let Some(cycle) = visit(next, edges, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(id.to_string());
        None
    }

    let mut edges = HashMap::new();
    for skill in skills {
        collect(skill, &mut edges);
    }

    let mut done = HashSet::new();
    let mut roots: Vec<&String> = edges.keys().collect();
    roots.sort();
    for root in roots {
        if let Some(cycle) = visit(root, &edges, &mut Vec::new(), &mut done) {
            return Err(EngineError::malformed(location, format!("skill dependency cycle: {}", cycle.join(" -> "))));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant(node: Value) -> Result<Assistant> {
        Assistant::from_resolved(&node)
    }

    fn sample() -> Value {
        json!({
            "@id": "movie",
            "name": "Movie builder",
            "description": "Builds movies",
            "model": "gpt-4o",
            "skills": {"skill": [
                {"@id": "plot", "name": "Plot", "description": "Plots",
                 "workflows": {"workflow": [{"@id": "plot-outline", "steps": {"step": [{"prompt": "p"}]}}]}},
                {"@id": "characters", "name": "Characters", "description": "Characters",
                 "workflows": {"workflow": [{"@id": "character-building", "steps": {"step": [{"prompt": "c"}]}}]}}
            ]},
            "workflows": {"workflow": [{"@id": "pitch", "steps": {"step": [{"prompt": "pitch"}]}}]}
        })
    }

    #[test]
    fn registers_top_level_then_skill_workflows() {
        let assistant = assistant(sample()).unwrap();
        let ids: Vec<&str> = assistant.workflows().map(|workflow| workflow.id()).collect();
        assert_eq!(ids, vec!["pitch", "plot-outline", "character-building"]);
        assert_eq!(assistant.model().map(ModelConfig::name_or_default), Some("gpt-4o"));
    }

    #[test]
    fn find_workflow_reports_owning_skill() {
        let assistant = assistant(sample()).unwrap();
        let found = assistant.find_workflow("character-building").unwrap();
        assert_eq!(found.skill.and_then(Skill::id), Some("characters"));

        let found = assistant.find_workflow("pitch").unwrap();
        assert!(found.skill.is_none());

        let error = assistant.find_workflow("nope").unwrap_err();
        assert!(matches!(error, EngineError::WorkflowNotFound { ref id } if id == "nope"));
    }

    #[test]
    fn duplicate_workflow_ids_are_malformed() {
        let mut node = sample();
        node["workflows"]["workflow"][0]["@id"] = json!("plot-outline");
        assert!(matches!(assistant(node), Err(EngineError::MalformedDocument { .. })));
    }

    #[test]
    fn scoped_assistant_keeps_only_the_owning_skill_whole() {
        let assistant = assistant(sample()).unwrap();
        let scoped = assistant.scoped_to("character-building").unwrap();

        assert!(scoped.id().is_none());
        assert_eq!(scoped.name(), Some("Movie builder"));
        assert_eq!(scoped.skills().len(), 2);
        assert_eq!(scoped.skills()[0].name(), Some("Plot"));
        assert!(scoped.skills()[0].workflows().is_empty());
        assert_eq!(scoped.skills()[1].name(), Some("Characters"));
        assert!(scoped.top_level_workflows().is_empty());

        let ids: Vec<&str> = scoped.workflows().map(|workflow| workflow.id()).collect();
        assert_eq!(ids, vec!["character-building"]);
    }

    #[test]
    fn scoped_assistant_for_top_level_workflow() {
        let assistant = assistant(sample()).unwrap();
        let scoped = assistant.scoped_to("pitch").unwrap();
        assert!(scoped.skills().iter().all(|skill| skill.workflows().is_empty()));
        assert_eq!(scoped.top_level_workflows()[0].id(), "pitch");
    }

    #[test]
    fn serialization_hides_models_at_every_level() {
        let mut node = sample();
        node["workflows"]["workflow"][0]["model"] = json!("secret-model");
        let xml = assistant(node).unwrap().to_document_string().unwrap();
        assert!(xml.starts_with("<assistant id=\"movie\">"));
        assert!(!xml.contains("<model"));
        assert!(xml.contains("<name>Movie builder</name>"));
    }

    #[test]
    fn detects_dependency_cycles_by_id() {
        let node = json!({
            "skills": {"skill": [
                {"@id": "a", "dependencies": {"skill": [{"@id": "b"}]}},
                {"@id": "b", "dependencies": {"skill": [{"@id": "a"}]}}
            ]}
        });
        let error = assistant(node).unwrap_err();
        assert!(error.to_string().contains("skill dependency cycle"));

        let acyclic = json!({
            "skills": {"skill": [
                {"@id": "a", "dependencies": {"skill": [{"@id": "b"}, {"@id": "c"}]}},
                {"@id": "b", "dependencies": {"skill": [{"@id": "c"}]}}
            ]}
        });
        assert!(assistant(acyclic).is_ok());
    }
}
