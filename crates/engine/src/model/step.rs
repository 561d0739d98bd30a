use aispec_types::ModelConfig;
use serde_json::Value;

use super::{Entity, Input, Output, model_config};
use crate::error::{EngineError, Result};
use crate::hydrate::{FromNode, NodeView};
use crate::templates::Prompt;

/// Loop directive of a step: iterate the context array `source`, binding each item as `binding`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDirective {
    pub source: String,
    pub binding: String,
}

/// Binding name used when a loop step omits `as`.
pub const DEFAULT_LOOP_BINDING: &str = "item";

/// A single unit of work: render a prompt, call the model once (or once per loop item),
/// and fold the structured result into the run context.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub(crate) id: String,
    name: Option<String>,
    description: Option<String>,
    model: Option<ModelConfig>,
    input: Option<Input>,
    output: Option<Output>,
    prompt: Prompt,
    loop_directive: Option<LoopDirective>,
    node: Value,
}

impl Step {
    /// Step identifier. Steps without an `id` attribute are numbered by position (`step-1`, ...).
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

    pub fn input(&self) -> Option<&Input> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn loop_directive(&self) -> Option<&LoopDirective> {
        self.loop_directive.as_ref()
    }
}

impl FromNode for Step {
    fn from_node(view: &NodeView<'_>) -> Result<Self> {
        let prompt = view
            .text("prompt")
            .filter(|text| !text.trim().is_empty())
            .map(Prompt::new)
            .ok_or_else(|| EngineError::malformed(view.location(), "step has no prompt"))?;

        let loop_directive = match (view.text("@loop"), view.text("@as")) {
            (Some(source), binding) if !source.trim().is_empty() => Some(LoopDirective {
                source: source.trim().to_string(),
                binding: binding
                    .map(|binding| binding.trim().to_string())
                    .filter(|binding| !binding.is_empty())
                    .unwrap_or_else(|| DEFAULT_LOOP_BINDING.to_string()),
            }),
            (None, Some(_)) => return Err(EngineError::malformed(view.location(), "'as' is only valid together with 'loop'")),
            _ => None,
        };

        Ok(Self {
            id: view.text("@id").map(|id| id.trim().to_string()).unwrap_or_default(),
            name: view.text("name"),
            description: view.text("description"),
            model: model_config(view)?,
            input: view.mount_one("input")?,
            output: view.mount_one("output")?,
            prompt,
            loop_directive,
            node: view.raw().clone(),
        })
    }
}

impl Entity for Step {
    const TAG: &'static str = "step";
    const EXCLUDED_FIELDS: &'static [&'static str] = &["model"];

    fn node(&self) -> &Value {
        &self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hydrates_loop_step() {
        let node = json!({
            "@id": "characters",
            "@loop": "surnames",
            "@as": "surname",
            "prompt": "Generate a character named ${name} ${surname}",
            "model": "gpt-4o",
            "output": {"@push": "characters", "schema": "{\"type\": \"object\"}"}
        });
        let step = Step::from_node(&NodeView::new(&node, "step").unwrap()).unwrap();
        assert_eq!(step.id(), "characters");
        assert_eq!(
            step.loop_directive(),
            Some(&LoopDirective {
                source: "surnames".into(),
                binding: "surname".into()
            })
        );
        assert_eq!(step.prompt().variables(), &["name".to_string(), "surname".to_string()]);
        assert_eq!(step.model().and_then(|model| model.name.as_deref()), Some("gpt-4o"));
        assert_eq!(step.output().and_then(Output::push), Some("characters"));
    }

    #[test]
    fn loop_binding_defaults_to_item() {
        let node = json!({"@loop": "things", "prompt": "Describe ${item}"});
        let step = Step::from_node(&NodeView::new(&node, "step").unwrap()).unwrap();
        assert_eq!(step.loop_directive().map(|directive| directive.binding.as_str()), Some(DEFAULT_LOOP_BINDING));
    }

    #[test]
    fn requires_a_prompt() {
        let node = json!({"@id": "empty"});
        assert!(Step::from_node(&NodeView::new(&node, "step").unwrap()).is_err());
    }

    #[test]
    fn serialization_hides_model() {
        let node = json!({"@id": "a", "prompt": "Hi", "model": {"name": "o1-mini"}});
        let step = Step::from_node(&NodeView::new(&node, "step").unwrap()).unwrap();
        let xml = step.to_document_string().unwrap();
        assert!(xml.contains("<prompt>Hi</prompt>"));
        assert!(!xml.contains("o1-mini"));
    }
}
