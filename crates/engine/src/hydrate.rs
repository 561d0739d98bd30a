//! Hydration helpers that turn resolved nodes into typed entities.
//!
//! Entities read their fields through a [`NodeView`], which offers dotted-path
//! lookup and the two mounting rules used by every entity:
//!
//! - a path that yields an array mounts one child per element,
//! - a path that yields a single mapping mounts exactly one child,
//! - a path that yields nothing leaves the field unset.

use serde_json::Value;

use crate::error::{EngineError, Result};

/// Looks up a dotted path such as `skills.skill` or `steps.step.0` inside a node.
///
/// Numeric segments index into arrays.
pub fn lookup_path<'a>(node: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(node, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Entities that can be built from a resolved node.
pub trait FromNode: Sized {
    fn from_node(view: &NodeView<'_>) -> Result<Self>;
}

/// Read-only view over a resolved mapping node.
#[derive(Debug, Clone)]
pub struct NodeView<'a> {
    node: &'a Value,
    location: String,
}

impl<'a> NodeView<'a> {
    /// Wraps `node`, which must be a mapping.
    pub fn new(node: &'a Value, location: impl Into<String>) -> Result<Self> {
        let location = location.into();
        if !node.is_object() {
            return Err(EngineError::malformed(location, format!("expected a mapping, found {}", kind_of(node))));
        }
        Ok(Self { node, location })
    }

    /// The underlying node.
    pub fn raw(&self) -> &'a Value {
        self.node
    }

    /// Breadcrumb used in error messages.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn value(&self, path: &str) -> Option<&'a Value> {
        lookup_path(self.node, path).filter(|value| !value.is_null())
    }

    /// Returns scalar text at `path`, reading `#text` when the element also carries attributes.
    pub fn text(&self, path: &str) -> Option<String> {
        match self.value(path)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            Value::Object(map) => match map.get(crate::document::xml::TEXT_KEY)? {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                _ => None,
            },
            Value::Array(_) | Value::Null => None,
        }
    }

    /// Like [`NodeView::text`], but a missing or empty value is a malformed document.
    pub fn require_text(&self, path: &str) -> Result<String> {
        self.text(path)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| EngineError::malformed(&self.location, format!("missing required field '{path}'")))
    }

    /// Mounts a single child at `path`.
    ///
    /// A one-element array is accepted; a longer array is malformed.
    pub fn mount_one<T: FromNode>(&self, path: &str) -> Result<Option<T>> {
        let child_location = format!("{}.{path}", self.location);
        match self.value(path) {
            None => Ok(None),
            Some(Value::Array(items)) => match items.as_slice() {
                [] => Ok(None),
                [only] => T::from_node(&NodeView::new(only, child_location)?).map(Some),
                _ => Err(EngineError::malformed(child_location, format!("expected one entry, found {}", items.len()))),
            },
            Some(node) => T::from_node(&NodeView::new(node, child_location)?).map(Some),
        }
    }

    /// Mounts one child per element at `path`, or a single child when the path holds one mapping.
    pub fn mount_many<T: FromNode>(&self, path: &str) -> Result<Option<Vec<T>>> {
        match self.value(path) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| T::from_node(&NodeView::new(item, format!("{}.{path}[{index}]", self.location))?))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(node) => Ok(Some(vec![T::from_node(&NodeView::new(node, format!("{}.{path}", self.location))?)?])),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

pub(crate) fn describe_value(value: Option<&Value>) -> &'static str {
    value.map(kind_of).unwrap_or("missing")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Named(String);

    impl FromNode for Named {
        fn from_node(view: &NodeView<'_>) -> Result<Self> {
            view.require_text("name").map(Named)
        }
    }

    #[test]
    fn lookup_walks_maps_and_arrays() {
        let node = json!({"skills": {"skill": [{"name": "a"}, {"name": "b"}]}});
        assert_eq!(lookup_path(&node, "skills.skill.1.name"), Some(&json!("b")));
        assert_eq!(lookup_path(&node, "skills.missing"), None);
        assert_eq!(lookup_path(&node, "skills.skill.name"), None);
    }

    #[test]
    fn mount_many_handles_sequence_mapping_and_absence() {
        let node = json!({"many": [{"name": "a"}, {"name": "b"}], "one": {"name": "c"}});
        let view = NodeView::new(&node, "root").expect("view");

        let many: Vec<Named> = view.mount_many("many").expect("many").expect("present");
        assert_eq!(many.iter().map(|named| named.0.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        let one: Vec<Named> = view.mount_many("one").expect("one").expect("present");
        assert_eq!(one.len(), 1);

        assert!(view.mount_many::<Named>("absent").expect("absent").is_none());
    }

    #[test]
    fn mount_one_rejects_multiple_entries() {
        let node = json!({"output": [{"name": "a"}, {"name": "b"}]});
        let view = NodeView::new(&node, "step").expect("view");
        let error = view.mount_one::<Named>("output").expect_err("two outputs");
        assert!(error.to_string().contains("step.output"));
    }

    #[test]
    fn text_reads_attribute_carrying_elements() {
        let node = json!({"prompt": {"@lang": "en", "#text": "Hi"}, "count": 3});
        let view = NodeView::new(&node, "root").expect("view");
        assert_eq!(view.text("prompt").as_deref(), Some("Hi"));
        assert_eq!(view.text("count").as_deref(), Some("3"));
        assert!(view.require_text("missing").is_err());
    }

    #[test]
    fn view_requires_a_mapping() {
        let node = json!("text");
        assert!(NodeView::new(&node, "root").is_err());
    }
}
