//! Run context and value lookup for prompt rendering.
//!
//! The [`RunContext`] is the single mutable mapping a workflow run accumulates
//! into. Prompts read from it with dotted paths, and step results are merged
//! or pushed into it as each step completes.

use serde_json::{Map as JsonMap, Value};
use tracing::warn;

/// Execution context shared by every step of a workflow run.
///
/// Keys written by a later step replace keys written by earlier steps. The
/// context is never reset between steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    /// Accumulated values, keyed by top-level variable name.
    ///
    /// Seeded from the initial context passed to `start` and updated by
    /// each step's structured result.
    values: JsonMap<String, Value>,
}

impl RunContext {
    /// Creates a context seeded with `values`.
    pub fn from_values(values: JsonMap<String, Value>) -> Self {
        Self { values }
    }

    /// All accumulated values.
    pub fn values(&self) -> &JsonMap<String, Value> {
        &self.values
    }

    /// Consumes the context and returns its values.
    pub fn into_values(self) -> JsonMap<String, Value> {
        self.values
    }

    /// Returns the top-level value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Resolves a dotted path such as `user.name` against the context.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.values, path)
    }

    /// Shallow-merges `entries` into the context, overwriting existing keys.
    pub fn merge(&mut self, entries: JsonMap<String, Value>) {
        self.values.extend(entries);
    }

    /// Appends `value` to the array stored under `key`, creating the array when absent.
    ///
    /// A non-array value already stored under `key` becomes the first element.
    pub fn push(&mut self, key: &str, value: Value) {
        match self.values.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                warn!(key, "push target is not an array; wrapping existing value");
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                self.values.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    /// Stores an empty array under `key` unless something is already there.
    pub fn ensure_array(&mut self, key: &str) {
        self.values.entry(key.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    }

    /// Returns a copy of the context values with `name` bound to `value`.
    ///
    /// Used to render loop iterations without mutating the shared context.
    pub fn with_binding(&self, name: &str, value: Value) -> JsonMap<String, Value> {
        let mut scoped = self.values.clone();
        scoped.insert(name.to_string(), value);
        scoped
    }
}

/// Resolves a dotted path against a map of values.
///
/// Numeric segments index into arrays. Returns `None` when any segment is missing.
///
/// # Examples
///
/// ```rust
/// use aispec_engine::resolve::resolve_path;
/// use serde_json::json;
///
/// let values = json!({"user": {"name": "Ada", "tags": ["x", "y"]}});
/// let values = values.as_object().unwrap();
/// assert_eq!(resolve_path(values, "user.name"), Some(&json!("Ada")));
/// assert_eq!(resolve_path(values, "user.tags.1"), Some(&json!("y")));
/// assert_eq!(resolve_path(values, "user.age"), None);
/// ```
pub fn resolve_path<'a>(values: &'a JsonMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = values.get(segments.next()?)?;
    segments.try_fold(first, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Renders a context value as prompt text.
///
/// Strings are inserted verbatim, arrays render their items joined by `,`,
/// and objects render as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items.iter().map(render_value).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}
