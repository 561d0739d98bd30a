//! Loading assistant documents and resolving their file references.
//!
//! Documents may be XML, YAML, or JSON. All three parse into the same
//! [`serde_json::Value`] node shape (see [`xml`] for the conventions), so the
//! resolver and the entity hydration layer never care where a node came from.
//!
//! A node of the form `{"@ref": "relative/path.xml"}` is a reference: the
//! resolver replaces it with the contents of that file, resolved recursively
//! against the referenced file's own directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, Result};

pub mod xml;

/// Attribute that marks a node as a reference to another file.
pub const REFERENCE_KEY: &str = "@ref";

/// Source format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Xml,
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Picks a format from the file extension, defaulting to XML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml" | "yml") => DocumentFormat::Yaml,
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Xml,
        }
    }
}

/// Parses document text and unwraps its root.
///
/// A document whose top level is a single key (the XML root element, or a
/// YAML/JSON document wrapped the same way) is unwrapped to that key's value.
/// If the unwrapped value is an array, its first element is used.
pub fn parse_document_str(content: &str, format: DocumentFormat, location: &str) -> Result<Value> {
    let parsed = match format {
        DocumentFormat::Xml => xml::parse_xml(content, location)?,
        DocumentFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|error| EngineError::malformed(location, format!("invalid YAML: {error}")))?
        }
        DocumentFormat::Json => {
            serde_json::from_str(content).map_err(|error| EngineError::malformed(location, format!("invalid JSON: {error}")))?
        }
    };
    unwrap_document_root(parsed, location)
}

fn unwrap_document_root(parsed: Value, location: &str) -> Result<Value> {
    let unwrapped = match parsed {
        Value::Object(mut map) if map.len() == 1 => {
            let key = map.keys().next().cloned().unwrap_or_default();
            map.remove(&key).unwrap_or(Value::Null)
        }
        other => other,
    };
    let node = match unwrapped {
        Value::Array(items) => items.into_iter().next().ok_or_else(|| EngineError::malformed(location, "document root is an empty list"))?,
        other => other,
    };
    match node {
        Value::Object(_) => Ok(node),
        Value::Null => Err(EngineError::malformed(location, "document is empty")),
        _ => Err(EngineError::malformed(location, "document root must be a mapping")),
    }
}

/// Reads and parses a single file without resolving the references inside it.
pub fn load_document_file(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), "loaded document");
    parse_document_str(&content, DocumentFormat::from_path(path), &path.display().to_string())
}

/// Loads a file and resolves every reference reachable from it.
pub fn load_resolved(path: &Path) -> Result<Value> {
    let canonical = canonicalize(path)?;
    let node = load_document_file(&canonical)?;
    let base_dir = parent_dir(&canonical);
    let mut resolver = Resolver { stack: vec![canonical] };
    resolver.resolve(&node, &base_dir)
}

/// Replaces every reference node within `node` with the referenced file's resolved contents.
///
/// Relative paths are resolved against `base_dir`. The result contains no
/// reference markers, so resolving it again returns an equal value.
pub fn resolve_references(node: &Value, base_dir: &Path) -> Result<Value> {
    Resolver { stack: Vec::new() }.resolve(node, base_dir)
}

struct Resolver {
    /// Canonical paths of the files currently being resolved, outermost first.
    stack: Vec<PathBuf>,
}

impl Resolver {
    fn resolve(&mut self, node: &Value, base_dir: &Path) -> Result<Value> {
        match node {
            Value::Array(items) => items.iter().map(|item| self.resolve(item, base_dir)).collect::<Result<Vec<_>>>().map(Value::Array),
            Value::Object(map) => {
                if let Some(reference) = map.get(REFERENCE_KEY) {
                    return self.resolve_reference(reference, base_dir);
                }
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), self.resolve(value, base_dir)?);
                }
                Ok(Value::Object(resolved))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    fn resolve_reference(&mut self, reference: &Value, base_dir: &Path) -> Result<Value> {
        let location = base_dir.display().to_string();
        let raw = reference
            .as_str()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| EngineError::malformed(&location, "reference must be a non-empty file path"))?;
        let canonical = canonicalize(&base_dir.join(raw))?;

        if self.stack.contains(&canonical) {
            let chain = self
                .stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(EngineError::malformed(location, format!("reference cycle: {chain}")));
        }

        let loaded = load_document_file(&canonical)?;
        let nested_base = parent_dir(&canonical);
        debug!(reference = raw, path = %canonical.display(), "resolving reference");
        self.stack.push(canonical);
        let resolved = self.resolve(&loaded, &nested_base);
        self.stack.pop();
        resolved
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_single_root_and_first_sequence_item() {
        let node = parse_document_str("<skill id=\"s\"><name>S</name></skill>", DocumentFormat::Xml, "inline").expect("parse");
        assert_eq!(node, json!({"@id": "s", "name": "S"}));

        let node = parse_document_str("name: Bare\ndescription: Many keys\n", DocumentFormat::Yaml, "inline").expect("parse");
        assert_eq!(node["name"], "Bare");
    }

    #[test]
    fn rejects_scalar_documents() {
        let error = parse_document_str("\"just text\"", DocumentFormat::Json, "inline").expect_err("scalar");
        assert!(matches!(error, EngineError::MalformedDocument { .. }));
    }

    #[test]
    fn resolves_nested_references_relative_to_each_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("steps");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("skill.xml"), r#"<skill id="s"><steps><step ref="steps/one.xml"/></steps></skill>"#).unwrap();
        fs::write(nested.join("one.xml"), r#"<step id="one"><output ref="out.json"/></step>"#).unwrap();
        fs::write(nested.join("out.json"), r#"{"name": "result", "schema": "{}"}"#).unwrap();

        let node = json!({"skills": {"skill": [{"@ref": "skill.xml"}]}});
        let resolved = resolve_references(&node, temp_dir.path()).expect("resolve");
        let step = &resolved["skills"]["skill"][0]["steps"]["step"][0];
        assert_eq!(step["@id"], "one");
        assert_eq!(step["output"]["name"], "result");
        assert!(!resolved.to_string().contains(REFERENCE_KEY));

        let again = resolve_references(&resolved, temp_dir.path()).expect("resolve again");
        assert_eq!(again, resolved);
    }

    #[test]
    fn detects_reference_cycles() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("a.xml"), r#"<skill><dependencies><skill ref="b.xml"/></dependencies></skill>"#).unwrap();
        fs::write(temp_dir.path().join("b.xml"), r#"<skill><dependencies><skill ref="a.xml"/></dependencies></skill>"#).unwrap();

        let error = load_resolved(&temp_dir.path().join("a.xml")).expect_err("cycle");
        match error {
            EngineError::MalformedDocument { reason, .. } => assert!(reason.contains("reference cycle")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_reference_is_an_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let node = json!({"@ref": "nope.xml"});
        let error = resolve_references(&node, temp_dir.path()).expect_err("missing");
        assert!(matches!(error, EngineError::Io { .. }));
    }
}
