//! # AISpec Engine
//!
//! Loads declarative assistant documents and runs their workflows against a
//! language model, one step at a time.
//!
//! ## Key Features
//!
//! - **Document loading**: XML, YAML, or JSON documents with `ref` attributes that pull in other files
//! - **Typed entities**: assistants, skills, workflows, steps, and their input/output contracts
//! - **Scoped system prompts**: each workflow runs with a minimal projection of its assistant
//! - **Structured results**: every model call is forced through a schema-validated response tool
//! - **Loop steps**: a step can run once per item of a context array, pushing or merging results
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use aispec_engine::{Assistant, DocumentFormat, ScriptedModelService};
//! use serde_json::json;
//!
//! let document = r#"
//! <assistant>
//!   <name>Greeter</name>
//!   <workflows>
//!     <workflow id="greet">
//!       <steps>
//!         <step id="hello">
//!           <prompt>Greet ${name}</prompt>
//!           <output>
//!             <name>greeting</name>
//!             <schema>{"type": "object", "properties": {"greeting": {"type": "string"}}}</schema>
//!           </output>
//!         </step>
//!       </steps>
//!     </workflow>
//!   </workflows>
//! </assistant>"#;
//!
//! let assistant = Assistant::from_document_str(document, DocumentFormat::Xml, ".")?;
//! let service = Arc::new(ScriptedModelService::new([("Greet Ada".to_string(), json!({"greeting": "Hello, Ada"}))]));
//! let mut runner = assistant.load_workflow("greet", service)?;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let context = runtime.block_on(async {
//!     let initial = json!({"name": "Ada"}).as_object().cloned().unwrap_or_default();
//!     runner.run_to_completion(initial).await.map(|context| context.values().clone())
//! })?;
//! assert_eq!(context["greeting"], "Hello, Ada");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`document`**: parsing and reference resolution into a generic node tree
//! - **`hydrate`**: dotted lookup and the mounting rules entities are built with
//! - **`model`**: the entity types, their lookup, and serialization
//! - **`templates`** / **`resolve`**: prompt placeholders and the run context they read from
//! - **`executor`**: the workflow runner, the model service seam, and the response tool

pub mod document;
pub mod error;
pub mod executor;
pub mod hydrate;
pub mod model;
pub mod resolve;
pub mod templates;

pub use document::{DocumentFormat, load_document_file, load_resolved, parse_document_str, resolve_references};
pub use error::{EngineError, Result};
pub use executor::{ModelReply, ModelRequest, ModelService, ResponseTool, ScriptedModelService, WorkflowRunner};
pub use model::{Assistant, Entity, Input, LoopDirective, Output, Skill, Step, Workflow, WorkflowMatch};
pub use resolve::RunContext;
pub use templates::Prompt;

pub use aispec_types::{Advance, HistoryEntry, ModelConfig, RunnerEvent, RunnerState, StepReport};
