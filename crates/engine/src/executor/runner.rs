use std::{
    collections::HashMap,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use aispec_types::ModelConfig;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::response_tool::ResponseTool;

/// Everything a backend needs for one model call.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    /// Serialized scoped assistant.
    pub system_prompt: &'a str,
    /// Rendered step prompt.
    pub prompt: &'a str,
    /// Tools offered to the model. The runner always offers exactly one response tool.
    pub tools: &'a [ResponseTool],
    /// Effective model for the step, if any level declared one.
    pub model: Option<&'a ModelConfig>,
}

/// What a backend got back from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// The model answered in free text.
    Text(String),
    /// The model called a tool with JSON arguments.
    ToolCall { name: String, arguments: Value },
}

/// Executes a single model call.
///
/// Implementations decide how to reach a model (HTTP, local process, a test
/// script). The runner owns everything else: prompt rendering, response tool
/// validation, and context updates.
#[async_trait]
pub trait ModelService: Send + Sync {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply>;
}

/// Model service that answers from a prompt-keyed script.
///
/// Each scripted response is returned as a call to the first offered tool.
/// Prompts without a scripted response fail the invocation.
#[derive(Debug, Default)]
pub struct ScriptedModelService {
    responses: HashMap<String, Value>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModelService {
    pub fn new(responses: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Loads a JSON object mapping prompts to tool arguments.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read scripted responses {}", path.display()))?;
        let responses: HashMap<String, Value> =
            serde_json::from_str(&content).with_context(|| format!("scripted responses {} must be a JSON object", path.display()))?;
        Ok(Self::new(responses))
    }

    /// Number of invocations so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl ModelService for ScriptedModelService {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(request.prompt.to_string());
        debug!(prompt = request.prompt, "scripted model invocation");

        let arguments = self
            .responses
            .get(request.prompt)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted response for prompt: {}", request.prompt))?;
        let tool = request.tools.first().ok_or_else(|| anyhow!("no tool offered for prompt: {}", request.prompt))?;
        Ok(ModelReply::ToolCall {
            name: tool.name().to_string(),
            arguments,
        })
    }
}
