//! OpenAI-compatible chat-completions backend.
//!
//! POST {base_url}/chat/completions with the scoped assistant as the system
//! message and the step's response tool as the only function tool. Reasoning
//! models (`o1*`, `o3*`) reject system messages and sampling parameters, so the
//! system prompt is sent as a leading user message and temperature is dropped.

use std::time::Duration;

use aispec_engine::{ModelReply, ModelRequest, ModelService};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::CliConfig;

pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAiBackend {
    pub fn from_config(config: &CliConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backend.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let api_key = config
            .backend
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Ok(Self {
            client,
            base_url: config.backend.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: config.default_model.clone(),
        })
    }
}

#[async_trait]
impl ModelService for OpenAiBackend {
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = build_request_body(&request, &self.default_model);
        info!(url = %url, model = %body["model"], "calling chat completions");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await.context("chat completions request failed")?;
        let status = response.status();
        let text = response.text().await.context("failed to read chat completions response")?;
        if !status.is_success() {
            bail!("chat completions returned {status}: {text}");
        }

        let payload: Value = serde_json::from_str(&text).context("chat completions response is not JSON")?;
        debug!(usage = %payload.get("usage").cloned().unwrap_or_default(), "chat completions usage");
        parse_chat_completion(&payload)
    }
}

fn is_reasoning_model(name: &str) -> bool {
    name.starts_with("o1") || name.starts_with("o3")
}

/// Builds the chat-completions request body for one model call.
pub fn build_request_body(request: &ModelRequest<'_>, default_model: &str) -> Value {
    let model = request.model;
    let model_name = model.and_then(|model| model.name.as_deref()).unwrap_or(default_model);
    let reasoning = is_reasoning_model(model_name);

    let messages = if reasoning {
        json!([
            {"role": "user", "content": request.system_prompt},
            {"role": "user", "content": request.prompt},
        ])
    } else {
        json!([
            {"role": "system", "content": request.system_prompt},
            {"role": "user", "content": request.prompt},
        ])
    };

    let mut body = json!({
        "model": model_name,
        "messages": messages,
    });

    if let Some(model) = model {
        for (key, value) in &model.extra {
            body[key.as_str()] = value.clone();
        }
        if let Some(max_tokens) = model.max_tokens {
            let key = if reasoning { "max_completion_tokens" } else { "max_tokens" };
            body[key] = json!(max_tokens);
        }
        if let Some(temperature) = model.temperature
            && !reasoning
        {
            body["temperature"] = json!(temperature);
        }
    }

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| json!({"type": "function", "function": tool.definition()}))
                .collect(),
        );
        if let [tool] = request.tools {
            body["tool_choice"] = json!({"type": "function", "function": {"name": tool.name()}});
        }
    }

    body
}

/// Extracts the first tool call, or the text content, from a chat-completions response.
pub fn parse_chat_completion(payload: &Value) -> Result<ModelReply> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("chat completions response has no message"))?;

    if let Some(function) = message.pointer("/tool_calls/0/function") {
        let name = function
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("tool call has no function name"))?
            .to_string();
        let arguments = match function.get("arguments") {
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).with_context(|| format!("tool call arguments for '{name}' are not JSON"))?
            }
            Some(value) => value.clone(),
            None => Value::Object(Default::default()),
        };
        return Ok(ModelReply::ToolCall { name, arguments });
    }

    match message.get("content").and_then(Value::as_str) {
        Some(content) => Ok(ModelReply::Text(content.to_string())),
        None => bail!("chat completions message has neither tool calls nor content"),
    }
}
