//! Chat-completion client.
//!
//! [`ChatModel`] is the seam between the pipeline and the hosted model;
//! [`OpenAiCompatClient`] implements it for any OpenAI-compatible
//! `/chat/completions` endpoint (Groq by default).
//!
//! Completions come back either whole ([`ChatModel::complete`]) or as a
//! [`TextStream`] of content fragments parsed from server-sent events
//! ([`ChatModel::stream`]). A stream is finite, cannot be restarted, and
//! dropping it stops reading from the connection.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::http::{api_error_message, send_with_retry};

/// Models listed first in the model picker when the service offers them,
/// and offered on their own when the model list cannot be fetched.
pub const PREFERRED_MODELS: [&str; 3] = [
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
    "gemma2-9b-it",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lazily produced completion text.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Full completion for `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Completion for `messages` as it is generated.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream>;

    /// Model ids to offer in a picker.
    async fn available_models(&self) -> Vec<String> {
        PREFERRED_MODELS.iter().map(|m| m.to_string()).collect()
    }
}

/// Client for OpenAI-compatible chat APIs.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key_env: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiCompatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    /// Same client talking to a different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", self.api_key_env))
    }

    async fn post_completion(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        };
        debug!(model = %self.model, messages = messages.len(), stream, "chat completion request");
        send_with_retry("Chat", self.max_retries, || {
            self.http.post(&url).bearer_auth(&key).json(&body)
        })
        .await
    }

    /// Model ids offered by the service, unordered.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let key = self.api_key()?;
        let url = format!("{}/models", self.base_url);
        let response = send_with_retry("Models", self.max_retries, || {
            self.http.get(&url).bearer_auth(&key)
        })
        .await?;
        let list: ModelList = response.json().await.context("Invalid model list")?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.post_completion(messages, false).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .context("Invalid chat completion response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| anyhow!("chat completion response has no content"))
    }

    /// Preferred models first, then the rest sorted. Falls back to
    /// [`PREFERRED_MODELS`] when the list cannot be fetched.
    async fn available_models(&self) -> Vec<String> {
        match self.list_models().await {
            Ok(models) if !models.is_empty() => order_models(models),
            Ok(_) => PREFERRED_MODELS.iter().map(|m| m.to_string()).collect(),
            Err(e) => {
                warn!("could not list models: {:#}", e);
                PREFERRED_MODELS.iter().map(|m| m.to_string()).collect()
            }
        }
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let response = self.post_completion(messages, true).await?;
        let fragments = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(e) if e.data.trim() == "[DONE]"))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(e) => parse_stream_data(&e.data).transpose(),
                    Err(e) => Some(Err(anyhow!("chat stream interrupted: {}", e))),
                })
            });
        Ok(Box::pin(fragments))
    }
}

/// Content fragment carried by one SSE `data:` payload, if any.
fn parse_stream_data(data: &str) -> Result<Option<String>> {
    if data.trim().is_empty() {
        return Ok(None);
    }
    let chunk: StreamChunk = serde_json::from_str(data).context("Invalid chat stream event")?;
    if let Some(err) = chunk.error {
        return Err(anyhow!("chat stream error: {}", api_error_message(&json_error_body(err))));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|s| !s.is_empty()))
}

fn json_error_body(err: serde_json::Value) -> String {
    serde_json::json!({ "error": err }).to_string()
}

/// Preferred models that are available, in preference order, then the rest sorted.
pub fn order_models(available: Vec<String>) -> Vec<String> {
    let mut ordered: Vec<String> = PREFERRED_MODELS
        .iter()
        .filter(|p| available.iter().any(|a| a == *p))
        .map(|p| p.to_string())
        .collect();
    let mut rest: Vec<String> = available
        .into_iter()
        .filter(|a| !PREFERRED_MODELS.contains(&a.as_str()))
        .collect();
    rest.sort();
    rest.dedup();
    ordered.extend(rest);
    ordered
}

/// Drain `stream`, calling `on_fragment` for each piece, and return the full text.
///
/// Stops at the first error; the text received so far is discarded.
pub async fn collect_stream<F>(mut stream: TextStream, mut on_fragment: F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut full = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        on_fragment(&fragment);
        full.push_str(&fragment);
    }
    Ok(full)
}
