//! HTTP embedding providers.
//!
//! Concrete implementations of [`EmbeddingProvider`]:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are turned off.
//! - **[`OpenAIProvider`]**: `POST {url}/embeddings`, key from `OPENAI_API_KEY`.
//! - **[`CohereProvider`]**: `POST {url}/embed` with separate document and
//!   query input types, key from `COHERE_API_KEY`.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed` endpoint.
//!
//! Use [`create_provider`] to pick one from configuration:
//!
//! ```rust,no_run
//! # use docqa::config::EmbeddingConfig;
//! # use docqa::embedding::create_provider;
//! let mut config = EmbeddingConfig::default();
//! config.provider = "disabled".to_string();
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! All providers share the retry and backoff policy in [`crate::http`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use docqa_core::embedding::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::http::send_with_retry;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";
const COHERE_DEFAULT_URL: &str = "https://api.cohere.com/v1";
const COHERE_DEFAULT_MODEL: &str = "embed-english-v3.0";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text";

/// Instantiate the provider named by `config.provider`.
///
/// | `provider` | Type |
/// |---|---|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"cohere"` | [`CohereProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "cohere" => Ok(Arc::new(CohereProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

fn base_url(config: &EmbeddingConfig, default: &str) -> String {
    config
        .url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

fn api_key(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| anyhow::anyhow!("{} environment variable not set", var))
}

// ============ Disabled Provider ============

/// Provider that refuses to embed anything.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled; set [embedding].provider in the config")
    }
}

// ============ OpenAI Provider ============

pub struct OpenAIProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/embeddings", base_url(config, OPENAI_DEFAULT_URL)),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let key = api_key("OPENAI_API_KEY")?;
        let body = OpenAIRequest {
            model: &self.model,
            input: texts,
        };
        let response = send_with_retry("OpenAI", self.max_retries, || {
            self.client.post(&self.url).bearer_auth(&key).json(&body)
        })
        .await?;
        let parsed: OpenAIResponse = response
            .json()
            .await
            .context("Invalid OpenAI response")?;
        Ok(order_openai(parsed.data))
    }
}

/// Vectors in input order; entries without an `index` keep response order.
fn order_openai(mut data: Vec<OpenAIEmbedding>) -> Vec<Vec<f32>> {
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| d.embedding).collect()
}

// ============ Cohere Provider ============

/// Cohere embeddings with asymmetric input types: chunks are embedded as
/// `search_document`, questions as `search_query`.
pub struct CohereProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: &'static str,
    truncate: &'static str,
}

#[derive(Deserialize)]
struct CohereResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl CohereProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/embed", base_url(config, COHERE_DEFAULT_URL)),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| COHERE_DEFAULT_MODEL.to_string()),
            max_retries: config.max_retries,
        })
    }

    async fn embed(&self, texts: &[String], input_type: &'static str) -> Result<Vec<Vec<f32>>> {
        let key = api_key("COHERE_API_KEY")?;
        let body = CohereRequest {
            model: &self.model,
            texts,
            input_type,
            truncate: "END",
        };
        let response = send_with_retry("Cohere", self.max_retries, || {
            self.client.post(&self.url).bearer_auth(&key).json(&body)
        })
        .await?;
        let parsed: CohereResponse = response
            .json()
            .await
            .context("Invalid Cohere response")?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts, "search_document").await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()], "search_query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

// ============ Ollama Provider ============

/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    client: reqwest::Client,
    base: String,
    url: String,
    model: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = base_url(config, OLLAMA_DEFAULT_URL);
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/api/embed", base),
            base,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = OpenAIRequest {
            model: &self.model,
            input: texts,
        };
        let response = send_with_retry("Ollama", self.max_retries, || {
            self.client.post(&self.url).json(&body)
        })
        .await
        .with_context(|| format!("is Ollama running at {}?", self.base))?;
        let parsed: OllamaResponse = response
            .json()
            .await
            .context("Invalid Ollama response")?;
        Ok(parsed.embeddings)
    }
}
