//! Retrying HTTP sends shared by the embedding providers and the chat client.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Send the request produced by `make`, retrying transient failures.
///
/// `make` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`. Returns the first successful response.
pub(crate) async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    mut make: F,
) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(
                attempt,
                delay_secs = delay.as_secs(),
                "{} request failed, retrying",
                label
            );
            tokio::time::sleep(delay).await;
        }

        match make().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = api_error_message(&body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, message));
                    continue;
                }
                bail!("{} API error {}: {}", label, status, message);
            }
            Err(e) => {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                last_err = Some(anyhow!("{} request {}: {}", label, kind, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}

/// Delay before retry number `attempt` (1-based).
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: String },
    Text(String),
}

/// Pull the human-readable message out of an API error body.
///
/// Understands `{"error": {"message": ...}}` (OpenAI, Groq),
/// `{"error": "..."}` (Ollama) and `{"message": ...}` (Cohere); anything
/// else is returned as-is.
pub(crate) fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: Some(ErrorDetail::Object { message } | ErrorDetail::Text(message)),
            ..
        }) => message,
        Ok(ErrorEnvelope {
            message: Some(message),
            ..
        }) => message,
        _ => body.trim().to_string(),
    }
}
