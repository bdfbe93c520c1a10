//! HTTP API tests against an in-process server with embedding and chat fakes.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use docqa::config::Config;
use docqa::llm::{ChatMessage, ChatModel, TextStream};
use docqa::qa::Pipeline;
use docqa_core::embedding::EmbeddingProvider;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct LengthEmbedder;

#[async_trait]
impl EmbeddingProvider for LengthEmbedder {
    fn model_name(&self) -> &str {
        "length-test"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let l = t.to_lowercase();
                vec![
                    l.matches("invoice").count() as f32,
                    l.matches("holiday").count() as f32,
                    0.1,
                ]
            })
            .collect())
    }
}

/// Fails every call after the first `ok` answers.
struct CountingChat {
    calls: AtomicUsize,
    ok: usize,
}

#[async_trait]
impl ChatModel for CountingChat {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.ok {
            return Err(anyhow!("rate limited"));
        }
        Ok(format!("reply {}", n))
    }

    async fn stream(&self, _messages: &[ChatMessage]) -> Result<TextStream> {
        Err(anyhow!("not used"))
    }
}

async fn start_server(ok_answers: usize) -> String {
    let chat = Arc::new(CountingChat {
        calls: AtomicUsize::new(0),
        ok: ok_answers,
    });
    let pipeline = Pipeline::new(Arc::new(LengthEmbedder), chat, &Config::minimal());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        docqa::server::serve(listener, pipeline).await.unwrap();
    });
    format!("http://{}", addr)
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn upload_body() -> Value {
    json!({
        "files": [
            { "filename": "billing.txt", "content_base64": b64(b"Every invoice is due in 30 days.") },
            { "filename": "leave.txt", "content_base64": b64(b"Each holiday must be booked early. A holiday is unpaid.") }
        ]
    })
}

#[tokio::test]
async fn test_health_and_initial_status() {
    let base = start_server(10).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["version"].is_string());

    let status: Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["index_ready"], false);
    assert_eq!(status["chunk_count"], 0);
    assert_eq!(status["answer_style"], "concise");
}

#[tokio::test]
async fn test_ask_before_upload_conflicts() {
    let base = start_server(10).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "When is the invoice due?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "index_not_ready");
}

#[tokio::test]
async fn test_upload_ask_and_history() {
    let base = start_server(10).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/documents", base))
        .json(&upload_body())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["rebuilt"], true);
    assert_eq!(body["report"]["chunks"], 2);
    assert_eq!(body["status"]["index_ready"], true);
    assert_eq!(body["status"]["files"], json!(["billing.txt", "leave.txt"]));

    // Same names again: nothing to rebuild.
    let again: Value = client
        .post(format!("{}/documents", base))
        .json(&upload_body())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["rebuilt"], false);

    for (q, style) in [("When is an invoice due?", "concise"), ("Holiday rules?", "detailed")] {
        let resp = client
            .post(format!("{}/ask", base))
            .json(&json!({ "question": q, "style": style }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let history: Value = client
        .get(format!("{}/history", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["number"], 2);
    assert_eq!(entries[0]["question"], "Holiday rules?");
    assert_eq!(entries[0]["answer"], "reply 2");
    assert_eq!(entries[0]["style"], "detailed");
    assert!(entries[0]["sources"]["leave.txt"].is_array());
    assert_eq!(entries[1]["number"], 1);
    assert_eq!(entries[1]["sources"]["billing.txt"], json!([1]));

    let resp = client
        .delete(format!("{}/history", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let status: Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["history_len"], 0);
    assert_eq!(status["index_ready"], true);
}

#[tokio::test]
async fn test_synthesis_failure_is_not_recorded() {
    let base = start_server(1).await;
    let client = reqwest::Client::new();
    client
        .post(format!("{}/documents", base))
        .json(&upload_body())
        .send()
        .await
        .unwrap();

    let first = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "invoice?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "holiday?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 502);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"]["code"], "synthesis_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("rate limited"));

    let status: Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["history_len"], 1);
}

#[tokio::test]
async fn test_bad_requests() {
    let base = start_server(10).await;
    let client = reqwest::Client::new();

    let empty_q = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty_q.status(), 400);

    let no_files = client
        .post(format!("{}/documents", base))
        .json(&json!({ "files": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(no_files.status(), 400);

    let bad_b64 = client
        .post(format!("{}/documents", base))
        .json(&json!({ "files": [{ "filename": "a.txt", "content_base64": "%%%" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_b64.status(), 400);
    let body: Value = bad_b64.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let traversal = client
        .post(format!("{}/documents", base))
        .json(&json!({ "files": [{ "filename": "../a.txt", "content_base64": b64(b"x") }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(traversal.status(), 400);
}

#[tokio::test]
async fn test_unextractable_upload_fails_build() {
    let base = start_server(10).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/documents", base))
        .json(&json!({ "files": [{ "filename": "scan.png", "content_base64": b64(&[1, 2, 3]) }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "index_build_failed");
}

#[tokio::test]
async fn test_download_indexed_file() {
    let base = start_server(10).await;
    let client = reqwest::Client::new();
    client
        .post(format!("{}/documents", base))
        .json(&upload_body())
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{}/documents/billing.txt", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "text/plain; charset=utf-8"
    );
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("billing.txt"));
    assert_eq!(
        resp.bytes().await.unwrap().as_ref(),
        b"Every invoice is due in 30 days."
    );

    let missing = client
        .get(format!("{}/documents/nope.pdf", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
