//! HTTP API end to end: a real listener, an in-memory store, and a
//! scripted backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use interview_coach::config::Config;
use interview_coach::llm::{BackendError, FragmentStream, LlmBackend};
use interview_coach::{server, Coach};
use interview_coach_core::embedding::HashEmbedder;
use interview_coach_core::store::memory::InMemoryVectorStore;

enum Reply {
    Text(&'static str),
    Throttle,
    Fail,
    /// Fragments, then a mid-stream throttling error.
    Broken(&'static str),
}

struct Scripted(Mutex<VecDeque<Reply>>);

impl Scripted {
    fn next(&self) -> Reply {
        self.0.lock().unwrap().pop_front().unwrap_or(Reply::Text("ok"))
    }
}

#[async_trait]
impl LlmBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
        match self.next() {
            Reply::Text(t) | Reply::Broken(t) => Ok(t.to_string()),
            Reply::Throttle => Err(BackendError::Throttled("Too many requests".into())),
            Reply::Fail => Err(BackendError::Failed("invalid api key".into())),
        }
    }

    async fn stream_complete(&self, _prompt: &str) -> Result<FragmentStream, BackendError> {
        match self.next() {
            Reply::Text(t) => {
                let parts: Vec<Result<String, BackendError>> =
                    t.split_inclusive(' ').map(|w| Ok(w.to_string())).collect();
                Ok(futures::stream::iter(parts).boxed())
            }
            Reply::Broken(t) => Ok(futures::stream::iter(vec![
                Ok(t.to_string()),
                Err(BackendError::Throttled("overloaded".into())),
            ])
            .boxed()),
            Reply::Throttle => Err(BackendError::Throttled("Too many requests".into())),
            Reply::Fail => Err(BackendError::Failed("invalid api key".into())),
        }
    }
}

async fn spawn(replies: Vec<Reply>, max_retries: u32) -> String {
    let mut config = Config::minimal();
    config.generation.min_interval_secs = 0.0;
    config.generation.base_delay_secs = 0.01;
    config.generation.max_retries = max_retries;

    let store = Arc::new(InMemoryVectorStore::new(Arc::new(HashEmbedder::default())));
    let backend = Arc::new(Scripted(Mutex::new(replies.into())));
    let coach = Arc::new(Coach::with_parts(&config, store, backend).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(coach)).await.unwrap();
    });
    format!("http://{}", addr)
}

/// `(event, data)` pairs of an SSE body.
fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            Some((event?, data?))
        })
        .collect()
}

#[tokio::test]
async fn test_health() {
    let base = spawn(vec![], 3).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_document_endpoints() {
    let base = spawn(vec![], 3).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/documents", base))
        .json(&json!({"text": "Coupang fulfillment engineering team", "metadata": {"source": "careers", "url": "https://coupang.example"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let id = resp.json::<Value>().await.unwrap()["id"].as_str().unwrap().to_string();

    client
        .post(format!("{}/documents", base))
        .json(&json!({"text": "pasta recipes"}))
        .send()
        .await
        .unwrap();

    let listed: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let docs = listed["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    let careers = docs.iter().find(|d| d["id"] == id.as_str()).unwrap();
    assert_eq!(careers["source"], "careers");
    assert_eq!(careers["type"], "web");
    assert_eq!(careers["chunk_count"], 1);

    let found: Value = client
        .post(format!("{}/search", base))
        .json(&json!({"query": "Coupang interview", "k": 5}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["results"][0]["metadata"]["url"], "https://coupang.example");

    let deleted = client
        .delete(format!("{}/documents/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);

    let again = client
        .delete(format!("{}/documents/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_empty_document_error_envelope() {
    let base = spawn(vec![], 3).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/documents", base))
        .json(&json!({"text": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "empty_content");
    assert!(body["error"]["message"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn test_generate_history_and_reset() {
    let base = spawn(vec![Reply::Throttle, Reply::Text("Be concise.")], 3).await;
    let client = reqwest::Client::new();

    let answer: Value = client
        .post(format!("{}/generate", base))
        .json(&json!({"question": "Any tips?", "session_id": "s1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["text"], "Be concise.");
    assert_eq!(answer["session_id"], "s1");
    assert_eq!(answer["attempts"], 2);

    let history: Value = client
        .get(format!("{}/sessions/s1/history", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let turns = history["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["text"], "Be concise.");

    let stats: Value = client
        .get(format!("{}/rate-limit/s1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_requests"], 2);

    let reset: Value = client
        .delete(format!("{}/sessions/s1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["existed"], true);
}

#[tokio::test]
async fn test_generate_errors_map_to_statuses() {
    let base = spawn(vec![Reply::Fail, Reply::Throttle, Reply::Throttle], 2).await;
    let client = reqwest::Client::new();

    let backend = client
        .post(format!("{}/generate", base))
        .json(&json!({"question": "q"}))
        .send()
        .await
        .unwrap();
    assert_eq!(backend.status(), 502);
    assert_eq!(backend.json::<Value>().await.unwrap()["error"]["code"], "backend");

    let exhausted = client
        .post(format!("{}/generate", base))
        .json(&json!({"question": "q"}))
        .send()
        .await
        .unwrap();
    assert_eq!(exhausted.status(), 429);
    assert_eq!(
        exhausted.json::<Value>().await.unwrap()["error"]["code"],
        "exhausted_retries"
    );

    let empty = client
        .post(format!("{}/generate", base))
        .json(&json!({"question": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
}

#[tokio::test]
async fn test_stream_success_ends_with_done() {
    let base = spawn(vec![Reply::Text("first second")], 3).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/generate/stream", base))
        .json(&json!({"question": "go", "session_id": "live"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"), "{}", content_type);
    let body = resp.text().await.unwrap();

    let events = parse_sse(&body);
    let text: String = events
        .iter()
        .filter(|(name, _)| name == "delta")
        .map(|(_, data)| data["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(text, "first second");
    let (last, data) = events.last().unwrap();
    assert_eq!(last, "done");
    assert_eq!(data["session_id"], "live");
}

#[tokio::test]
async fn test_stream_failure_ends_with_error_event() {
    let base = spawn(vec![Reply::Broken("partial ")], 3).await;
    let body = reqwest::Client::new()
        .post(format!("{}/generate/stream", base))
        .json(&json!({"question": "go"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let events = parse_sse(&body);
    assert_eq!(events[0].0, "delta");
    assert_eq!(events[0].1["text"], "partial ");
    let (last, data) = events.last().unwrap();
    assert_eq!(last, "error");
    assert_eq!(data["code"], "stream_interrupted");
    assert!(events.iter().all(|(name, _)| name != "done"));
}
