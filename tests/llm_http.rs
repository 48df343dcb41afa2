//! LLM adapters against a local fake of the Anthropic and
//! OpenAI-compatible HTTP APIs.

use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};

use interview_coach::config::LlmConfig;
use interview_coach::llm::anthropic::AnthropicBackend;
use interview_coach::llm::openai::OpenAiBackend;
use interview_coach::llm::{BackendError, LlmBackend};

#[derive(Clone, Default)]
struct Recorder {
    bodies: Arc<Mutex<Vec<Value>>>,
    keys: Arc<Mutex<Vec<Option<String>>>>,
}

fn sse(events: &[&str]) -> Response {
    let body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn chat_completions(
    State(rec): State<Recorder>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    rec.keys.lock().unwrap().push(auth);
    rec.bodies.lock().unwrap().push(body.clone());

    if body["stream"].as_bool() == Some(true) {
        sse(&[
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            "[DONE]",
        ])
    } else {
        Json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello"}}]
        }))
        .into_response()
    }
}

async fn messages(State(rec): State<Recorder>, headers: axum::http::HeaderMap, Json(body): Json<Value>) -> Response {
    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    rec.keys.lock().unwrap().push(key);
    rec.bodies.lock().unwrap().push(body.clone());

    if body["stream"].as_bool() == Some(true) {
        sse(&[
            r#"{"type":"message_start","message":{}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"안녕"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"하세요"}}"#,
            r#"{"type":"message_stop"}"#,
        ])
    } else {
        Json(json!({
            "content": [{"type": "text", "text": "안녕하세요"}]
        }))
        .into_response()
    }
}

async fn too_many_requests() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
}

async fn overloaded() -> Response {
    let status = StatusCode::from_u16(529).unwrap();
    (
        status,
        Json(json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})),
    )
        .into_response()
}

async fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid api key").into_response()
}

async fn overloaded_mid_stream() -> Response {
    sse(&[
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}"#,
        r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
    ])
}

async fn spawn_fake() -> (String, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/messages", post(messages))
        .route("/busy/chat/completions", post(too_many_requests))
        .route("/busy/v1/messages", post(overloaded))
        .route("/denied/chat/completions", post(unauthorized))
        .route("/flaky/v1/messages", post(overloaded_mid_stream))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), recorder)
}

fn llm_config(provider: &str, base_url: String) -> LlmConfig {
    LlmConfig {
        provider: provider.to_string(),
        model: Some("test-model".to_string()),
        base_url: Some(base_url),
        timeout_secs: 10,
        ..LlmConfig::default()
    }
}

async fn collect(backend: &dyn LlmBackend, prompt: &str) -> Vec<Result<String, BackendError>> {
    backend
        .stream_complete(prompt)
        .await
        .unwrap()
        .collect()
        .await
}

#[tokio::test]
async fn test_openai_complete_and_stream() {
    let (base, rec) = spawn_fake().await;
    let backend = OpenAiBackend::new(&llm_config("openai", format!("{}/v1/", base)), Some("sk-test".into())).unwrap();

    assert_eq!(backend.complete("Say hello").await.unwrap(), "Hello");

    let fragments: Vec<String> = collect(&backend, "Say hello")
        .await
        .into_iter()
        .map(|f| f.unwrap())
        .collect();
    assert_eq!(fragments, vec!["Hel", "lo"]);

    let bodies = rec.bodies.lock().unwrap();
    assert_eq!(bodies[0]["model"], "test-model");
    assert_eq!(bodies[0]["messages"][0]["role"], "user");
    assert_eq!(bodies[0]["messages"][0]["content"], "Say hello");
    assert_eq!(bodies[0]["stream"], false);
    assert_eq!(bodies[1]["stream"], true);
    assert_eq!(rec.keys.lock().unwrap()[0].as_deref(), Some("Bearer sk-test"));
}

#[tokio::test]
async fn test_openai_without_key_sends_no_auth_header() {
    let (base, rec) = spawn_fake().await;
    let backend = OpenAiBackend::new(&llm_config("openai", format!("{}/v1", base)), None).unwrap();

    backend.complete("hi").await.unwrap();
    assert_eq!(rec.keys.lock().unwrap()[0], None);
}

#[tokio::test]
async fn test_anthropic_complete_and_stream() {
    let (base, rec) = spawn_fake().await;
    let backend = AnthropicBackend::new(&llm_config("anthropic", base), "key-123".into()).unwrap();

    assert_eq!(backend.complete("인사").await.unwrap(), "안녕하세요");

    let fragments: Vec<String> = collect(&backend, "인사")
        .await
        .into_iter()
        .map(|f| f.unwrap())
        .collect();
    assert_eq!(fragments.concat(), "안녕하세요");

    assert_eq!(rec.keys.lock().unwrap()[0].as_deref(), Some("key-123"));
    assert_eq!(rec.bodies.lock().unwrap()[0]["max_tokens"], 4096);
}

#[tokio::test]
async fn test_rate_limit_statuses_are_throttling() {
    let (base, _) = spawn_fake().await;

    let openai = OpenAiBackend::new(&llm_config("openai", format!("{}/busy", base)), None).unwrap();
    let err = openai.complete("hi").await.unwrap_err();
    assert!(err.is_throttled(), "{:?}", err);
    assert!(openai.stream_complete("hi").await.err().unwrap().is_throttled());

    let anthropic = AnthropicBackend::new(&llm_config("anthropic", format!("{}/busy", base)), "k".into()).unwrap();
    let err = anthropic.complete("hi").await.unwrap_err();
    assert!(err.is_throttled(), "{:?}", err);
}

#[tokio::test]
async fn test_client_errors_are_not_throttling() {
    let (base, _) = spawn_fake().await;
    let openai = OpenAiBackend::new(&llm_config("openai", format!("{}/denied", base)), None).unwrap();

    match openai.complete("hi").await {
        Err(BackendError::Failed(msg)) => assert!(msg.contains("401"), "{}", msg),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_event_after_output_is_reported_in_stream() {
    let (base, _) = spawn_fake().await;
    let anthropic = AnthropicBackend::new(&llm_config("anthropic", format!("{}/flaky", base)), "k".into()).unwrap();

    let items = collect(&anthropic, "hi").await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "partial");
    assert!(items[1].as_ref().unwrap_err().is_throttled());
}

#[tokio::test]
async fn test_unreachable_server_is_backend_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = OpenAiBackend::new(&llm_config("openai", format!("http://{}", addr)), None).unwrap();
    let err = backend.complete("hi").await.unwrap_err();
    assert!(!err.is_throttled());
}
