//! End-to-end tests for `POST /api/explain` against mock model servers.

mod common;

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tinker_server::{LlmApi, GENERIC_ERROR};

use common::{joined_tokens, parse_event, read_events, spawn, start_server, test_config};

/// Requests seen by a mock model server.
type Seen = Arc<Mutex<Vec<Value>>>;

fn explain_body() -> Value {
    json!({
        "code": "void setup() {\n  pinMode(13, OUTPUT)\n}\n\nvoid loop() {}\n",
        "errors": [{"line": 2, "column": 22, "message": "expected ';' before '}' token"}],
        "verbosity": "brief"
    })
}

async fn post_explain(base: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/api/explain"))
        .json(body)
        .send()
        .await
        .expect("Request failed")
}

/// Splits `text` into chunks of `size` bytes, ignoring character boundaries.
fn byte_chunks(text: &str, size: usize) -> Vec<Result<Vec<u8>, Infallible>> {
    text.as_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect()
}

// ============================================================================
// Mock model servers
// ============================================================================

async fn ollama_chat(State(seen): State<Seen>, Json(request): Json<Value>) -> Response {
    seen.lock().unwrap().push(request);
    let ndjson = [
        r#"{"model":"llama3.2","message":{"role":"assistant","content":"The "},"done":false}"#,
        r#"{"model":"llama3.2","message":{"role":"assistant","content":"semicolon "},"done":false}"#,
        r#"{"model":"llama3.2","message":{"role":"assistant","content":"is missing → "},"done":false}"#,
        r#"{"model":"llama3.2","message":{"role":"assistant","content":"ça arrive."},"done":false}"#,
        r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#,
    ]
    .join("\n")
        + "\n";

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(stream::iter(byte_chunks(&ndjson, 5))))
        .unwrap()
}

async fn openai_chat(Json(_request): Json<Value>) -> Response {
    let sse = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
               data: {\"choices\":[{\"delta\":{\"content\":\"Add a \"}}]}\n\n\
               : keep-alive\n\n\
               data: {\"choices\":[{\"delta\":{\"content\":\"semicolon.\"}}]}\n\n\
               data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n\
               data: [DONE]\n\n";

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(stream::iter(byte_chunks(sse, 11))))
        .unwrap()
}

async fn missing_model() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "model 'llama3.2' not found, try pulling it first"})),
    )
}

async fn broken_midway() -> Response {
    let lines = vec![
        Ok(b"{\"message\":{\"content\":\"Partial \"},\"done\":false}\n".to_vec()),
        Ok(b"{\"message\":{\"content\":\"answer\"},\"done\":false}\n".to_vec()),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "upstream died")),
    ];
    Response::builder()
        .body(Body::from_stream(stream::iter(lines)))
        .unwrap()
}

/// Sets the flag when the mock's response body is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Streams a token every 20ms forever.
fn endless_router(released: Arc<AtomicBool>) -> Router {
    Router::new().route(
        "/api/chat",
        post(move || {
            let released = released.clone();
            async move {
                let guard = DropFlag(released);
                let body = stream::unfold(guard, |guard| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let line = b"{\"message\":{\"content\":\"tick \"},\"done\":false}\n".to_vec();
                    Some((Ok::<_, Infallible>(line), guard))
                });
                Response::builder().body(Body::from_stream(body)).unwrap()
            }
        }),
    )
}

async fn server_with_llm(llm: Router, api: LlmApi) -> (String, tempfile::TempDir) {
    let llm_addr = spawn(llm).await;
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.llm.api = api;
    config.llm.base_url = format!("http://{llm_addr}");
    (start_server(config).await, root)
}

// ============================================================================
// Tests
// ============================================================================

/// Tokens arrive in order, multi-byte text split across chunks survives, and
/// the stream ends with `done`.
#[tokio::test]
async fn test_explain_streams_ollama_tokens() {
    let seen: Seen = Arc::default();
    let llm = Router::new()
        .route("/api/chat", post(ollama_chat))
        .with_state(seen.clone());
    let (base, _root) = server_with_llm(llm, LlmApi::Ollama).await;

    let response = post_explain(&base, &explain_body()).await;
    assert_eq!(response.status(), 200);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = read_events(response).await;
    assert_eq!(joined_tokens(&events), "The semicolon is missing → ça arrive.");
    assert_eq!(events.last(), Some(&("done".to_string(), json!({}))));
    assert_eq!(events.iter().filter(|(name, _)| name == "token").count(), 4);

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request["model"], "llama3.2");
    assert_eq!(request["stream"], true);
    let system = request["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("at most 2 sentences"));
    let user = request["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("line 2, column 22: expected ';' before '}' token"));
    assert!(user.contains(">>    2 |   pinMode(13, OUTPUT)"));
}

#[tokio::test]
async fn test_explain_streams_openai_tokens() {
    let llm = Router::new().route("/v1/chat/completions", post(openai_chat));
    let (base, _root) = server_with_llm(llm, LlmApi::OpenAi).await;

    let events = read_events(post_explain(&base, &explain_body()).await).await;

    assert_eq!(joined_tokens(&events), "Add a semicolon.");
    assert_eq!(events.last().map(|(name, _)| name.as_str()), Some("done"));
}

/// Upstream HTTP errors become one generic error event.
#[tokio::test]
async fn test_explain_upstream_error_is_generic() {
    let llm = Router::new().route("/api/chat", post(missing_model));
    let (base, _root) = server_with_llm(llm, LlmApi::Ollama).await;

    let events = read_events(post_explain(&base, &explain_body()).await).await;

    assert_eq!(
        events,
        vec![("error".to_string(), json!({ "error": GENERIC_ERROR }))]
    );
}

/// A stream that dies midway keeps the tokens already sent and ends in error.
#[tokio::test]
async fn test_explain_upstream_failure_after_tokens() {
    let llm = Router::new().route("/api/chat", post(broken_midway));
    let (base, _root) = server_with_llm(llm, LlmApi::Ollama).await;

    let events = read_events(post_explain(&base, &explain_body()).await).await;

    assert_eq!(joined_tokens(&events), "Partial answer");
    assert_eq!(
        events.last(),
        Some(&("error".to_string(), json!({ "error": GENERIC_ERROR })))
    );
}

/// When the client goes away mid-stream the server stops relaying and
/// releases the upstream connection.
#[tokio::test]
async fn test_explain_client_disconnect_releases_upstream() {
    let released = Arc::new(AtomicBool::new(false));
    let (base, _root) = server_with_llm(endless_router(released.clone()), LlmApi::Ollama).await;

    let response = post_explain(&base, &explain_body()).await;
    let mut body = response.bytes_stream();
    let mut received = String::new();
    while received.matches("event: token").count() < 3 {
        let chunk = body.next().await.expect("stream open").expect("chunk");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(parse_event(received.split("\n\n").next().unwrap()).is_some());
    assert!(!released.load(Ordering::SeqCst));

    drop(body);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !released.load(Ordering::SeqCst) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "upstream stream was not released after client disconnect"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_explain_requires_code() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let response = post_explain(&base, &json!({"code": "", "errors": []})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"ok": false, "error": "Missing 'code'."}));
}
