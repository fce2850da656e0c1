//! Shared helpers: fixture paths, a server on an ephemeral port, and SSE
//! reading on the client side.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use futures::StreamExt;
use tinker_server::{create_router, AppState, Config, FrameAccumulator, SseFrame, Utf8Decoder};
use tokio::net::TcpListener;

/// Path to the fixtures directory.
pub fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Serves `router` on 127.0.0.1 with an OS-assigned port.
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Test server failed");
    });
    addr
}

/// Config using the fake compiler, fixture lessons and sandboxes under
/// `sandbox_root`.
pub fn test_config(sandbox_root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.compiler.program = "sh".to_string();
    config.compiler.leading_args = vec![fixtures()
        .join("fake-arduino-cli.sh")
        .display()
        .to_string()];
    config.compiler.timeout_seconds = 5;
    config.compiler.sandbox_root = Some(sandbox_root.display().to_string());
    config.lessons_dir = fixtures().join("lessons").display().to_string();
    config.llm.base_url = "http://127.0.0.1:9".to_string();
    config
}

/// Starts the Tinker server for `config` and returns its base URL.
pub async fn start_server(config: Config) -> String {
    let state = AppState::new(config).expect("Failed to build app state");
    let addr = spawn(create_router(state)).await;
    format!("http://{addr}")
}

/// Reads a whole event stream and returns `(event, data)` pairs.
pub async fn read_events(response: reqwest::Response) -> Vec<(String, serde_json::Value)> {
    let mut utf8 = Utf8Decoder::new();
    let mut frames = FrameAccumulator::events();
    let mut body = response.bytes_stream();
    let mut events = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.expect("Failed to read event stream");
        let text = utf8.push(&chunk);
        events.extend(frames.push(&text).iter().filter_map(|f| parse_event(f)));
    }
    events.extend(frames.finish().and_then(|f| parse_event(&f)));
    events
}

/// Parses one SSE frame into its event name and JSON data.
pub fn parse_event(frame: &str) -> Option<(String, serde_json::Value)> {
    let sse = SseFrame::parse(frame)?;
    let data = serde_json::from_str(&sse.data).expect("Event data is JSON");
    Some((sse.event.unwrap_or_default(), data))
}

/// Concatenates the `token` events.
pub fn joined_tokens(events: &[(String, serde_json::Value)]) -> String {
    events
        .iter()
        .filter(|(name, _)| name == "token")
        .filter_map(|(_, data)| data["token"].as_str())
        .collect()
}
