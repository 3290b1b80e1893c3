//! Test utilities for scanwise-core
//!
//! Provides a mock OpenAI-compatible server that speaks just enough of the
//! chat completions protocol for backend and integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use crate::ai::{MOCK_RECEIPT_JSON, MOCK_TEXT};

/// How the mock server answers chat completion requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    /// Canned receipt JSON for the parser prompt, fixed text otherwise
    #[default]
    Normal,
    /// Reply with this HTTP status and an error body
    Status(u16),
    /// 200 with an empty `choices` array
    NoChoices,
    /// Sleep before replying normally
    Delay(Duration),
}

#[derive(Clone)]
struct MockState {
    behavior: MockBehavior,
    requests: Arc<AtomicUsize>,
}

/// Mock OpenAI-compatible server for testing and development
pub struct MockOpenAIServer {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOpenAIServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::Normal).await
    }

    pub async fn start_with(behavior: MockBehavior) -> Self {
        let requests = Arc::new(AtomicUsize::new(0));
        let state = MockState {
            behavior,
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Chat completion requests received so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOpenAIServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{ "id": "gpt-3.5-turbo", "object": "model", "owned_by": "mock" }]
    }))
}

async fn handle_chat(
    State(state): State<MockState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    match state.behavior {
        MockBehavior::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (
                status,
                Json(json!({ "error": { "message": "mock failure", "code": code } })),
            )
                .into_response();
        }
        MockBehavior::NoChoices => {
            return Json(json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion",
                "choices": [],
                "usage": { "prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0 }
            }))
            .into_response();
        }
        MockBehavior::Delay(delay) => tokio::time::sleep(delay).await,
        MockBehavior::Normal => {}
    }

    // Detect what type of request this is based on the system prompt
    let is_parse = request
        .messages
        .iter()
        .any(|m| m.role == "system" && m.content.contains("receipt parser"));
    let content = if is_parse {
        format!("```json\n{}\n```", MOCK_RECEIPT_JSON)
    } else {
        MOCK_TEXT.to_string()
    };

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 30, "completion_tokens": 12, "total_tokens": 42 }
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    model: String,
    #[serde(default)]
    messages: Vec<ChatRequestMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatRequestMessage {
    role: String,
    #[serde(default)]
    content: String,
}
