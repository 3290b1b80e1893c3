//! Mock backend for testing
//!
//! Returns scripted completions in order, then falls back to canned replies.
//! Every request is counted and logged so tests can assert that a stage did
//! or did not reach the model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::types::{Completion, CompletionRequest, UpstreamFailure};
use super::LanguageModel;

/// Canned reply for receipt parsing requests
pub const MOCK_RECEIPT_JSON: &str = r#"{
  "store_name": "Mock Mart",
  "date": "2024-03-15",
  "items": [
    {"name": "Milk", "quantity": 2, "price": 3.0, "category": "Dairy"},
    {"name": "Chips", "quantity": 1, "price": 40.0, "category": "Snacks"}
  ],
  "subtotal": 46.0,
  "tax": 0.0,
  "total": 46.0
}"#;

/// Canned reply for every other request
pub const MOCK_TEXT: &str = "Mock response: spending looks reasonable. Consider a weekly snack budget.";

/// Mock language model for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    model: String,
    scripted: Arc<Mutex<VecDeque<std::result::Result<Completion, UpstreamFailure>>>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            model: "mock-model".to_string(),
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Create a mock that replays the given responses in order
    pub fn scripted(
        responses: impl IntoIterator<Item = std::result::Result<Completion, UpstreamFailure>>,
    ) -> Self {
        let mock = Self::new();
        for response in responses {
            mock.push(response);
        }
        mock
    }

    /// Queue one more response
    pub fn push(&self, response: std::result::Result<Completion, UpstreamFailure>) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(response);
        }
    }

    /// Queue a successful text response
    pub fn push_text(&self, text: &str, tokens_used: u32) {
        self.push(Ok(Completion::new(text, tokens_used)));
    }

    /// Create a new instance with a different model
    ///
    /// The clone shares the script, counter and request log.
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Number of `complete` calls received
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn default_reply(request: &CompletionRequest) -> Completion {
        if request.system.contains("receipt parser") {
            Completion::new(format!("```json\n{}\n```", MOCK_RECEIPT_JSON), 120)
        } else {
            Completion::new(MOCK_TEXT, 60)
        }
    }
}

#[async_trait]
impl LanguageModel for MockBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, UpstreamFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }

        let scripted = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        match scripted {
            Some(response) => response,
            None => Ok(Self::default_reply(request)),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
