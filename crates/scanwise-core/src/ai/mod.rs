//! Pluggable language model backend abstraction
//!
//! Every model call in Scanwise is a single system + user prompt pair sent to
//! a chat completion endpoint. Components receive a backend handle at
//! construction time; there is no process-wide client.
//!
//! # Architecture
//!
//! - `LanguageModel` trait: the one operation every backend provides
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let ai = AIClient::from_env(&config).expect("AI backend configured");
//! let completion = ai
//!     .complete(&CompletionRequest::new("You are helpful.", "Hello"))
//!     .await?;
//! println!("{} ({} tokens)", completion.text, completion.tokens_used);
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai_compatible, mock). Default: openai_compatible
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (default: https://api.openai.com)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: model from config)
//! - `OPENAI_COMPATIBLE_API_KEY` or `OPENAI_API_KEY`: API key

mod mock;
mod openai_compatible;
pub mod types;

pub use mock::{MockBackend, MOCK_RECEIPT_JSON, MOCK_TEXT};
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;

use crate::config::Config;

/// Trait implemented by every language model backend
///
/// Backends must be Send + Sync so pipelines can run on any task.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one chat completion
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, UpstreamFailure>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for std::sync::Arc<T> {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, UpstreamFailure> {
        (**self).complete(request).await
    }

    async fn health_check(&self) -> bool {
        (**self).health_check().await
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    fn host(&self) -> &str {
        (**self).host()
    }
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible backend (OpenAI, vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `openai_compatible` (default): Uses OPENAI_COMPATIBLE_HOST and an API key
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if no API key is set for a remote OpenAI host.
    pub fn from_env(config: &Config) -> Option<Self> {
        let backend =
            std::env::var("AI_BACKEND").unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env(config).map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(
                    backend = %backend,
                    "Unknown AI_BACKEND, falling back to openai_compatible"
                );
                OpenAICompatibleBackend::from_env(config).map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create an OpenAI-compatible backend directly
    pub fn openai_compatible(host: &str, model: &str, api_key: Option<&str>) -> Self {
        let backend = match api_key {
            Some(key) => OpenAICompatibleBackend::with_api_key(host, model, key),
            None => OpenAICompatibleBackend::new(host, model),
        };
        AIClient::OpenAICompatible(backend)
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }

    /// Backend name for status output
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Mock(_) => "mock",
        }
    }

    pub fn info(&self) -> BackendInfo {
        BackendInfo {
            backend: self.backend_name().to_string(),
            host: self.host().to_string(),
            model: self.model().to_string(),
        }
    }
}

// Implement LanguageModel for AIClient by delegating to the inner backend
#[async_trait]
impl LanguageModel for AIClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, UpstreamFailure> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete(request).await,
            AIClient::Mock(b) => b.complete(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
