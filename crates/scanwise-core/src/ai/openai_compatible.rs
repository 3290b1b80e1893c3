//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - OpenAI (https://api.openai.com)
//! - vLLM (http://localhost:8000)
//! - LocalAI (http://localhost:8080)
//! - llama-server / llama.cpp (http://localhost:8080)
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (default: https://api.openai.com)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: `[llm] model` from config)
//! - `OPENAI_COMPATIBLE_API_KEY` / `OPENAI_API_KEY`: API key

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;

use super::types::{Completion, CompletionRequest, UpstreamFailure};
use super::LanguageModel;

/// Default host when `OPENAI_COMPATIBLE_HOST` is unset
pub const DEFAULT_HOST: &str = "https://api.openai.com";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible backend
///
/// Every request is bounded by `timeout`; a timeout surfaces as
/// `UpstreamFailure::Timeout` instead of hanging. Dropping the future
/// returned by `complete` aborts the in-flight request.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::build(base_url, model, None, DEFAULT_TIMEOUT)
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self::build(base_url, model, Some(api_key.to_string()), DEFAULT_TIMEOUT)
    }

    fn build(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            timeout,
        }
    }

    /// Create a new instance with a different request timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::build(&self.base_url, &self.model, self.api_key.clone(), timeout)
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
            api_key: self.api_key.clone(),
            timeout: self.timeout,
        }
    }

    /// Create from environment variables
    ///
    /// Returns None when talking to the default OpenAI host without a key.
    /// Self-hosted servers set through `OPENAI_COMPATIBLE_HOST` may run
    /// without one.
    pub fn from_env(config: &Config) -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok();
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL").unwrap_or_else(|_| config.model.clone());
        let api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());

        if host.is_none() && api_key.is_none() {
            return None;
        }

        let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        Some(Self::build(&host, &model, api_key, config.timeout()))
    }

    /// Request timeout applied to every call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_transport_error(&self, e: reqwest::Error) -> UpstreamFailure {
        if e.is_timeout() {
            UpstreamFailure::Timeout(self.timeout)
        } else if e.is_decode() {
            UpstreamFailure::InvalidResponse(e.to_string())
        } else {
            UpstreamFailure::Unreachable(e.to_string())
        }
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Token accounting reported by the server
#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl LanguageModel for OpenAICompatibleBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, UpstreamFailure> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        debug!(
            model = %self.model,
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            "Sending chat completion"
        );

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(host = %self.base_url, "Chat completion rate limited");
            return Err(UpstreamFailure::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(host = %self.base_url, status = status.as_u16(), "Chat completion failed");
            return Err(UpstreamFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let tokens_used = chat_response
            .usage
            .map(|u| u.total_tokens)
            .unwrap_or_default();

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(UpstreamFailure::EmptyResponse)?;

        debug!(tokens_used, chars = text.len(), "Chat completion received");

        Ok(Completion { text, tokens_used })
    }

    async fn health_check(&self) -> bool {
        let mut req_builder = self.http_client.get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        match req_builder.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockBehavior, MockOpenAIServer};

    #[test]
    fn test_backend_new() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8080", "gpt-3.5-turbo");
        assert_eq!(backend.model(), "gpt-3.5-turbo");
        assert_eq!(backend.host(), "http://localhost:8080");
        assert_eq!(backend.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_backend_new_trims_trailing_slash() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8080/", "gpt-3.5-turbo");
        assert_eq!(backend.host(), "http://localhost:8080");
    }

    #[test]
    fn test_backend_with_api_key() {
        let backend =
            OpenAICompatibleBackend::with_api_key("http://localhost:8080", "gpt-4", "sk-test123");
        assert_eq!(backend.model(), "gpt-4");
        assert_eq!(backend.api_key, Some("sk-test123".to_string()));
    }

    #[test]
    fn test_chat_completion_request_serialization() {
        let request = ChatCompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "Be terse".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: "Hello".to_string(),
                },
            ],
            temperature: 0.2,
            max_tokens: 1500,
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello");
        let temp = json["temperature"].as_f64().unwrap();
        assert!((temp - 0.2).abs() < 0.001);
        assert_eq!(json["max_tokens"], 1500);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_chat_completion_response_deserialization() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        }"#;

        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello!"));
        assert_eq!(response.usage.unwrap().total_tokens, 12);
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let server = MockOpenAIServer::start().await;
        let backend = OpenAICompatibleBackend::with_api_key(&server.url(), "gpt-3.5-turbo", "sk-x");

        let completion = backend
            .complete(&CompletionRequest::new("You are a helpful assistant.", "Hi"))
            .await
            .unwrap();

        assert!(!completion.text.is_empty());
        assert_eq!(completion.tokens_used, 42);
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_maps_to_upstream_failure() {
        let server = MockOpenAIServer::start_with(MockBehavior::Status(429)).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");

        let err = backend
            .complete(&CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamFailure::RateLimited);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let server = MockOpenAIServer::start_with(MockBehavior::Status(500)).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");

        let err = backend
            .complete(&CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamFailure::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_response() {
        let server = MockOpenAIServer::start_with(MockBehavior::NoChoices).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");

        let err = backend
            .complete(&CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamFailure::EmptyResponse);
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server =
            MockOpenAIServer::start_with(MockBehavior::Delay(Duration::from_secs(5))).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo")
            .with_timeout(Duration::from_millis(200));

        let err = backend
            .complete(&CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamFailure::Timeout(Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let backend = OpenAICompatibleBackend::new("http://127.0.0.1:9", "gpt-3.5-turbo")
            .with_timeout(Duration::from_secs(2));

        let err = backend
            .complete(&CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpstreamFailure::Unreachable(_) | UpstreamFailure::Timeout(_)
        ));
        assert!(!backend.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_against_mock_server() {
        let server = MockOpenAIServer::start().await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");
        assert!(backend.health_check().await);
    }
}
