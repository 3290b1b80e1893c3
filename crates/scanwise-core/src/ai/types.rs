//! Shared types for language model backends

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single chat completion request
///
/// Every call in Scanwise is one system prompt plus one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.2,
            max_tokens: 1000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Text returned by the model plus the tokens it reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u32,
}

impl Completion {
    pub fn new(text: impl Into<String>, tokens_used: u32) -> Self {
        Self {
            text: text.into(),
            tokens_used,
        }
    }
}

/// Why a model call failed
///
/// The pipeline never retries; these surface to the caller as
/// `ErrorKind::UpstreamFailure`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("rate limited by the service")]
    RateLimited,

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned no content")]
    EmptyResponse,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Backend description for status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub backend: String,
    pub host: String,
    pub model: String,
}
