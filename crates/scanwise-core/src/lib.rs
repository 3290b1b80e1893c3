//! Scanwise Core Library
//!
//! Shared functionality for the Scanwise document assistant:
//! - Receipt pipeline: parse, aggregate, detect anomalies, advise
//! - Pluggable language model backends (OpenAI-compatible, mock)
//! - Document summarization and code analysis
//! - Prompt library with user overrides
//! - Encrypted analysis history with search and analytics

pub mod ai;
pub mod code_review;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod summarize;

/// Test utilities including a mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AIClient, BackendInfo, Completion, CompletionRequest, LanguageModel, MockBackend,
    OpenAICompatibleBackend, UpstreamFailure,
};
pub use code_review::{AnalysisType, CodeAnalysis, CodeAnalysisError, CodeAnalyzer};
pub use config::{Config, StageKind, StageSettings};
pub use db::{content_hash, Database};
pub use error::{Error, ErrorKind, Result};
pub use export::HistoryExportOptions;
pub use extract::{ocr_language_code, ExtractError, PlainTextExtractor, TextExtractor};
pub use pipeline::{
    DocumentAnalysis, PipelineError, ReceiptPipeline, ReportStore, StageError,
    DEFAULT_THRESHOLD_PCT,
};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use summarize::{SummaryError, SummaryLength, SummaryReport, Summarizer};
