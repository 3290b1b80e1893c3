//! Document summarization

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::{CompletionRequest, LanguageModel, UpstreamFailure};
use crate::config::{Config, StageKind, StageSettings};
use crate::error::ErrorKind;
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// How long the summary should be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Detailed,
}

impl SummaryLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "Short",
            Self::Medium => "Medium",
            Self::Detailed => "Detailed",
        }
    }

    /// Instruction appended to the system prompt
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::Short => "Provide a brief 2-3 sentence summary of the key points.",
            Self::Medium => {
                "Provide a comprehensive summary in 1-2 paragraphs covering the main ideas."
            }
            Self::Detailed => {
                "Provide a detailed summary with all important points, organized in clear sections."
            }
        }
    }
}

impl FromStr for SummaryLength {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "detailed" | "long" => Ok(Self::Detailed),
            _ => Err(format!(
                "Unknown summary length: {} (expected short, medium or detailed)",
                s
            )),
        }
    }
}

impl std::fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummaryError {
    #[error("text to summarize is empty")]
    EmptyInput,

    #[error("language model call failed: {0}")]
    UpstreamFailure(#[from] UpstreamFailure),
}

impl SummaryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub text: String,
    pub length: SummaryLength,
    pub language: String,
    pub tokens_used: u32,
}

/// Summarizes extracted document text
#[derive(Clone)]
pub struct Summarizer<M> {
    model: M,
    prompt: Prompt,
    settings: StageSettings,
}

impl<M: LanguageModel> Summarizer<M> {
    pub fn new(model: M, prompt: Prompt, settings: StageSettings) -> Self {
        Self {
            model,
            prompt,
            settings,
        }
    }

    pub fn from_library(
        model: M,
        prompts: &mut PromptLibrary,
        config: &Config,
    ) -> crate::Result<Self> {
        let prompt = prompts.get(PromptId::SummarizeText)?.clone();
        Ok(Self::new(model, prompt, config.settings(StageKind::Summarize)))
    }

    /// Summarize `text` in `language` (a language name such as "English")
    pub async fn summarize(
        &self,
        text: &str,
        length: SummaryLength,
        language: &str,
    ) -> Result<SummaryReport, SummaryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SummaryError::EmptyInput);
        }
        let language = match language.trim() {
            "" => "English",
            l => l,
        };

        let mut vars = HashMap::new();
        vars.insert("length_instruction", length.instructions());
        vars.insert("language", language);
        vars.insert("text", text);

        let request = CompletionRequest::new(
            self.prompt.render_system(&vars),
            self.prompt.render_user(&vars),
        )
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens);

        let completion = self.model.complete(&request).await?;
        tracing::debug!(length = %length, language, tokens = completion.tokens_used, "Summary generated");

        Ok(SummaryReport {
            text: completion.text,
            length,
            language: language.to_string(),
            tokens_used: completion.tokens_used,
        })
    }
}
