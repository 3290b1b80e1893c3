//! Source code analysis and language detection

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::{CompletionRequest, LanguageModel, UpstreamFailure};
use crate::config::{Config, StageKind, StageSettings};
use crate::error::ErrorKind;
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// Characters of code sent for language detection
pub const DETECT_SAMPLE_CHARS: usize = 500;

/// What kind of analysis to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    FullAnalysis,
    BugDetection,
    CodeReview,
    Explanation,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullAnalysis => "full_analysis",
            Self::BugDetection => "bug_detection",
            Self::CodeReview => "code_review",
            Self::Explanation => "explanation",
        }
    }

    pub fn all() -> &'static [AnalysisType] {
        &[
            Self::FullAnalysis,
            Self::BugDetection,
            Self::CodeReview,
            Self::Explanation,
        ]
    }

    /// Reviewer persona and checklist for the system prompt
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::FullAnalysis => {
                "You are an expert code analyzer. Analyze this code and provide:\n\
                 1. Language detection\n\
                 2. Purpose and functionality\n\
                 3. Key components\n\
                 4. Potential issues and bugs\n\
                 5. Best practice suggestions\n\
                 6. Security concerns (if any)\n\
                 7. Performance tips"
            }
            Self::BugDetection => {
                "You are a bug detection expert. Analyze this code and identify:\n\
                 1. Syntax errors\n\
                 2. Logic errors\n\
                 3. Potential runtime errors\n\
                 4. Edge cases not handled\n\
                 5. Suggested fixes"
            }
            Self::CodeReview => {
                "You are a senior code reviewer. Review this code for:\n\
                 1. Code quality\n\
                 2. Readability\n\
                 3. Maintainability\n\
                 4. Best practices\n\
                 5. Refactoring suggestions"
            }
            Self::Explanation => {
                "You are a coding teacher. Explain this code in simple terms:\n\
                 1. What does this code do?\n\
                 2. How does it work, step by step?\n\
                 3. Which key concepts does it use?\n\
                 4. Example use cases"
            }
        }
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "full_analysis" | "full" => Ok(Self::FullAnalysis),
            "bug_detection" | "bugs" => Ok(Self::BugDetection),
            "code_review" | "review" => Ok(Self::CodeReview),
            "explanation" | "explain" => Ok(Self::Explanation),
            _ => Err(format!("Unknown analysis type: {}", s)),
        }
    }
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodeAnalysisError {
    #[error("no code to analyze")]
    EmptyInput,

    #[error("language model call failed: {0}")]
    UpstreamFailure(#[from] UpstreamFailure),
}

impl CodeAnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAnalysis {
    pub analysis_type: AnalysisType,
    pub text: String,
    pub tokens_used: u32,
}

#[derive(Clone)]
pub struct CodeAnalyzer<M> {
    model: M,
    analyze_prompt: Prompt,
    detect_prompt: Prompt,
    analyze_settings: StageSettings,
    detect_settings: StageSettings,
}

impl<M: LanguageModel> CodeAnalyzer<M> {
    pub fn from_library(
        model: M,
        prompts: &mut PromptLibrary,
        config: &Config,
    ) -> crate::Result<Self> {
        Ok(Self {
            model,
            analyze_prompt: prompts.get(PromptId::AnalyzeCode)?.clone(),
            detect_prompt: prompts.get(PromptId::DetectLanguage)?.clone(),
            analyze_settings: config.settings(StageKind::CodeReview),
            detect_settings: config.settings(StageKind::DetectLanguage),
        })
    }

    pub async fn analyze(
        &self,
        code: &str,
        analysis_type: AnalysisType,
    ) -> Result<CodeAnalysis, CodeAnalysisError> {
        if code.trim().is_empty() {
            return Err(CodeAnalysisError::EmptyInput);
        }

        let mut vars = HashMap::new();
        vars.insert("instructions", analysis_type.instructions());
        vars.insert("code", code);

        let request = CompletionRequest::new(
            self.analyze_prompt.render_system(&vars),
            self.analyze_prompt.render_user(&vars),
        )
        .with_temperature(self.analyze_settings.temperature)
        .with_max_tokens(self.analyze_settings.max_tokens);

        let completion = self.model.complete(&request).await?;

        Ok(CodeAnalysis {
            analysis_type,
            text: completion.text,
            tokens_used: completion.tokens_used,
        })
    }

    /// Name the programming language, looking at the first 500 characters only
    pub async fn detect_language(&self, code: &str) -> Result<String, CodeAnalysisError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CodeAnalysisError::EmptyInput);
        }
        let sample: String = code.chars().take(DETECT_SAMPLE_CHARS).collect();

        let mut vars = HashMap::new();
        vars.insert("code", sample.as_str());

        let request = CompletionRequest::new(
            self.detect_prompt.render_system(&vars),
            self.detect_prompt.render_user(&vars),
        )
        .with_temperature(self.detect_settings.temperature)
        .with_max_tokens(self.detect_settings.max_tokens);

        let completion = self.model.complete(&request).await?;
        Ok(completion.text.trim().trim_end_matches('.').to_string())
    }
}
