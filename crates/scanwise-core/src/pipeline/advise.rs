//! Advice generation from a spending breakdown

use std::collections::HashMap;
use std::fmt::Write;

use thiserror::Error;
use tracing::debug;

use crate::ai::{CompletionRequest, LanguageModel, UpstreamFailure};
use crate::config::{Config, StageKind, StageSettings};
use crate::error::ErrorKind;
use crate::models::{AdviceReport, CategoryBreakdown, ParsedReceipt};
use crate::prompts::{Prompt, PromptId, PromptLibrary};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdviceError {
    #[error("language model call failed: {0}")]
    UpstreamFailure(#[from] UpstreamFailure),
}

impl AdviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
        }
    }
}

/// Plain-text spending summary sent to the advisor
///
/// ```text
/// Total Spending: $46.00
///
/// Category Breakdown:
/// - Snacks: $40.00 (87.0%)
/// - Dairy: $6.00 (13.0%)
///
/// Total Items: 2
/// ```
pub fn build_summary(receipt: &ParsedReceipt, breakdown: &CategoryBreakdown) -> String {
    let mut summary = format!("Total Spending: ${:.2}\n\nCategory Breakdown:\n", receipt.total);
    for spend in breakdown.iter() {
        let _ = writeln!(
            summary,
            "- {}: ${:.2} ({:.1}%)",
            spend.category, spend.amount, spend.percentage
        );
    }
    let _ = write!(summary, "\nTotal Items: {}", receipt.items.len());
    summary
}

/// Asks the language model for budgeting advice on one receipt
#[derive(Clone)]
pub struct AdviceGenerator<M> {
    model: M,
    prompt: Prompt,
    settings: StageSettings,
}

impl<M: LanguageModel> AdviceGenerator<M> {
    pub fn new(model: M, prompt: Prompt, settings: StageSettings) -> Self {
        Self {
            model,
            prompt,
            settings,
        }
    }

    /// Build with the `spending_advice` prompt and the configured `advise` settings
    pub fn from_library(
        model: M,
        prompts: &mut PromptLibrary,
        config: &Config,
    ) -> crate::Result<Self> {
        let prompt = prompts.get(PromptId::SpendingAdvice)?.clone();
        Ok(Self::new(model, prompt, config.settings(StageKind::Advise)))
    }

    /// Generate advice; one model call, no retry
    pub async fn advise(
        &self,
        receipt: &ParsedReceipt,
        breakdown: &CategoryBreakdown,
    ) -> Result<AdviceReport, AdviceError> {
        let summary = build_summary(receipt, breakdown);
        let store_name = receipt.store_name.as_deref().unwrap_or_default();

        let mut vars = HashMap::new();
        vars.insert("summary", summary.as_str());
        vars.insert("store_name", store_name);

        let request = CompletionRequest::new(
            self.prompt.render_system(&vars),
            self.prompt.render_user(&vars),
        )
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens);

        let completion = self.model.complete(&request).await?;
        debug!(tokens = completion.tokens_used, "Advice generated");

        Ok(AdviceReport {
            text: completion.text,
            tokens_used: completion.tokens_used,
        })
    }
}
