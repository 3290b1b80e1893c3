//! Receipt analysis pipeline
//!
//! ```text
//! text ──parse──▶ ParsedReceipt ──aggregate──▶ CategoryBreakdown ──┬─detect─▶ anomalies
//!                                                                 └─advise─▶ advice
//! ```
//!
//! Each stage returns its own typed error. The orchestrator stops at the
//! first failure and reports it tagged with the stage; nothing is retried
//! and no partial report is returned.
//!
//! Runs share no mutable state, so one `ReceiptPipeline` can serve many
//! concurrent requests. Dropping the future returned by `run` cancels any
//! in-flight model call.

mod advise;
mod aggregate;
mod detect;
mod parse;

pub use advise::{build_summary, AdviceError, AdviceGenerator};
pub use aggregate::{aggregate, AggregateError};
pub use detect::{detect, DEFAULT_THRESHOLD_PCT};
pub use parse::{parse_receipt_json, strip_code_fence, ParseError, StructuredParser};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::ai::LanguageModel;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::extract::{check_extracted, ocr_language_code, ExtractError, TextExtractor};
use crate::models::{NewAnalysis, PipelineReport, Stage, TokenUsage};
use crate::prompts::PromptLibrary;

/// The failure of a single stage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Advise(#[from] AdviceError),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extract(e) => e.kind(),
            Self::Parse(e) => e.kind(),
            Self::Aggregate(e) => e.kind(),
            Self::Advise(e) => e.kind(),
        }
    }
}

/// Pipeline failure, tagged with the stage that produced it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("{0} stage failed: {1}")]
    AtStage(Stage, StageError),
}

impl PipelineError {
    fn at(stage: Stage, error: impl Into<StageError>) -> Self {
        Self::AtStage(stage, error.into())
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::AtStage(stage, _) => *stage,
        }
    }

    pub fn error(&self) -> &StageError {
        match self {
            Self::AtStage(_, error) => error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error().kind()
    }
}

/// Text that went through the pipeline plus the resulting report
#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    pub extracted_text: String,
    pub report: PipelineReport,
}

/// Durable storage for finished reports
///
/// `meta` carries the caller's elapsed-time measurement and source info.
/// Returns the id of the stored analysis.
pub trait ReportStore {
    fn save_report(
        &self,
        user_id: &str,
        meta: &NewAnalysis,
        report: &PipelineReport,
    ) -> crate::Result<i64>;
}

/// Runs parse, aggregate, detect and advise over receipt text
///
/// Not idempotent: the same text can yield a different receipt, breakdown
/// or advice on each call because the language model is non-deterministic.
#[derive(Clone)]
pub struct ReceiptPipeline<M> {
    parser: StructuredParser<M>,
    advisor: AdviceGenerator<M>,
    default_threshold_pct: f64,
}

impl<M: LanguageModel + Clone> ReceiptPipeline<M> {
    pub fn new(
        parser: StructuredParser<M>,
        advisor: AdviceGenerator<M>,
        default_threshold_pct: f64,
    ) -> Self {
        Self {
            parser,
            advisor,
            default_threshold_pct,
        }
    }

    /// Build every stage from the prompt library and config
    pub fn from_library(
        model: M,
        prompts: &mut PromptLibrary,
        config: &Config,
    ) -> crate::Result<Self> {
        let parser = StructuredParser::from_library(model.clone(), prompts, config)?;
        let advisor = AdviceGenerator::from_library(model, prompts, config)?;
        Ok(Self::new(parser, advisor, config.threshold_pct))
    }

    /// Build with embedded prompts and default config
    pub fn with_defaults(model: M) -> crate::Result<Self> {
        Self::from_library(model, &mut PromptLibrary::embedded_only(), &Config::default())
    }

    pub fn default_threshold_pct(&self) -> f64 {
        self.default_threshold_pct
    }

    /// Analyze receipt text
    #[instrument(skip(self, receipt_text), fields(chars = receipt_text.len()))]
    pub async fn run(
        &self,
        receipt_text: &str,
        threshold_pct: f64,
    ) -> Result<PipelineReport, PipelineError> {
        let (receipt, parse_tokens) = self
            .parser
            .parse_with_usage(receipt_text)
            .await
            .map_err(|e| PipelineError::at(Stage::Parse, e))?;
        debug!(items = receipt.items.len(), total = receipt.total, "Receipt parsed");

        let breakdown = aggregate(&receipt).map_err(|e| PipelineError::at(Stage::Aggregate, e))?;

        let anomalies = detect(&breakdown, threshold_pct);

        let advice = self
            .advisor
            .advise(&receipt, &breakdown)
            .await
            .map_err(|e| PipelineError::at(Stage::Advise, e))?;

        info!(
            categories = breakdown.len(),
            anomalies = anomalies.len(),
            tokens = parse_tokens + advice.tokens_used,
            "Receipt analyzed"
        );

        let usage = TokenUsage {
            parse: parse_tokens,
            advice: advice.tokens_used,
        };

        Ok(PipelineReport {
            receipt,
            breakdown,
            anomalies,
            advice,
            usage,
        })
    }

    /// Analyze receipt text with the configured anomaly threshold
    pub async fn run_with_default_threshold(
        &self,
        receipt_text: &str,
    ) -> Result<PipelineReport, PipelineError> {
        self.run(receipt_text, self.default_threshold_pct).await
    }

    /// Extract text from an uploaded file, then analyze it
    #[instrument(skip(self, extractor, bytes), fields(bytes = bytes.len()))]
    pub async fn analyze_document<E: TextExtractor + ?Sized>(
        &self,
        extractor: &E,
        bytes: &[u8],
        language_hint: &str,
        threshold_pct: f64,
    ) -> Result<DocumentAnalysis, PipelineError> {
        debug!(ocr_language = ocr_language_code(language_hint), "Extracting text");
        let text = extractor
            .extract(bytes, language_hint)
            .await
            .and_then(check_extracted)
            .map_err(|e| PipelineError::at(Stage::Extract, e))?;

        let report = self.run(&text, threshold_pct).await?;
        Ok(DocumentAnalysis {
            extracted_text: text,
            report,
        })
    }

    /// `analyze_document` with the configured anomaly threshold
    pub async fn analyze_document_with_default_threshold<E: TextExtractor + ?Sized>(
        &self,
        extractor: &E,
        bytes: &[u8],
        language_hint: &str,
    ) -> Result<DocumentAnalysis, PipelineError> {
        self.analyze_document(extractor, bytes, language_hint, self.default_threshold_pct)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Completion, MockBackend, UpstreamFailure};
    use crate::extract::PlainTextExtractor;
    use crate::models::{Category, LineItem, ParsedReceipt};

    fn pipeline(mock: &MockBackend) -> ReceiptPipeline<MockBackend> {
        ReceiptPipeline::with_defaults(mock.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_worked_example() {
        let mock = MockBackend::new();
        let report = pipeline(&mock)
            .run("MILK 2 @ 3.00\nCHIPS 40.00\nTOTAL 46.00", 30.0)
            .await
            .unwrap();

        let snacks = report.breakdown.get(Category::Snacks).unwrap();
        assert!((snacks.amount - 40.0).abs() < 1e-9);
        assert!((snacks.percentage - 86.96).abs() < 0.01);
        let dairy = report.breakdown.get(Category::Dairy).unwrap();
        assert!((dairy.amount - 6.0).abs() < 1e-9);
        assert!((dairy.percentage - 13.04).abs() < 0.01);
        assert_eq!(report.breakdown.categories[0].category, Category::Snacks);

        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].category, Category::Snacks);
        assert!((report.anomalies[0].percentage - 86.96).abs() < 0.01);

        assert!(!report.advice.text.is_empty());
        assert_eq!(report.usage, TokenUsage { parse: 120, advice: 60 });
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_short_circuits() {
        let mock = MockBackend::scripted(vec![Ok(Completion::new("not json at all", 10))]);
        let err = pipeline(&mock).run("MILK 3.00", 30.0).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Parse);
        assert_eq!(err.kind(), ErrorKind::MalformedJson);
        // advice was never requested
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_short_circuits() {
        let mock = MockBackend::scripted(vec![Err(UpstreamFailure::Timeout(
            std::time::Duration::from_secs(60),
        ))]);
        let err = pipeline(&mock).run("MILK 3.00", 30.0).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Parse);
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_never_calls_model() {
        let mock = MockBackend::new();
        let err = pipeline(&mock).run("   ", 30.0).await.unwrap_err();

        assert_eq!(err, PipelineError::AtStage(Stage::Parse, StageError::Parse(ParseError::EmptyInput)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_total_fails_at_aggregate() {
        let mock = MockBackend::scripted(vec![Ok(Completion::new(
            r#"{"items": [{"name": "Free sample", "quantity": 1, "price": 0, "category": "Snacks"}], "total": 0}"#,
            15,
        ))]);
        let err = pipeline(&mock).run("FREE SAMPLE 0.00", 30.0).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Aggregate);
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_advice_failure_discards_report() {
        let mock = MockBackend::new();
        mock.push(Ok(Completion::new(crate::ai::MOCK_RECEIPT_JSON, 100)));
        mock.push(Err(UpstreamFailure::RateLimited));

        let err = pipeline(&mock).run("receipt", 30.0).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Advise);
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert_eq!(err.to_string(), "advise stage failed: language model call failed: rate limited by the service");
    }

    #[tokio::test]
    async fn test_threshold_monotonicity() {
        let mock = MockBackend::new();
        let pipeline = pipeline(&mock);
        let report = pipeline.run("receipt", 0.0).await.unwrap();

        let mut previous = usize::MAX;
        for threshold in [0.0, 10.0, 13.0, 50.0, 86.0, 87.0, 100.0] {
            let count = detect(&report.breakdown, threshold).len();
            assert!(count <= previous);
            previous = count;
        }
        assert_eq!(report.anomalies.len(), 2);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let receipt = ParsedReceipt {
            store_name: None,
            date: None,
            items: vec![
                LineItem::new("A", 1.0, 5.0, Category::Fruits),
                LineItem::new("B", 1.0, 5.0, Category::Vegetables),
                LineItem::new("C", 1.0, 5.0, Category::Meat),
            ],
            subtotal: None,
            tax: None,
            total: 15.0,
        };

        let first = aggregate(&receipt).unwrap();
        for _ in 0..10 {
            assert_eq!(aggregate(&receipt).unwrap(), first);
        }
        assert!((first.percentage_sum() - 100.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_default_threshold_from_config() {
        let mock = MockBackend::new();
        let mut config = Config::default();
        config.threshold_pct = 90.0;
        let pipeline =
            ReceiptPipeline::from_library(mock.clone(), &mut PromptLibrary::embedded_only(), &config)
                .unwrap();

        let report = pipeline.run_with_default_threshold("receipt").await.unwrap();
        assert!(report.anomalies.is_empty());
        assert!((pipeline.default_threshold_pct() - 90.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_analyze_document() {
        let mock = MockBackend::new();
        let pipeline = pipeline(&mock);

        let analysis = pipeline
            .analyze_document_with_default_threshold(&PlainTextExtractor, b"MILK 3.00\nCHIPS 40.00", "English")
            .await
            .unwrap();
        assert_eq!(analysis.extracted_text, "MILK 3.00\nCHIPS 40.00");
        assert_eq!(analysis.report.anomalies.len(), 1);

        let err = pipeline
            .analyze_document(&PlainTextExtractor, b"ERROR: OCR service timed out", "English", 30.0)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Extract);
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_analyze_document_uses_given_threshold() {
        let mock = MockBackend::new();
        let pipeline = pipeline(&mock);
        let bytes = b"MILK 2 @ 3.00\nCHIPS 40.00\nTOTAL 46.00";

        let low = pipeline.analyze_document(&PlainTextExtractor, bytes, "German", 10.0).await.unwrap();
        assert_eq!(low.report.anomalies.len(), 2);

        let high = pipeline.analyze_document(&PlainTextExtractor, bytes, "German", 90.0).await.unwrap();
        assert!(high.report.anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_blank_document_fails_at_extract() {
        let mock = MockBackend::new();
        let err = pipeline(&mock)
            .analyze_document(&PlainTextExtractor, b"  \n ", "English", 30.0)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Extract);
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_overflowing_items_never_reach_advice() {
        let mock = MockBackend::scripted(vec![Ok(Completion::new(
            r#"{"items": [{"name": "Yacht", "quantity": 1e200, "price": 1e200}], "total": 10}"#,
            20,
        ))]);
        let err = pipeline(&mock).run("YACHT", 30.0).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Parse);
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert_eq!(mock.call_count(), 1);
    }
}
