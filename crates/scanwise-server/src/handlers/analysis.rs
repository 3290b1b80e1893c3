//! Model-backed analysis handlers: receipts, summaries and code review

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{get_user_id, AppError, AppState};
use scanwise_core::extract::check_extracted;
use scanwise_core::models::{AnalysisKind, NewAnalysis, PipelineReport, Stage, StoredReport};
use scanwise_core::{
    content_hash, AnalysisType, CodeAnalysis, ErrorKind, ReportStore, SummaryLength,
    SummaryReport,
};

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "English".to_string()
}

/// Request body for receipt analysis
#[derive(Debug, Deserialize)]
pub struct AnalyzeReceiptRequest {
    /// OCR text of the receipt
    pub text: String,
    /// Anomaly threshold in percent (defaults to the configured value)
    pub threshold_pct: Option<f64>,
    pub source_name: Option<String>,
    /// Store the report in history (default: true)
    #[serde(default = "default_true")]
    pub save: bool,
}

/// Response for receipt analysis
#[derive(Debug, Serialize)]
pub struct AnalyzeReceiptResponse {
    /// History id, when saved
    pub id: Option<i64>,
    /// Earlier analysis of the same text, if any
    pub previous_id: Option<i64>,
    pub threshold_pct: f64,
    pub processing_ms: i64,
    pub report: PipelineReport,
}

/// POST /api/receipts/analyze - Run the receipt pipeline over OCR text
pub async fn analyze_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AnalyzeReceiptRequest>,
) -> Result<Json<AnalyzeReceiptResponse>, AppError> {
    let user_id = get_user_id(&headers);
    let ai = state.ai()?;

    let threshold_pct = match req.threshold_pct {
        Some(t) if !t.is_finite() || t < 0.0 => {
            return Err(AppError::bad_request(
                "threshold_pct must be a non-negative number",
            ));
        }
        Some(t) => t,
        None => ai.pipeline.default_threshold_pct(),
    };

    if req.text.trim().is_empty() {
        return Err(AppError::from_kind(ErrorKind::EmptyInput, "blank receipt text"));
    }
    let text = check_extracted(req.text)
        .map_err(|e| AppError::from_kind(e.kind(), &e).at_stage(Stage::Extract))?;

    let previous_id = state
        .db
        .find_by_hash(&user_id, &content_hash(&text))?
        .map(|a| a.id);

    let started = Instant::now();
    let report = ai
        .pipeline
        .run(&text, threshold_pct)
        .await
        .map_err(|e| AppError::pipeline(&e))?;
    let processing_ms = started.elapsed().as_millis() as i64;

    let id = if req.save {
        let meta = NewAnalysis {
            kind: AnalysisKind::Receipt,
            source_name: req.source_name,
            extracted_text: text,
            output_text: None,
            options: Some(format!("threshold={}", threshold_pct)),
            tokens_used: report.usage.total(),
            processing_ms,
        };
        Some(state.db.save_report(&user_id, &meta, &report)?)
    } else {
        None
    };

    info!(
        user = %user_id,
        anomalies = report.anomalies.len(),
        tokens = report.usage.total(),
        saved = id.is_some(),
        "Receipt analyzed"
    );

    Ok(Json(AnalyzeReceiptResponse {
        id,
        previous_id,
        threshold_pct,
        processing_ms,
        report,
    }))
}

/// GET /api/receipts/:id - Get a stored receipt report
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<StoredReport>, AppError> {
    let user_id = get_user_id(&headers);

    let stored = state
        .db
        .get_receipt_report(id, &user_id)?
        .ok_or_else(|| AppError::not_found("Receipt report not found"))?;

    Ok(Json(stored))
}

/// Request body for text summaries
#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub text: String,
    /// short, medium or detailed (default: medium)
    pub length: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    pub source_name: Option<String>,
    #[serde(default = "default_true")]
    pub save: bool,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub id: Option<i64>,
    pub summary: SummaryReport,
}

/// POST /api/summaries - Summarize a text document
pub async fn create_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, AppError> {
    let user_id = get_user_id(&headers);
    let ai = state.ai()?;

    let length = match req.length.as_deref() {
        Some(l) => l
            .parse::<SummaryLength>()
            .map_err(|e| AppError::bad_request(&e))?,
        None => SummaryLength::default(),
    };

    let started = Instant::now();
    let summary = ai
        .summarizer
        .summarize(&req.text, length, &req.language)
        .await
        .map_err(|e| AppError::from_kind(e.kind(), &e))?;

    let id = if req.save {
        Some(state.db.save_analysis(
            &user_id,
            &NewAnalysis {
                kind: AnalysisKind::Summary,
                source_name: req.source_name,
                extracted_text: req.text,
                output_text: Some(summary.text.clone()),
                options: Some(format!("{}/{}", summary.length, summary.language)),
                tokens_used: summary.tokens_used,
                processing_ms: started.elapsed().as_millis() as i64,
            },
        )?)
    } else {
        None
    };

    Ok(Json(SummaryResponse { id, summary }))
}

/// Request body for code analysis
#[derive(Debug, Deserialize)]
pub struct CodeAnalysisRequest {
    pub code: String,
    /// Analysis type name or alias (default: full_analysis)
    pub analysis_type: Option<String>,
    /// Ask the model to name the language first
    #[serde(default)]
    pub detect_language: bool,
    pub source_name: Option<String>,
    #[serde(default = "default_true")]
    pub save: bool,
}

#[derive(Debug, Serialize)]
pub struct CodeAnalysisResponse {
    pub id: Option<i64>,
    pub language: Option<String>,
    pub analysis: CodeAnalysis,
}

/// POST /api/code/analyze - Review source code
pub async fn analyze_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CodeAnalysisRequest>,
) -> Result<Json<CodeAnalysisResponse>, AppError> {
    let user_id = get_user_id(&headers);
    let ai = state.ai()?;

    let analysis_type = match req.analysis_type.as_deref() {
        Some(t) => t
            .parse::<AnalysisType>()
            .map_err(|e| AppError::bad_request(&e))?,
        None => AnalysisType::default(),
    };

    let started = Instant::now();
    let language = if req.detect_language {
        Some(
            ai.analyzer
                .detect_language(&req.code)
                .await
                .map_err(|e| AppError::from_kind(e.kind(), &e))?,
        )
    } else {
        None
    };

    let analysis = ai
        .analyzer
        .analyze(&req.code, analysis_type)
        .await
        .map_err(|e| AppError::from_kind(e.kind(), &e))?;

    let id = if req.save {
        let options = match &language {
            Some(lang) => format!("{}/{}", analysis.analysis_type, lang),
            None => analysis.analysis_type.to_string(),
        };
        Some(state.db.save_analysis(
            &user_id,
            &NewAnalysis {
                kind: AnalysisKind::Code,
                source_name: req.source_name,
                extracted_text: req.code,
                output_text: Some(analysis.text.clone()),
                options: Some(options),
                tokens_used: analysis.tokens_used,
                processing_ms: started.elapsed().as_millis() as i64,
            },
        )?)
    } else {
        None
    };

    Ok(Json(CodeAnalysisResponse {
        id,
        language,
        analysis,
    }))
}
