//! History handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{get_user_id, AppError, AppState, SuccessResponse, MAX_PAGE_LIMIT};
use scanwise_core::models::{Analysis, AnalysisKind, PipelineReport};

/// Query parameters for listing history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum entries to return (default 50, capped)
    pub limit: Option<i64>,
    /// Search term matched against input, output and source name
    pub q: Option<String>,
}

/// GET /api/history - List or search past analyses, newest first
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<Analysis>>, AppError> {
    let user_id = get_user_id(&headers);
    let limit = params.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT);

    let entries = match params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(term) => state.db.search_history(&user_id, term, limit)?,
        None => state.db.list_history(&user_id, limit)?,
    };

    Ok(Json(entries))
}

/// A history entry with its receipt report, when it has one
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub report: Option<PipelineReport>,
}

/// GET /api/history/:id - Get a single analysis
pub async fn get_history_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<HistoryEntry>, AppError> {
    let user_id = get_user_id(&headers);

    let analysis = state
        .db
        .get_analysis(id, &user_id)?
        .ok_or_else(|| AppError::not_found("Analysis not found"))?;

    let report = if analysis.kind == AnalysisKind::Receipt {
        state
            .db
            .get_receipt_report(id, &user_id)?
            .map(|stored| stored.report)
    } else {
        None
    };

    Ok(Json(HistoryEntry { analysis, report }))
}

/// DELETE /api/history/:id - Delete an analysis and its report
pub async fn delete_history_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers);

    if !state.db.delete_analysis(id, &user_id)? {
        return Err(AppError::not_found("Analysis not found"));
    }
    info!(user = %user_id, id, "Analysis deleted");

    Ok(Json(SuccessResponse { success: true }))
}
