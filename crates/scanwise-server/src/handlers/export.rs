//! History export handlers

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Response, StatusCode},
};
use serde::Deserialize;
use tracing::info;

use crate::{get_user_id, AppError, AppState};
use scanwise_core::models::AnalysisKind;
use scanwise_core::HistoryExportOptions;

/// Query parameters for history export
#[derive(Debug, Deserialize)]
pub struct HistoryExportQuery {
    /// receipt, summary or code
    pub kind: Option<String>,
    /// Most recent N rows
    pub limit: Option<i64>,
}

/// GET /api/export/history.csv - Export the caller's history as CSV
pub async fn export_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryExportQuery>,
) -> Result<Response<Body>, AppError> {
    let user_id = get_user_id(&headers);

    let kind = params
        .kind
        .as_deref()
        .map(|k| k.parse::<AnalysisKind>())
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;

    if matches!(params.limit, Some(l) if l < 1) {
        return Err(AppError::bad_request("limit must be at least 1"));
    }

    let opts = HistoryExportOptions {
        kind,
        limit: params.limit,
    };
    let mut csv = Vec::new();
    let rows = state.db.write_history_csv(&user_id, &opts, &mut csv)?;
    info!(user = %user_id, rows, "Exported history to CSV");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"history.csv\"",
        )
        .body(Body::from(csv))
        .map_err(|e| AppError::internal(&e.to_string()))
}
