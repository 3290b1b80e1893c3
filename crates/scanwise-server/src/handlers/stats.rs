//! Health, statistics and spending analytics handlers

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::{get_user_id, AppError, AppState};
use scanwise_core::models::{CategoryTotal, SystemStats, UsageStats};
use scanwise_core::BackendInfo;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    /// Configured model backend, if any
    pub ai: Option<BackendInfo>,
}

/// GET /api/health - Liveness check (no auth)
///
/// Reports configuration only; it does not call the model backend.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.db.conn().is_ok();
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        ai: state.ai.as_ref().map(|services| services.client.info()),
    })
}

/// GET /api/stats - Usage statistics for the caller
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UsageStats>, AppError> {
    let user_id = get_user_id(&headers);
    Ok(Json(state.db.get_user_stats(&user_id)?))
}

/// GET /api/stats/system - Usage statistics across all users
pub async fn get_system_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemStats>, AppError> {
    Ok(Json(state.db.get_system_stats()?))
}

/// GET /api/analytics/categories - Spending per category over all saved receipts
pub async fn get_category_spending(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<CategoryTotal>>, AppError> {
    let user_id = get_user_id(&headers);
    Ok(Json(state.db.get_category_spending(&user_id)?))
}
