//! Scanwise Web Server
//!
//! Axum-based REST API over the receipt pipeline, the summarizer and the
//! code analyzer, plus history, statistics and CSV export.
//!
//! Security features:
//! - Bearer API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Input validation (pagination limits, body size limits)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use scanwise_core::models::Stage;
use scanwise_core::{
    AIClient, CodeAnalyzer, Config, Database, ErrorKind, LanguageModel, PipelineError,
    PromptLibrary, ReceiptPipeline, Summarizer,
};

mod handlers;

/// Maximum request body size (2 MB of text)
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Header carrying the caller identity, set by a fronting auth proxy
const USER_HEADER: &str = "x-authenticated-user";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Identity used when no proxy header is present
const LOCAL_USER: &str = "local-dev";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Model-backed services, present only when a backend is configured
pub struct AiServices {
    pub client: AIClient,
    pub pipeline: ReceiptPipeline<AIClient>,
    pub summarizer: Summarizer<AIClient>,
    pub analyzer: CodeAnalyzer<AIClient>,
}

impl AiServices {
    /// Build every service from the prompt library and pipeline config
    pub fn new(client: AIClient, config: &Config) -> scanwise_core::Result<Self> {
        let mut prompts = PromptLibrary::new();
        Ok(Self {
            pipeline: ReceiptPipeline::from_library(client.clone(), &mut prompts, config)?,
            summarizer: Summarizer::from_library(client.clone(), &mut prompts, config)?,
            analyzer: CodeAnalyzer::from_library(client.clone(), &mut prompts, config)?,
            client,
        })
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub ai: Option<AiServices>,
}

impl AppState {
    /// Model-backed services, or 503 when no backend is configured
    pub fn ai(&self) -> Result<&AiServices, AppError> {
        self.ai.as_ref().ok_or_else(AppError::ai_unavailable)
    }
}

/// Authentication middleware - validates bearer API keys
///
/// API keys are compared in constant time to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key.trim(), &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(
            user = %get_user_id(request.headers()),
            path = %request.uri().path(),
            "Authenticated via API key"
        );
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    let mut matched = false;
    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // ct_eq is only constant-time for equal lengths
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            matched = true;
        }
    }
    matched
}

/// Caller identity for scoping history and stats
///
/// Returns the proxy-supplied user, or "local-dev" when absent.
pub fn get_user_id(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(LOCAL_USER)
        .to_string()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
///
/// Loads the pipeline config and model backend from the environment.
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    let pipeline_config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load pipeline config, using defaults");
            Config::default()
        }
    };

    let ai = AIClient::from_env(&pipeline_config);
    match ai {
        Some(ref client) => info!(
            "Model backend configured: {} (model: {})",
            client.host(),
            client.model()
        ),
        None => info!("ℹ️  Model backend not configured (set OPENAI_API_KEY or OPENAI_COMPATIBLE_HOST)"),
    }

    create_router_with_ai(db, config, ai, &pipeline_config)
}

/// Create the application router with an explicit model backend (for testing)
pub fn create_router_with_ai(
    db: Database,
    config: ServerConfig,
    ai: Option<AIClient>,
    pipeline_config: &Config,
) -> Router {
    let ai = ai.and_then(|client| match AiServices::new(client, pipeline_config) {
        Ok(services) => Some(services),
        Err(e) => {
            error!(error = %e, "Failed to load prompts, model features disabled");
            None
        }
    });

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        ai,
    });

    let protected_routes = Router::new()
        // Receipts
        .route("/receipts/analyze", post(handlers::analyze_receipt))
        .route("/receipts/:id", get(handlers::get_receipt))
        // Other analyses
        .route("/summaries", post(handlers::create_summary))
        .route("/code/analyze", post(handlers::analyze_code))
        // History
        .route("/history", get(handlers::list_history))
        .route(
            "/history/:id",
            get(handlers::get_history_entry).delete(handlers::delete_history_entry),
        )
        // Statistics
        .route("/stats", get(handlers::get_stats))
        .route("/stats/system", get(handlers::get_system_stats))
        .route("/analytics/categories", get(handlers::get_category_spending))
        // Export
        .route("/export/history.csv", get(handlers::export_history))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes);

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
}

/// Start the server with default configuration
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(db, host, port, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!("⚠️  No API keys configured - every protected request will be rejected");
    }

    check_ai_connection().await;

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log model backend connection status
async fn check_ai_connection() {
    let config = Config::load().unwrap_or_default();
    match AIClient::from_env(&config) {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ Model backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  Model backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("ℹ️  Model backend not configured (set OPENAI_API_KEY or OPENAI_COMPATIBLE_HOST)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    kind: Option<ErrorKind>,
    stage: Option<Stage>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            kind: None,
            stage: None,
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn ai_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Model backend not configured",
        )
    }

    /// Map a stage failure kind to a status code and user-facing message
    ///
    /// Upstream failures are 502; everything else is a problem with the
    /// submitted content and is 422.
    pub fn from_kind(kind: ErrorKind, detail: impl std::fmt::Display) -> Self {
        let status = match kind {
            ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::EmptyInput
            | ErrorKind::MalformedJson
            | ErrorKind::SchemaMismatch
            | ErrorKind::InsufficientData
            | ErrorKind::ExtractionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        };
        warn!(kind = %kind, detail = %detail, "Analysis failed");
        Self {
            status,
            message: kind.user_message().to_string(),
            kind: Some(kind),
            stage: None,
            internal: None,
        }
    }

    /// Tag the error with the pipeline stage that failed
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn pipeline(err: &PipelineError) -> Self {
        Self::from_kind(err.kind(), err).at_stage(err.stage())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let mut body = serde_json::json!({ "error": self.message });
        if let Some(kind) = self.kind {
            body["kind"] = serde_json::json!(kind);
        }
        if let Some(stage) = self.stage {
            body["stage"] = serde_json::json!(stage);
        }

        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            kind: None,
            stage: None,
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
