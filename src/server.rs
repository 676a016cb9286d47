//! JSON HTTP API.
//!
//! Exposes the analysis pipeline and the popularity report over HTTP. One
//! [`Analyzer`] is shared by every request.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/analyze` | Analyze a repository (served from cache when possible) |
//! | `GET`  | `/api/stats` | Total analyses and the most-accessed repositories |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /api/analyze` takes `{"repo_url": "...", "requested_by": "..."}`;
//! the requester may also be given in the `X-User` header.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_url", "message": "invalid repository url: ..." } }
//! ```
//!
//! Error codes: `invalid_url` (400), `bad_request` (400), `not_found` (404),
//! `forbidden` (403), `upstream_unavailable` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::analyze::{AnalysisOutcome, Analyzer};
use crate::config::Config;
use crate::error::Error;
use crate::stats::{popularity_report, PopularityReport};

/// Header carrying the requesting user when the body has none.
pub const USER_HEADER: &str = "x-user";

#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
    popular_limit: i64,
}

/// Build the router. Split out from [`run_server`] so tests can drive it
/// without binding a socket.
pub fn router(analyzer: Arc<Analyzer>, popular_limit: i64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analyze", post(handle_analyze))
        .route("/api/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState {
            analyzer,
            popular_limit,
        })
}

/// Start the server on `[server].bind` and run until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let analyzer = Arc::new(Analyzer::from_config(config).await?);
    let app = router(analyzer, config.report.popular_limit);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "repo-trust server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON body of every error response: `{"error": {"code", "message"}}`.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// The `error` object inside an [`ErrorBody`].
#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"invalid_url"`, `"not_found"`).
    code: String,
    /// Human-readable description of what went wrong.
    message: String,
}

/// Handler error carrying its HTTP status and contract code.
///
/// Domain errors convert through `From<Error>`; extractor rejections use
/// [`bad_request`].
struct AppError {
    /// HTTP status code for the response.
    status: StatusCode,
    /// Value of `error.code` in the body.
    code: &'static str,
    /// Value of `error.message` in the body.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
            Error::RepositoryNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::RepositoryInaccessible(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Error::SourceUnavailable(_) => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            Error::DuplicateEntry(_) | Error::AnalysisFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/analyze ============

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    repo_url: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
}

/// Requester from the body, else the `X-User` header, else empty (the
/// analyzer substitutes its anonymous default).
fn requester(body: &AnalyzeRequest, headers: &HeaderMap) -> String {
    body.requested_by
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get(USER_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("")
        .to_string()
}

async fn handle_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisOutcome>, AppError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let repo_url = body
        .repo_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("repo_url is required"))?
        .to_string();

    let user = requester(&body, &headers);
    let outcome = state.analyzer.analyze(&repo_url, &user).await?;
    Ok(Json(outcome))
}

// ============ GET /api/stats ============

#[derive(Debug, Deserialize)]
struct StatsQuery {
    #[serde(default)]
    limit: Option<i64>,
}

async fn handle_stats(
    State(state): State<AppState>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Json<PopularityReport>, AppError> {
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;

    let limit = query.limit.unwrap_or(state.popular_limit);
    if limit < 1 {
        return Err(bad_request("limit must be >= 1"));
    }

    let report = popularity_report(state.analyzer.cache().as_ref(), limit).await?;
    Ok(Json(report))
}
