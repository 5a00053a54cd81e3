//! Main axum router and HTTP request handlers.
//!
//! Routes:
//! - `GET /verify/{owner}/{repo}/{commit}` - Verify the bearer token for a commit
//! - `GET /healthz`                        - Health check
//! - `GET /metrics`                        - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument, warn};

use crate::forge::validate_path_segment;
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/verify/{owner}/{repo}/{commit}", get(handle_verify))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub authenticated: bool,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

/// `GET /verify/{owner}/{repo}/{commit}`
///
/// Path parameters arrive percent-decoded; any that would not stay a single
/// upstream path segment is refused with 400 before the verifier runs.
/// A missing or non-bearer `Authorization` header is verified as an empty
/// token, which the verifier rejects without contacting the forge.
#[instrument(skip(state, headers), fields(%owner, %repo, %commit))]
async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Path((owner, repo, commit)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<VerifyResponse>, AppError> {
    for (field, value) in [("owner", &owner), ("repo", &repo), ("commit", &commit)] {
        validate_path_segment(field, value).map_err(|e| {
            warn!(error = %e, "refusing path parameter");
            AppError::BadRequest(e.to_string())
        })?;
    }

    let token = extract_bearer_token(&headers);

    let verified = state
        .verifier
        .verify(token, &owner, &repo, &commit)
        .await
        .map_err(|e| {
            warn!(error = %e, "token verification failed");
            AppError::Unauthorized(e.to_string())
        })?;

    Ok(Json(VerifyResponse {
        authenticated: true,
        cached: verified.is_cached(),
        upstream_status: verified.upstream_status().map(|s| s.as_u16()),
    }))
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    crate::health::health_check(Arc::clone(&state.cache), Arc::clone(&state.forge)).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the service.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let buf = state
        .metrics
        .encode()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Extract the token from `Authorization: Bearer <token>`, or `""` when the
/// header is absent, unreadable or uses another scheme.
fn extract_bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The request cannot be turned into an upstream probe.
    BadRequest(String),
    /// The caller is not authenticated for the requested resource.
    Unauthorized(String),
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer realm=\"coveritup\"")],
                msg,
            )
                .into_response(),
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {err:#}"),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
