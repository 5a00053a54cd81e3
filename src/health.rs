use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::auth::AuthCache;
use crate::forge::ForgeBackend;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub cache: CheckResult,
    pub upstream: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

async fn check_cache(cache: &dyn AuthCache) -> CheckResult {
    match cache.ping().await {
        Ok(()) => CheckResult::healthy(),
        Err(e) => CheckResult::unhealthy(format!("cache ping failed: {e}")),
    }
}

async fn check_upstream(forge: &dyn ForgeBackend) -> CheckResult {
    match forge.check_reachable().await {
        Ok(status) if status.is_success() || status.is_redirection() => CheckResult::healthy(),
        Ok(status) => CheckResult::unhealthy(format!("upstream returned {status}")),
        Err(e) => CheckResult::unhealthy(format!("{e:#}")),
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

/// The cache is required for operation; an unreachable upstream only
/// degrades the service since cached verifications still succeed.
fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    if !checks.cache.ok {
        HealthStatus::Unhealthy
    } else if !checks.upstream.ok {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

/// Run all checks.  Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_check(
    cache: Arc<dyn AuthCache>,
    forge: Arc<dyn ForgeBackend>,
) -> impl IntoResponse {
    let (cache, upstream) = tokio::join!(check_cache(cache.as_ref()), check_upstream(forge.as_ref()));

    let checks = HealthChecks { cache, upstream };
    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}
