use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::config::Config;

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
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub registry: CheckResult,
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
// Shared state expected by the handler
// ---------------------------------------------------------------------------

/// Minimal subset of `AppState` required by the health-check handler.
#[derive(Clone)]
pub struct HealthState {
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Probe the registry's API root.  Anonymous probes are answered with 401
/// by GHCR; reachability is what matters here, so 401 counts as healthy.
async fn check_registry(client: &reqwest::Client, base_url: &str) -> CheckResult {
    let url = format!("{}/v2/", base_url.trim_end_matches('/'));
    match client.head(&url).send().await {
        Ok(resp)
            if resp.status().is_success()
                || resp.status().is_redirection()
                || resp.status() == StatusCode::UNAUTHORIZED =>
        {
            CheckResult::healthy()
        }
        Ok(resp) => CheckResult::unhealthy(format!("HEAD {} returned {}", url, resp.status())),
        Err(e) => CheckResult::unhealthy(format!("HEAD {} failed: {e}", url)),
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler.  Returns 200 when the upstream registry is
/// reachable, 503 otherwise.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let registry = check_registry(&state.http_client, &state.config.registry.url).await;

    let status = if registry.ok {
        HealthStatus::Ok
    } else {
        HealthStatus::Unhealthy
    };
    let body = HealthResponse {
        status,
        checks: HealthChecks { registry },
    };

    let http_status = match status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}
