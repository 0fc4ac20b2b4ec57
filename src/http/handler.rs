//! Main axum router and HTTP request handlers for the channel forwarder.
//!
//! Routes:
//! - `GET /{channel}/{subdir}/{artifact}` - resolve an artifact and relay
//!   the registry's blob redirect
//! - `GET /healthz`                       - health check
//! - `GET /metrics`                       - Prometheus metrics

use std::sync::Arc;

use anyhow::Context as _;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, error, info, instrument, warn};

use crate::artifact::{self, ArtifactError};
use crate::metrics::{Outcome, RelayLabels};
use crate::registry::{BlobRedirect, RegistryError};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        // Channel download endpoint
        .route("/{channel}/{subdir}/{artifact}", get(handle_download))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /{channel}/{subdir}/{artifact}`
///
/// Parses the artifact name into a package identity, obtains a pull token,
/// fetches the OCI manifest for the identity's tag, picks the layer
/// matching the requested format, and relays the blob endpoint's redirect
/// to the caller.
#[instrument(skip(state), fields(%channel, %subdir, %artifact))]
async fn handle_download(
    State(state): State<Arc<AppState>>,
    Path((channel, subdir, artifact)): Path<(String, String, String)>,
) -> Response {
    let result = relay_download(&state, &channel, &subdir, &artifact).await;

    let outcome = match &result {
        Ok(_) => Outcome::Redirected,
        Err(e) => e.outcome(),
    };
    state
        .metrics
        .metrics
        .relay_requests_total
        .get_or_create(&RelayLabels { outcome })
        .inc();

    match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// The sequential resolve pipeline behind [`handle_download`].  Every
/// stage's failure terminates the request; nothing is retried.
async fn relay_download(
    state: &AppState,
    channel: &str,
    subdir: &str,
    artifact: &str,
) -> Result<Response, AppError> {
    let parsed = artifact::parse_artifact(artifact)?;
    debug!(package = %parsed.package_name, tag = %parsed.tag, "parsed artifact request");

    let metrics = &state.metrics.metrics;

    let token = state
        .registry
        .pull_token(
            &state.http_client,
            channel,
            subdir,
            &parsed.package_name,
            metrics,
        )
        .await?;

    let manifest = state
        .registry
        .fetch_manifest(
            &state.http_client,
            channel,
            subdir,
            &parsed.package_name,
            &parsed.tag,
            &token,
            metrics,
        )
        .await?;

    let media_type = parsed.layer_media_type();
    let layer =
        manifest
            .select_layer(media_type)
            .ok_or_else(|| RegistryError::LayerNotFound {
                package: parsed.package_name.clone(),
                media_type,
            })?;

    let redirect = state
        .registry
        .fetch_blob_redirect(
            &state.http_client,
            channel,
            subdir,
            &parsed.package_name,
            &layer.digest,
            media_type,
            &token,
            metrics,
        )
        .await?;

    info!(location = %redirect.location, digest = %layer.digest, "relaying upstream redirect");
    relay_redirect(redirect)
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        config: Arc::clone(&state.config),
        http_client: state.http_client.clone(),
    };
    crate::health::health_handler(axum::extract::State(health_state)).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the forwarder.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
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
// Redirect relay
// ---------------------------------------------------------------------------

/// Upstream headers that must not be copied onto the relayed response:
/// they frame the upstream hop's body, and our redirect has no body.
const SKIPPED_HEADERS: [HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// Build the relayed redirect: a 307 whose headers are the upstream blob
/// response's headers, with `Location` pointing at the upstream target.
fn relay_redirect(redirect: BlobRedirect) -> Result<Response, AppError> {
    let location = redirect
        .location
        .parse::<HeaderValue>()
        .context("upstream redirect location is not a valid header value")?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
    for (name, value) in redirect.headers.iter() {
        if SKIPPED_HEADERS.contains(name) {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response.headers_mut().insert(header::LOCATION, location);

    Ok(response)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The requested artifact name could not be parsed.
    Parse(ArtifactError),
    /// The upstream registry interaction failed.
    Registry(RegistryError),
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl AppError {
    /// Outcome label recorded for this error.
    pub(crate) fn outcome(&self) -> Outcome {
        match self {
            AppError::Parse(_) => Outcome::ParseError,
            AppError::Registry(RegistryError::Auth { .. }) => Outcome::AuthError,
            AppError::Registry(RegistryError::LayerNotFound { .. }) => Outcome::LayerNotFound,
            AppError::Registry(RegistryError::RedirectMissing { .. }) => Outcome::RedirectMissing,
            AppError::Registry(_) => Outcome::UpstreamError,
            AppError::Internal(_) => Outcome::InternalError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Parse(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
            AppError::Registry(err) => {
                warn!(error = %err, "upstream registry error");
                (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
            }
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

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        AppError::Parse(err)
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::Registry(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
