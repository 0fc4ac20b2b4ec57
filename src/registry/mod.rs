//! OCI registry client.
//!
//! All outbound interaction with the upstream registry lives here: pull
//! token acquisition, manifest retrieval, and blob redirect fetches.  URL
//! construction and response parsing never leak outside this module.

pub mod blob;
pub mod manifest;
pub mod token;

pub use blob::BlobRedirect;
pub use manifest::{Layer, Manifest};
pub use token::PullTokenCache;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::RegistryConfig;
use crate::metrics::{EndpointLabels, Metrics};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failures talking to the upstream registry.  All of them are terminal
/// for the current request; nothing here is retried.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The token endpoint refused to issue a pull token.
    #[error("token fetch failed: upstream returned {status}: {detail}")]
    Auth { status: StatusCode, detail: String },
    /// A manifest or blob request came back with a non-success status.
    #[error("upstream registry returned {status} for {url}: {detail}")]
    Upstream {
        status: StatusCode,
        url: String,
        detail: String,
    },
    /// No manifest layer carries the expected media type.
    #[error("no layer with media type {media_type} in manifest for {package}")]
    LayerNotFound {
        package: String,
        media_type: &'static str,
    },
    /// The blob endpoint did not answer with a redirect location.
    #[error("no redirect from upstream for blob {digest} (status {status})")]
    RedirectMissing { digest: String, status: StatusCode },
    /// The request never completed.
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Client for one upstream OCI registry organisation.
///
/// Holds the registry coordinates and the shared pull-token cache; the
/// actual connection pool (`reqwest::Client`) is owned by the application
/// state and passed into each call.
#[derive(Debug)]
pub struct RegistryClient {
    base_url: String,
    org: String,
    tokens: PullTokenCache,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            tokens: PullTokenCache::new(config.token_max_uses),
        }
    }

    /// Registry base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// Pull scope for a channel package.  The repository path below the
    /// org is percent-encoded into a single scope segment.
    fn pull_scope(&self, channel: &str, subdir: &str, package_name: &str) -> String {
        format!(
            "repository:{}/{}%2F{}%2F{}:pull",
            self.org, channel, subdir, package_name
        )
    }

    /// Obtain a bearer token for pulling `{channel}/{subdir}/{package_name}`.
    ///
    /// Reuses the cached token while it is within its use budget; otherwise
    /// fetches a fresh one from the registry token endpoint.  A non-success
    /// response from the token endpoint fails the request, no retry.
    pub async fn pull_token(
        &self,
        http: &reqwest::Client,
        channel: &str,
        subdir: &str,
        package_name: &str,
        metrics: &Metrics,
    ) -> Result<String, RegistryError> {
        if let Some(token) = self.tokens.checkout() {
            trace!("pull token cache hit");
            metrics.token_cache_hits.inc();
            return Ok(token);
        }
        metrics.token_cache_misses.inc();

        let url = format!(
            "{}/token?scope={}",
            self.base_url,
            self.pull_scope(channel, subdir, package_name)
        );
        debug!(%url, "fetching fresh pull token");

        let resp = http.get(&url).send().await?;
        metrics
            .upstream_requests_total
            .get_or_create(&EndpointLabels {
                endpoint: "token".to_string(),
            })
            .inc();

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unreadable>"));
            warn!(%status, "token endpoint returned non-success");
            return Err(RegistryError::Auth { status, detail });
        }

        let body: TokenResponse = resp.json().await?;
        self.tokens.store(&body.token);
        Ok(body.token)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> RegistryClient {
        RegistryClient::new(&RegistryConfig {
            url: url.to_string(),
            org: "channel-mirrors".to_string(),
            token_max_uses: 100,
        })
    }

    #[test]
    fn base_url_is_normalised() {
        assert_eq!(client("https://ghcr.io/").base_url(), "https://ghcr.io");
        assert_eq!(client("https://ghcr.io").base_url(), "https://ghcr.io");
    }

    #[test]
    fn pull_scope_encodes_repository_path() {
        let scope = client("https://ghcr.io").pull_scope("conda-forge", "linux-64", "numpy");
        assert_eq!(
            scope,
            "repository:channel-mirrors/conda-forge%2Flinux-64%2Fnumpy:pull"
        );
    }
}
