//! Blob redirect retrieval.
//!
//! The registry answers blob requests for mirrored channel artifacts with
//! a redirect to the backing object store rather than the content itself.
//! The shared HTTP client is built with redirect-following disabled so the
//! redirect can be relayed to the original caller.

use reqwest::header::{self, HeaderMap};
use tracing::debug;

use super::{RegistryClient, RegistryError};
use crate::metrics::{EndpointLabels, Metrics};

/// An upstream blob redirect: the target location plus the upstream
/// response headers, relayed to the caller.
#[derive(Debug)]
pub struct BlobRedirect {
    pub location: String,
    pub headers: HeaderMap,
}

impl RegistryClient {
    /// Request a blob by digest, expecting a redirect.
    ///
    /// The repository path below the org is percent-encoded into a single
    /// path segment here, unlike the manifest route.  That is how the
    /// mirror lays out its blob URLs.
    pub async fn fetch_blob_redirect(
        &self,
        http: &reqwest::Client,
        channel: &str,
        subdir: &str,
        package_name: &str,
        digest: &str,
        media_type: &str,
        token: &str,
        metrics: &Metrics,
    ) -> Result<BlobRedirect, RegistryError> {
        let url = format!(
            "{}/v2/{}/{}%2F{}%2F{}/blobs/{}",
            self.base_url(),
            self.org(),
            channel,
            subdir,
            package_name,
            digest
        );
        debug!(%url, %media_type, "requesting blob redirect");

        let resp = http
            .get(&url)
            .header(header::ACCEPT, media_type)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;
        metrics
            .upstream_requests_total
            .get_or_create(&EndpointLabels {
                endpoint: "blob".to_string(),
            })
            .inc();

        let status = resp.status();
        if !status.is_success() && !status.is_redirection() {
            let detail = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unreadable>"));
            return Err(RegistryError::Upstream {
                status,
                url,
                detail,
            });
        }

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        match location {
            Some(location) if status.is_redirection() => Ok(BlobRedirect {
                location,
                headers: resp.headers().clone(),
            }),
            _ => Err(RegistryError::RedirectMissing {
                digest: digest.to_string(),
                status,
            }),
        }
    }
}
