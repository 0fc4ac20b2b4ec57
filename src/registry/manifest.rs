//! Manifest retrieval and layer selection.

use reqwest::header;
use serde::Deserialize;
use tracing::debug;

use super::{RegistryClient, RegistryError};
use crate::metrics::{EndpointLabels, Metrics};

/// Accept header value for OCI image manifests.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

// ---------------------------------------------------------------------------
// Manifest JSON
// ---------------------------------------------------------------------------

/// An OCI image manifest, reduced to the fields the forwarder reads.
/// Fetched per request, never cached.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub media_type: String,
    pub digest: String,
}

impl Manifest {
    /// First layer whose media type matches exactly, in registry order.
    pub fn select_layer(&self, media_type: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.media_type == media_type)
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

impl RegistryClient {
    /// Fetch the manifest for `{org}/{channel}/{subdir}/{package_name}`
    /// at `tag`.  Non-success responses are surfaced as-is, no retry.
    pub async fn fetch_manifest(
        &self,
        http: &reqwest::Client,
        channel: &str,
        subdir: &str,
        package_name: &str,
        tag: &str,
        token: &str,
        metrics: &Metrics,
    ) -> Result<Manifest, RegistryError> {
        let url = format!(
            "{}/v2/{}/{}/{}/{}/manifests/{}",
            self.base_url(),
            self.org(),
            channel,
            subdir,
            package_name,
            tag
        );
        debug!(%url, "fetching manifest");

        let resp = http
            .get(&url)
            .header(header::ACCEPT, OCI_MANIFEST_MEDIA_TYPE)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;
        metrics
            .upstream_requests_total
            .get_or_create(&EndpointLabels {
                endpoint: "manifest".to_string(),
            })
            .inc();

        if !resp.status().is_success() {
            let status = resp.status();
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

        Ok(resp.json::<Manifest>().await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
