//! Artifact file-name parsing and layer media-type selection.
//!
//! Conda clients request either the channel index (`repodata.json`, plain
//! or compressed) or a package artifact named `{name}-{version}-{build}`
//! with a `.tar.bz2` or `.conda` suffix.  The package name may itself
//! contain dashes, so the version/build split uses the two rightmost dash
//! boundaries only.

use thiserror::Error;

const REPODATA_NAME: &str = "repodata.json";

// ---------------------------------------------------------------------------
// Layer media types
// ---------------------------------------------------------------------------

/// Layer media type for v1 (`.tar.bz2`) conda packages.
pub const MEDIA_TYPE_PACKAGE_V1: &str = "application/vnd.conda.package.v1";
/// Layer media type for v2 (`.conda`) packages.
pub const MEDIA_TYPE_PACKAGE_V2: &str = "application/vnd.conda.package.v2";
/// Layer media type for the plain repodata index.
pub const MEDIA_TYPE_REPODATA: &str = "application/vnd.conda.repodata.v1+json";
/// Layer media type for the zstd-compressed repodata index.
pub const MEDIA_TYPE_REPODATA_ZST: &str = "application/vnd.conda.repodata.v1+json+zst";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// The file name carries neither a `.tar.bz2` nor a `.conda` suffix.
    #[error("unsupported artifact extension: {0:?} (expected .tar.bz2 or .conda)")]
    UnsupportedExtension(String),
    /// The name has fewer than three dash-separated fields.
    #[error("malformed artifact name: {0:?} (expected name-version-build)")]
    MalformedName(String),
}

// ---------------------------------------------------------------------------
// Parsed artifact
// ---------------------------------------------------------------------------

/// A requested file name decomposed into the fields needed to address the
/// corresponding OCI repository and manifest layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifact {
    /// Package name, or `"repodata.json"` for index requests.
    pub package_name: String,
    /// Package version; absent for repodata requests.
    pub version: Option<String>,
    /// Build string; absent for repodata requests.
    pub build: Option<String>,
    /// Extension as requested: `".tar.bz2"` / `".conda"` for packages, the
    /// suffix after the last dot (`"json"`, `"zst"`, ...) for repodata.
    pub extension: String,
    /// OCI tag: `"latest"` for repodata, `"{version}-{build}"` otherwise.
    pub tag: String,
}

impl ParsedArtifact {
    /// Whether this request addresses the channel index rather than a package.
    pub fn is_repodata(&self) -> bool {
        self.package_name == REPODATA_NAME
    }

    /// The manifest layer media type expected for this artifact.
    pub fn layer_media_type(&self) -> &'static str {
        if self.is_repodata() {
            match self.extension.as_str() {
                ".zst" | "zst" => MEDIA_TYPE_REPODATA_ZST,
                _ => MEDIA_TYPE_REPODATA,
            }
        } else if self.extension == ".tar.bz2" {
            MEDIA_TYPE_PACKAGE_V1
        } else {
            MEDIA_TYPE_PACKAGE_V2
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a requested artifact file name into a [`ParsedArtifact`].
///
/// Fails on unrecognised extensions and on package names with fewer than
/// three dash-separated fields.  There is no partial recovery.
pub fn parse_artifact(artifact: &str) -> Result<ParsedArtifact, ArtifactError> {
    if artifact.starts_with(REPODATA_NAME) {
        // Index request: the tag is always `latest`; the extension
        // distinguishes plain from compressed variants.
        let extension = artifact.rsplit('.').next().unwrap_or_default().to_string();
        return Ok(ParsedArtifact {
            package_name: REPODATA_NAME.to_string(),
            version: None,
            build: None,
            extension,
            tag: "latest".to_string(),
        });
    }

    let (stem, extension) = if let Some(stem) = artifact.strip_suffix(".tar.bz2") {
        (stem, ".tar.bz2")
    } else if let Some(stem) = artifact.strip_suffix(".conda") {
        (stem, ".conda")
    } else {
        return Err(ArtifactError::UnsupportedExtension(artifact.to_string()));
    };

    let mut fields = stem.rsplitn(3, '-');
    let build = fields.next();
    let version = fields.next();
    let package_name = fields.next();
    let (Some(package_name), Some(version), Some(build)) = (package_name, version, build) else {
        return Err(ArtifactError::MalformedName(artifact.to_string()));
    };

    Ok(ParsedArtifact {
        package_name: package_name.to_string(),
        version: Some(version.to_string()),
        build: Some(build.to_string()),
        extension: extension.to_string(),
        tag: format!("{version}-{build}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
