use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Service configuration.
///
/// Every field has a default, so the forwarder runs without a config file;
/// a YAML file can override any subset of fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8000`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

// ---------------------------------------------------------------------------
// Upstream registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the upstream OCI registry.
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Organisation that owns the mirrored channel repositories.
    #[serde(default = "default_org")]
    pub org: String,
    /// How many times a pull token is reused before a fresh one is fetched.
    #[serde(default = "default_token_max_uses")]
    pub token_max_uses: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            org: default_org(),
            token_max_uses: default_token_max_uses(),
        }
    }
}

fn default_registry_url() -> String {
    "https://ghcr.io".to_string()
}

fn default_org() -> String {
    "channel-mirrors".to_string()
}

fn default_token_max_uses() -> u64 {
    100
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
pub fn validate_config(config: &Config) -> Result<()> {
    config
        .server
        .listen
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address: {}", config.server.listen))?;
    anyhow::ensure!(
        config.registry.url.starts_with("http://") || config.registry.url.starts_with("https://"),
        "registry url must be an http(s) URL: {}",
        config.registry.url
    );
    anyhow::ensure!(
        config.registry.token_max_uses >= 1,
        "token_max_uses must be at least 1"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
