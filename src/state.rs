//! Shared application state.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::registry::RegistryClient;

/// Global state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Shared outbound connection pool, created at startup and dropped on
    /// process termination.
    pub http_client: reqwest::Client,
    pub registry: Arc<RegistryClient>,
    pub metrics: MetricsRegistry,
}

impl AppState {
    /// Build the shared state from a validated [`Config`].
    pub fn new(config: Config) -> Result<Self> {
        // The blob endpoint's redirect is relayed to the caller, so the
        // client must not follow redirects itself.
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("condarelay/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build reqwest client")?;

        let registry = Arc::new(RegistryClient::new(&config.registry));

        Ok(Self {
            config: Arc::new(config),
            http_client,
            registry,
            metrics: MetricsRegistry::new(),
        })
    }
}
