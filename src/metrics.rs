use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RelayLabels {
    pub outcome: Outcome,
}

/// Terminal outcome of a relay request.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Redirected,
    ParseError,
    AuthError,
    UpstreamError,
    LayerNotFound,
    RedirectMissing,
    InternalError,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointLabels {
    pub endpoint: String,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Central container for every Prometheus metric exposed by the forwarder.
pub struct Metrics {
    /// Relay requests by terminal outcome.
    pub relay_requests_total: Family<RelayLabels, Counter>,

    // -- token cache --
    pub token_cache_hits: Counter,
    pub token_cache_misses: Counter,

    /// Outbound registry calls by endpoint (token / manifest / blob).
    pub upstream_requests_total: Family<EndpointLabels, Counter>,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        // The text encoder appends `_total` to counter names itself.
        let relay_requests_total = Family::<RelayLabels, Counter>::default();
        registry.register(
            "condarelay_relay_requests",
            "Relay requests by terminal outcome",
            relay_requests_total.clone(),
        );

        let token_cache_hits = Counter::default();
        registry.register(
            "condarelay_token_cache_hits",
            "Pull-token cache hits",
            token_cache_hits.clone(),
        );

        let token_cache_misses = Counter::default();
        registry.register(
            "condarelay_token_cache_misses",
            "Pull-token cache misses (fresh token fetches)",
            token_cache_misses.clone(),
        );

        let upstream_requests_total = Family::<EndpointLabels, Counter>::default();
        registry.register(
            "condarelay_upstream_requests",
            "Outbound registry requests by endpoint",
            upstream_requests_total.clone(),
        );

        Self {
            relay_requests_total,
            token_cache_hits,
            token_cache_misses,
            upstream_requests_total,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`AppState`].
///
/// [`AppState`]: crate::state::AppState
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all forwarder metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
