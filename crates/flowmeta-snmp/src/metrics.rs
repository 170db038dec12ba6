//! Prometheus metrics for the resolver.

use std::sync::Arc;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Metric surface of the resolver, prefixed `flowmeta_inlet_snmp_`.
///
/// Cloning is cheap; clones share the same registry and series.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub cache_hit: IntCounter,
    pub cache_miss: IntCounter,
    pub cache_expired: IntCounter,
    pub cache_size: IntGauge,
    pub cache_refresh: IntCounter,
    pub cache_refresh_runs: IntCounter,
    pub poller_coalesced_count: IntCounter,
    pub poller_busy_count: IntCounter,
    pub poller_breaker_open_count: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let cache_hit = IntCounter::with_opts(Opts::new(
            "flowmeta_inlet_snmp_cache_hit",
            "Lookups answered from the cache",
        ))
        .expect("failed to create cache_hit counter");

        let cache_miss = IntCounter::with_opts(Opts::new(
            "flowmeta_inlet_snmp_cache_miss",
            "Lookups not answered from the cache",
        ))
        .expect("failed to create cache_miss counter");

        let cache_expired = IntCounter::with_opts(Opts::new(
            "flowmeta_inlet_snmp_cache_expired",
            "Cache entries evicted after expiry",
        ))
        .expect("failed to create cache_expired counter");

        let cache_size = IntGauge::with_opts(Opts::new(
            "flowmeta_inlet_snmp_cache_size",
            "Current number of cache entries",
        ))
        .expect("failed to create cache_size gauge");

        let cache_refresh = IntCounter::with_opts(Opts::new(
            "flowmeta_inlet_snmp_cache_refresh",
            "Refresh polls submitted for entries in active use",
        ))
        .expect("failed to create cache_refresh counter");

        let cache_refresh_runs = IntCounter::with_opts(Opts::new(
            "flowmeta_inlet_snmp_cache_refresh_runs",
            "Expiry/refresh scans performed",
        ))
        .expect("failed to create cache_refresh_runs counter");

        let poller_coalesced_count = IntCounter::with_opts(Opts::new(
            "flowmeta_inlet_snmp_poller_coalesced_count",
            "Lookup requests merged into batched polls",
        ))
        .expect("failed to create poller_coalesced_count counter");

        let poller_busy_count = IntCounter::with_opts(Opts::new(
            "flowmeta_inlet_snmp_poller_busy_count",
            "Requests or batches dropped because a queue was full",
        ))
        .expect("failed to create poller_busy_count counter");

        let poller_breaker_open_count = IntCounterVec::new(
            Opts::new(
                "flowmeta_inlet_snmp_poller_breaker_open_count",
                "Polls short-circuited by an open breaker",
            ),
            &["exporter"],
        )
        .expect("failed to create poller_breaker_open_count counter");

        registry
            .register(Box::new(cache_hit.clone()))
            .expect("failed to register cache_hit");
        registry
            .register(Box::new(cache_miss.clone()))
            .expect("failed to register cache_miss");
        registry
            .register(Box::new(cache_expired.clone()))
            .expect("failed to register cache_expired");
        registry
            .register(Box::new(cache_size.clone()))
            .expect("failed to register cache_size");
        registry
            .register(Box::new(cache_refresh.clone()))
            .expect("failed to register cache_refresh");
        registry
            .register(Box::new(cache_refresh_runs.clone()))
            .expect("failed to register cache_refresh_runs");
        registry
            .register(Box::new(poller_coalesced_count.clone()))
            .expect("failed to register poller_coalesced_count");
        registry
            .register(Box::new(poller_busy_count.clone()))
            .expect("failed to register poller_busy_count");
        registry
            .register(Box::new(poller_breaker_open_count.clone()))
            .expect("failed to register poller_breaker_open_count");

        Self {
            registry: Arc::new(registry),
            cache_hit,
            cache_miss,
            cache_expired,
            cache_size,
            cache_refresh,
            cache_refresh_runs,
            poller_coalesced_count,
            poller_busy_count,
            poller_breaker_open_count,
        }
    }

    /// The underlying registry, for scraping alongside other components.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text output.
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
