use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use reqwest::StatusCode;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: Outcome,
}

/// Final result of one verification.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Cached,
    Authenticated,
    EmptyCredential,
    Unauthenticated,
    TransportError,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpstreamLabels {
    pub status_class: StatusClass,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
    /// No response was received.
    Error,
}

impl StatusClass {
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            100..=199 => Self::Informational,
            200..=299 => Self::Success,
            300..=399 => Self::Redirection,
            400..=499 => Self::ClientError,
            _ => Self::ServerError,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every Prometheus metric exposed by the service.
pub struct Metrics {
    // -- auth cache --
    pub auth_cache_hits: Counter,
    pub auth_cache_misses: Counter,
    pub auth_cache_write_failures: Counter,

    // -- verification --
    pub verifications: Family<OutcomeLabels, Counter>,

    // -- upstream API --
    pub upstream_api_calls: Family<UpstreamLabels, Counter>,
    pub upstream_api_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let auth_cache_hits = Counter::default();
        registry.register(
            "coveritup_auth_cache_hits",
            "Verifications answered from the cache",
            auth_cache_hits.clone(),
        );

        let auth_cache_misses = Counter::default();
        registry.register(
            "coveritup_auth_cache_misses",
            "Verifications that required an upstream probe",
            auth_cache_misses.clone(),
        );

        let auth_cache_write_failures = Counter::default();
        registry.register(
            "coveritup_auth_cache_write_failures",
            "Successful verifications whose cache write failed",
            auth_cache_write_failures.clone(),
        );

        let verifications = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "coveritup_auth_verifications",
            "Verification results by outcome",
            verifications.clone(),
        );

        let upstream_api_calls = Family::<UpstreamLabels, Counter>::default();
        registry.register(
            "coveritup_upstream_api_calls",
            "Upstream commit probes by response status class",
            upstream_api_calls.clone(),
        );

        let upstream_api_duration_seconds = Histogram::new(exponential_buckets(0.005, 2.0, 12));
        registry.register(
            "coveritup_upstream_api_duration_seconds",
            "Upstream commit probe latency in seconds",
            upstream_api_duration_seconds.clone(),
        );

        Self {
            auth_cache_hits,
            auth_cache_misses,
            auth_cache_write_failures,
            verifications,
            upstream_api_calls,
            upstream_api_duration_seconds,
        }
    }

    pub fn record_outcome(&self, outcome: Outcome) {
        self.verifications
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
    }

    pub fn record_upstream(&self, status_class: StatusClass) {
        self.upstream_api_calls
            .get_or_create(&UpstreamLabels { status_class })
            .inc();
    }

    #[cfg(test)]
    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.verifications
            .get_or_create(&OutcomeLabels { outcome })
            .get()
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`AppState`].
///
/// [`AppState`]: crate::AppState
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_class_boundaries() {
        assert_eq!(StatusClass::of(StatusCode::CONTINUE), StatusClass::Informational);
        assert_eq!(StatusClass::of(StatusCode::OK), StatusClass::Success);
        assert_eq!(StatusClass::of(StatusCode::FOUND), StatusClass::Redirection);
        assert_eq!(
            StatusClass::of(StatusCode::UNPROCESSABLE_ENTITY),
            StatusClass::ClientError
        );
        assert_eq!(StatusClass::of(StatusCode::BAD_GATEWAY), StatusClass::ServerError);
    }

    #[test]
    fn encode_includes_recorded_outcomes() {
        let registry = MetricsRegistry::new();
        registry.metrics.record_outcome(Outcome::Cached);
        registry.metrics.record_outcome(Outcome::Cached);
        registry.metrics.auth_cache_hits.inc();

        assert_eq!(registry.metrics.outcome_count(Outcome::Cached), 2);

        let text = registry.encode().unwrap();
        assert!(text.contains("coveritup_auth_cache_hits_total 1"));
        assert!(text.contains("coveritup_auth_verifications_total{outcome=\"Cached\"} 2"));
    }
}
