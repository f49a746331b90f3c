use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::pipeline::CandidateKind;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub outcome: RequestOutcome,
}

/// How a config request was answered.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RequestOutcome {
    /// 200 with a pipeline.
    Resolved,
    /// 204 because every candidate missed.
    NoOverride,
    /// 204 because the ref did not pass the admission filter.
    Filtered,
    /// 204 because resolution hit a hard failure.
    Failed,
    /// 400.
    BadRequest,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchLabels {
    pub kind: CandidateKind,
    pub status: FetchStatus,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum FetchStatus {
    Found,
    Miss,
    Error,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every Prometheus metric exposed by the resolver.
pub struct Metrics {
    pub requests: Family<RequestLabels, Counter>,
    pub candidate_fetches: Family<FetchLabels, Counter>,
    pub resolution_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        registry.register(
            "pipeline_resolver_requests",
            "Config requests by outcome",
            requests.clone(),
        );

        let candidate_fetches = Family::<FetchLabels, Counter>::default();
        registry.register(
            "pipeline_resolver_candidate_fetches",
            "Content store fetches by candidate kind and status",
            candidate_fetches.clone(),
        );

        let resolution_duration_seconds = Histogram::new(exponential_buckets(0.005, 2.0, 12));
        registry.register(
            "pipeline_resolver_resolution_duration_seconds",
            "Time spent walking the candidate chain",
            resolution_duration_seconds.clone(),
        );

        Self {
            requests,
            candidate_fetches,
            resolution_duration_seconds,
        }
    }

    pub fn record_request(&self, outcome: RequestOutcome) {
        self.requests
            .get_or_create(&RequestLabels { outcome })
            .inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Registry plus metric handles, cheap to clone into [`AppState`](crate::AppState).
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
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
