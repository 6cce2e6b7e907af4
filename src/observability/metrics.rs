//! Provider Metrics
//!
//! Prometheus metrics for RPC handling and remote KMS calls, kept in a
//! registry owned by the process and exposed on the diagnostic endpoint.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "smartkey_kms";

/// Metrics for the provider service
pub struct ProviderMetrics {
    registry: Registry,
    /// RPC count by method and status
    pub requests_total: IntCounterVec,
    /// RPC latency by method
    pub request_duration_seconds: HistogramVec,
    /// RPCs currently being handled
    pub in_flight_requests: IntGauge,
    /// Remote KMS calls by operation and outcome
    pub remote_calls_total: IntCounterVec,
}

impl ProviderMetrics {
    /// Creates the metrics in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric definition is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total KMS RPCs handled").namespace(NAMESPACE),
            &["method", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "KMS RPC latency in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["method"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let in_flight_requests = IntGauge::with_opts(
            Opts::new("in_flight_requests", "KMS RPCs currently in flight").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(in_flight_requests.clone()))?;

        let remote_calls_total = IntCounterVec::new(
            Opts::new("remote_calls_total", "Remote KMS calls by outcome").namespace(NAMESPACE),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(remote_calls_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            in_flight_requests,
            remote_calls_total,
        })
    }

    /// Records a finished RPC
    pub fn record_request(&self, method: &str, status: &str, duration: Duration) {
        self.requests_total
            .with_label_values(&[method, status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration.as_secs_f64());
    }

    /// Records a finished remote KMS call
    pub fn record_remote_call(&self, operation: &str, outcome: &str) {
        self.remote_calls_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Increments in-flight RPCs
    pub fn inc_in_flight(&self) {
        self.in_flight_requests.inc();
    }

    /// Decrements in-flight RPCs
    pub fn dec_in_flight(&self) {
        self.in_flight_requests.dec();
    }

    /// Renders every metric in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
