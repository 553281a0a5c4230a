//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for DataGate:
//! - Request counts and latencies by backend and operation
//! - Connection establishment and failure counts by backend
//! - Registered tenant gauge

use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for DataGate
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Requests handled on tenant routes
    pub requests_total: CounterVec,
    /// End-to-end handler duration
    pub request_duration_seconds: HistogramVec,

    /// Backend handles created by the pool manager
    pub connections_established_total: CounterVec,
    /// Failed first connects
    pub connection_failures_total: CounterVec,

    pub tenants_registered: Gauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("datagate_requests_total", "Total number of tenant requests"),
            &["backend", "operation", "status"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "datagate_request_duration_seconds",
                "Tenant request duration in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["backend", "operation"],
        )?;

        let connections_established_total = CounterVec::new(
            Opts::new(
                "datagate_connections_established_total",
                "Total number of backend handles established",
            ),
            &["backend"],
        )?;

        let connection_failures_total = CounterVec::new(
            Opts::new(
                "datagate_connection_failures_total",
                "Total number of failed backend connects",
            ),
            &["backend"],
        )?;

        let tenants_registered = Gauge::with_opts(Opts::new(
            "datagate_tenants_registered",
            "Number of tenants in the registry",
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(connections_established_total.clone()))?;
        registry.register(Box::new(connection_failures_total.clone()))?;
        registry.register(Box::new(tenants_registered.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            request_duration_seconds,
            connections_established_total,
            connection_failures_total,
            tenants_registered,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completed tenant request
    pub fn record_request(&self, backend: &str, operation: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.requests_total
            .with_label_values(&[backend, operation, status.as_str()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[backend, operation])
            .observe(duration_secs);
    }

    pub fn record_connection_established(&self, backend: &str) {
        self.connections_established_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn record_connection_failure(&self, backend: &str) {
        self.connection_failures_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn set_tenants_registered(&self, count: usize) {
        self.tenants_registered.set(count as f64);
    }

    /// Render every metric in Prometheus text format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        prometheus::TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
