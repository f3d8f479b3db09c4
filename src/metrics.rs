// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the dynamic multichannel controller.
//!
//! All metrics carry the prefix `skupper_dmc_` and are exposed on `GET /metrics`
//! by [`crate::apiserver`].
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Passes per trigger (`config`, `site`, `startup`, `audit`) and outcome
//! - **Resource Lifecycle Metrics** - Listener resources created and deleted
//! - **Error Metrics** - Failed cluster calls by resource and error type
//! - **Watch Metrics** - Restarts and failures per watched resource kind
//! - **State Metrics** - Registered services and active listeners
//!
//! # Example
//!
//! ```rust,no_run
//! use skupper_dmc::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("site", std::time::Duration::from_millis(40));
//! ```

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all controller metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "skupper_dmc";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliation passes by trigger and status
///
/// Labels:
/// - `trigger`: What started the pass (`config`, `site`, `startup`, `audit`)
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliation passes by trigger and status",
    );
    let counter = CounterVec::new(opts, &["trigger", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation passes in seconds
///
/// Labels:
/// - `trigger`: What started the pass
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliation passes in seconds by trigger",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["trigger"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Resource Lifecycle Metrics
// ============================================================================

/// Total number of resources created
///
/// Labels:
/// - `resource_type`: Kind of resource created
pub static RESOURCES_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_created_total"),
        "Total number of resources created by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of resources deleted
///
/// Labels:
/// - `resource_type`: Kind of resource deleted
pub static RESOURCES_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_deleted_total"),
        "Total number of resources deleted by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of failed cluster calls by resource type and error category
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `error_type`: Category of error (`not_found`, `already_exists`, `api`, `request`, `watch`)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by resource type and error category",
    );
    let counter = CounterVec::new(opts, &["resource_type", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Watch Metrics
// ============================================================================

/// Total number of watch subscriptions started, including the first one
///
/// Labels:
/// - `resource`: Watched kind (`ConfigMaps`, `Services`, `Sites`)
pub static WATCH_RESTARTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_restarts_total"),
        "Total number of watch subscriptions by resource",
    );
    let counter = CounterVec::new(opts, &["resource"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of watch failures
///
/// Labels:
/// - `resource`: Watched kind
pub static WATCH_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_errors_total"),
        "Total number of watch failures by resource",
    );
    let counter = CounterVec::new(opts, &["resource"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// State Metrics
// ============================================================================

/// Number of registered services
pub static SERVICES_REGISTERED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_services_registered"),
        "Number of services currently registered",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Number of active listeners across all services
pub static LISTENERS_ACTIVE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_listeners_active"),
        "Number of listeners currently active",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation pass
///
/// # Arguments
/// * `trigger` - What started the pass (e.g., `site`)
/// * `duration` - Duration of the pass
pub fn record_reconciliation_success(trigger: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[trigger, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[trigger])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation pass
///
/// # Arguments
/// * `trigger` - What started the pass
/// * `duration` - Duration of the pass before failure
pub fn record_reconciliation_error(trigger: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[trigger, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[trigger])
        .observe(duration.as_secs_f64());
}

/// Record resource creation
pub fn record_resource_created(resource_type: &str) {
    RESOURCES_CREATED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record resource deletion
pub fn record_resource_deleted(resource_type: &str) {
    RESOURCES_DELETED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record an error
///
/// # Arguments
/// * `resource_type` - The kind of resource where error occurred
/// * `error_type` - Category of error (see [`crate::cluster_errors::ClusterError::error_type`])
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Record a watch subscription attempt
pub fn record_watch_restart(resource: &str) {
    WATCH_RESTARTS_TOTAL.with_label_values(&[resource]).inc();
}

/// Record a watch failure
pub fn record_watch_error(resource: &str) {
    WATCH_ERRORS_TOTAL.with_label_values(&[resource]).inc();
}

/// Update the registry state gauges
#[allow(clippy::cast_precision_loss)]
pub fn set_registry_state(services: usize, active_listeners: usize) {
    SERVICES_REGISTERED.set(services as f64);
    LISTENERS_ACTIVE.set(active_listeners as f64);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
