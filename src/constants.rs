// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the dynamic multichannel controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group of the Skupper custom resources this controller reads and writes
pub const SKUPPER_API_GROUP: &str = "skupper.io";

/// API version of the Skupper custom resources
pub const SKUPPER_API_VERSION: &str = "v2alpha1";

/// Fully qualified API version (group/version)
pub const SKUPPER_API_GROUP_VERSION: &str = "skupper.io/v2alpha1";

/// Kind name for the Skupper `Site` resource
pub const KIND_SITE: &str = "Site";

/// Kind name for the Skupper `Listener` resource
pub const KIND_LISTENER: &str = "Listener";

/// Kind name for core `ConfigMap` resources
pub const KIND_CONFIG_MAP: &str = "ConfigMap";

/// Kind name for core `Service` resources
pub const KIND_SERVICE: &str = "Service";

// ============================================================================
// Service ConfigMap Keys
// ============================================================================

/// ConfigMap data key holding the naming prefix for derived listener hosts
pub const CONFIG_KEY_PREFIX: &str = "prefix";

/// ConfigMap data key holding the backend port every listener forwards to
pub const CONFIG_KEY_PORT: &str = "port";

// ============================================================================
// Naming Constants
// ============================================================================

/// Maximum length of a DNS-1123 label (hosts and listener resource names)
pub const DNS_LABEL_MAX_LEN: usize = 63;

/// Number of hex characters of the SHA-256 suffix appended to derived names
pub const NAME_HASH_LEN: usize = 8;

// ============================================================================
// Watch Supervision Constants
// ============================================================================

/// Watch failures tolerated per window before an aggregated error is logged.
///
/// Watches are closed by the API server every few minutes; a count above this
/// within one window means something is failing on every reconnect.
pub const WATCH_ERROR_THRESHOLD: u64 = 10;

/// Length of the watch error aggregation window (1 minute)
pub const WATCH_ERROR_WINDOW_SECS: u64 = 60;

// ============================================================================
// Status API Constants
// ============================================================================

/// Default port for the status/health HTTP server
pub const DEFAULT_API_PORT: u16 = 8088;

/// Default bind address for the status/health HTTP server
pub const DEFAULT_API_BIND_ADDRESS: &str = "0.0.0.0";

/// Path prefix for the status API
pub const API_PATH_PREFIX: &str = "/api/v1alpha1";

/// Path for the liveness endpoint
pub const HEALTH_PATH: &str = "/healthz";

/// Path for the Prometheus metrics endpoint
pub const METRICS_PATH: &str = "/metrics";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Name this controller reports in logs and `app.kubernetes.io/managed-by`
pub const CONTROLLER_NAME: &str = "skupper-dmc";

/// Controller version, taken from the crate manifest
pub const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");
