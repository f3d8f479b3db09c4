// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for cluster operations and Service configuration.
//!
//! This module provides specialized error types for:
//! - Kubernetes API calls made through the cluster interface
//! - Watch subscriptions that fail or report an error event
//! - `ConfigMap` data that cannot be turned into a Service
//!
//! None of these errors are fatal to the reconciliation engine. They are logged,
//! counted in metrics, and the next watch event retries.

use thiserror::Error;

/// Errors returned by [`crate::cluster::ClusterInterface`] operations.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The object does not exist (HTTP 404)
    ///
    /// Deleting an object that is already gone maps here; callers treat that as success.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind (e.g. `Listener`)
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// The object already exists (HTTP 409)
    ///
    /// Creating an object that a concurrent pass already created maps here.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Resource kind
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// Any other Kubernetes API failure
    #[error("Failed to {operation} {kind}: {source}")]
    Api {
        /// Operation attempted (`list`, `get`, `create`, `delete`, `watch`)
        operation: &'static str,
        /// Resource kind
        kind: &'static str,
        /// Underlying client error
        source: kube::Error,
    },

    /// A failure that did not come from the Kubernetes client
    #[error("Failed to {operation} {kind}: {reason}")]
    Request {
        /// Operation attempted
        operation: &'static str,
        /// Resource kind
        kind: &'static str,
        /// Explanation of the failure
        reason: String,
    },

    /// The API server sent an error event on an open watch (e.g. 410 Gone)
    #[error("Watch on {kind} reported an error: {reason}")]
    WatchFailed {
        /// Resource kind being watched
        kind: &'static str,
        /// Error payload from the API server
        reason: String,
    },
}

impl ClusterError {
    /// Classify a kube client error, mapping 404 and 409 to their dedicated variants.
    #[must_use]
    pub fn from_kube(
        operation: &'static str,
        kind: &'static str,
        name: Option<&str>,
        err: kube::Error,
    ) -> Self {
        let status_code = match &err {
            kube::Error::Api(ae) => Some(ae.code),
            _ => None,
        };

        match (status_code, name) {
            (Some(404), Some(name)) => Self::NotFound {
                kind,
                name: name.to_string(),
            },
            (Some(409), Some(name)) => Self::AlreadyExists {
                kind,
                name: name.to_string(),
            },
            _ => Self::Api {
                operation,
                kind,
                source: err,
            },
        }
    }

    /// Whether the error means the object is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error means the object is already present.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Short label for the `error_type` metric dimension.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Api { .. } => "api",
            Self::Request { .. } => "request",
            Self::WatchFailed { .. } => "watch",
        }
    }
}

/// Errors turning a labeled `ConfigMap` into a Service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceConfigError {
    /// The `ConfigMap` has no `metadata.name`
    #[error("ConfigMap has no name")]
    Unnamed,

    /// A required data key is absent
    #[error("ConfigMap '{config_map}' is missing required key '{key}'")]
    MissingKey {
        /// `ConfigMap` name
        config_map: String,
        /// Missing data key
        key: &'static str,
    },

    /// The port value is not an integer in 1-65535
    #[error("ConfigMap '{config_map}' has invalid port '{value}': expected an integer in 1-65535")]
    InvalidPort {
        /// `ConfigMap` name
        config_map: String,
        /// Offending value
        value: String,
    },
}

#[cfg(test)]
#[path = "cluster_errors_tests.rs"]
mod cluster_errors_tests;
