// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # skupper-dmc - Skupper dynamic multichannel controller
//!
//! A Kubernetes controller that keeps Skupper `Listener` resources converged with
//! two independently changing inputs:
//!
//! - **Services**, one per controller-labeled `ConfigMap`, each naming a host
//!   prefix and a backend port.
//! - **Routing keys**, reported as reachable by the namespace's Skupper `Site`.
//!
//! Every Service gets one active listener, and one `Listener` resource, per
//! routing key currently available in the network. Keys that vanish and Services
//! that are removed have their resources deleted.
//!
//! ## Modules
//!
//! - [`crd`] - Skupper `Site` and `Listener` custom resources
//! - [`cluster`] - Cluster interface the engine calls, and its kube implementation
//! - [`routing`] - Routing key extraction from `Site` status
//! - [`listener`] - Listener entity and activation state machine
//! - [`service`] - Service entity and per-service key reconciliation
//! - [`registry`] - Service registry synchronized from `ConfigMaps`
//! - [`reconciler`] - Reconciliation engine and event loop
//! - [`watch`] - Watch supervision and error-rate aggregation
//! - [`apiserver`] - Health, metrics and read-only status API
//!
//! ## Example
//!
//! ```rust
//! use skupper_dmc::service::Service;
//! use std::collections::BTreeSet;
//!
//! let mut service = Service::new("orders", "orders", 9000);
//! let keys = BTreeSet::from(["backend".to_string()]);
//!
//! let delta = service.reconcile_keys(&keys);
//! assert_eq!(delta.added.len(), 1);
//! assert!(service.reconcile_keys(&keys).is_empty());
//! ```

pub mod apiserver;
pub mod cluster;
pub mod cluster_errors;
pub mod config;
pub mod constants;
pub mod crd;
pub mod labels;
pub mod listener;
pub mod metrics;
pub mod reconciler;
pub mod registry;
pub mod routing;
pub mod service;
pub mod watch;

#[cfg(test)]
mod test_support;
