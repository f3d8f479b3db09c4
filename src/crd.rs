// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Skupper custom resources consumed and produced by the controller.
//!
//! The controller does not own these CRDs; Skupper installs them. The types here
//! cover the fields the reconciliation engine reads or writes.
//!
//! # Resource Types
//!
//! - [`Site`] - One participant in the Skupper network. Its status reports which
//!   routing keys are reachable anywhere in the network.
//! - [`Listener`] - An endpoint binding that routes local traffic for `host:port`
//!   to whatever connectors serve its routing key.
//!
//! # Example: Building a Listener
//!
//! ```rust
//! use skupper_dmc::crd::{Listener, ListenerSpec};
//!
//! let listener = Listener::new(
//!     "orders-backend-1f2e3d4c",
//!     ListenerSpec {
//!         routing_key: "backend".to_string(),
//!         host: "orders-backend-1f2e3d4c".to_string(),
//!         port: 9000,
//!         tls_credentials: None,
//!     },
//! );
//! assert_eq!(listener.spec.port, 9000);
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Site specification.
///
/// Only informational to this controller; the routing keys come from
/// [`SiteStatus::network`].
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "skupper.io",
    version = "v2alpha1",
    kind = "Site",
    namespaced,
    doc = "Site represents one participant in a Skupper application network. Its status lists every site in the network together with the services and connectors each one reports."
)]
#[kube(status = "SiteStatus")]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSpec {
    /// How links into this site are exposed (e.g. `default`, `route`, `loadbalancer`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_access: Option<String>,

    /// Service account the site's router runs as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Run the router in high-availability mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha: Option<bool>,

    /// Free-form router settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<BTreeMap<String, String>>,
}

/// Site status as reported by Skupper.
///
/// `network` is kept as raw JSON. Its shape has changed between Skupper releases
/// and a partially populated entry must not make the whole `Site` undecodable;
/// [`crate::routing`] walks it leniently instead.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteStatus {
    /// Overall status (`Ready`, `Pending`, `Error`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Human-readable detail for `status`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Number of sites this site can see in the network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites_in_network: Option<i64>,

    /// Per-site network view: `[{ name, services: [{ routingKey, connectors: [...] }] }]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<serde_json::Value>,
}

/// Listener specification.
///
/// Each listener exposes `host:port` inside the namespace and forwards traffic over
/// the network to connectors bound to `routing_key`.
#[derive(CustomResource, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "skupper.io",
    version = "v2alpha1",
    kind = "Listener",
    namespaced,
    doc = "Listener binds a local host and port to a routing key. Traffic to the host is carried over the Skupper network to connectors with the same routing key."
)]
#[kube(status = "ListenerStatus")]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    /// Routing key matching the connectors this listener reaches.
    pub routing_key: String,

    /// Hostname of the Service Skupper creates for this listener.
    pub host: String,

    /// Port the Service listens on.
    pub port: i32,

    /// Secret with TLS credentials, if traffic is TLS-terminated at the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_credentials: Option<String>,
}

/// Listener status as reported by Skupper.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ListenerStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Whether at least one connector for the routing key exists in the network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_matching_connector: Option<bool>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
