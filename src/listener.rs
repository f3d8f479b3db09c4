// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Listener entity and its activation state machine.
//!
//! A [`Listener`] tracks one routing key for one Service. It is either inactive
//! (no host) or active (host assigned). Only an active listener has a Skupper
//! `Listener` resource in the cluster.
//!
//! ```text
//!   Inactive --activate--> Active
//!   Active --deactivate--> Inactive
//! ```
//!
//! Both transitions are idempotent.

use crate::constants::{DNS_LABEL_MAX_LEN, NAME_HASH_LEN};
use crate::crd::{Listener as ListenerResource, ListenerSpec};
use crate::labels;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// One routing key tracked by a Service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    name: String,
    service: String,
    routing_key: String,
    port: i32,
    // Some(host) iff the listener is active.
    host: Option<String>,
}

impl Listener {
    /// A new, inactive listener for `routing_key` owned by `service`.
    #[must_use]
    pub fn new(service: &str, routing_key: &str, port: i32) -> Self {
        Self {
            name: routing_key.to_string(),
            service: service.to_string(),
            routing_key: routing_key.to_string(),
            port,
            host: None,
        }
    }

    /// An active listener recovered from an existing resource.
    #[must_use]
    pub fn adopted(service: &str, spec: &ListenerSpec) -> Self {
        Self {
            name: spec.routing_key.clone(),
            service: service.to_string(),
            routing_key: spec.routing_key.clone(),
            port: spec.port,
            host: Some(spec.host.clone()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    #[must_use]
    pub fn port(&self) -> i32 {
        self.port
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.host.is_some()
    }

    /// Assign a host derived from the owning Service and mark the listener active.
    ///
    /// Returns `false` if the listener was already active (nothing changes).
    pub fn activate(&mut self, prefix: &str) -> bool {
        if self.is_active() {
            return false;
        }
        self.host = Some(listener_host(prefix, &self.service, &self.routing_key));
        true
    }

    /// Clear the host and mark the listener inactive.
    ///
    /// Returns `false` if the listener was already inactive.
    pub fn deactivate(&mut self) -> bool {
        self.host.take().is_some()
    }

    /// Name of this listener's cluster resource. Stable for a (service, routing key) pair.
    #[must_use]
    pub fn resource_name(&self) -> String {
        listener_resource_name(&self.service, &self.routing_key)
    }

    /// The Skupper `Listener` resource for this listener, if it is active.
    #[must_use]
    pub fn to_resource(&self, namespace: &str) -> Option<ListenerResource> {
        let host = self.host.as_ref()?;
        let mut resource = ListenerResource::new(
            &self.resource_name(),
            ListenerSpec {
                routing_key: self.routing_key.clone(),
                host: host.clone(),
                port: self.port,
                tls_credentials: None,
            },
        );
        resource.metadata.namespace = Some(namespace.to_string());
        resource.metadata.labels = Some(labels::listener_labels());
        labels::mark_controlled(&mut resource.metadata);
        Some(resource)
    }
}

/// Resource name for the listener of `routing_key` in `service`.
#[must_use]
pub fn listener_resource_name(service: &str, routing_key: &str) -> String {
    hashed_dns_label(&[service, routing_key], &format!("{service}/{routing_key}"))
}

/// Host assigned to an active listener: the Service prefix joined with the routing key.
#[must_use]
pub fn listener_host(prefix: &str, service: &str, routing_key: &str) -> String {
    hashed_dns_label(&[prefix, routing_key], &format!("{service}/{routing_key}"))
}

/// Join `parts` into a DNS-1123 label with a short hash of `identity` appended.
///
/// Sanitising can map distinct inputs to the same text (`a.b` and `a_b`), so the
/// hash keeps results distinct. The output never exceeds 63 characters.
fn hashed_dns_label(parts: &[&str], identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    let mut suffix = String::with_capacity(NAME_HASH_LEN);
    for byte in digest.iter().take(NAME_HASH_LEN / 2) {
        let _ = write!(suffix, "{byte:02x}");
    }

    let joined = parts
        .iter()
        .map(|part| sanitize(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let budget = DNS_LABEL_MAX_LEN - NAME_HASH_LEN - 1;
    let stem: String = joined.chars().take(budget).collect();
    let stem = stem.trim_end_matches('-');

    if stem.is_empty() {
        format!("l-{suffix}")
    } else {
        format!("{stem}-{suffix}")
    }
}

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, collapse runs, trim the ends.
fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod listener_tests;
