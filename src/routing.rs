// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Routing key extraction from `Site` status.
//!
//! A Site reports the whole network it can see:
//!
//! ```yaml
//! status:
//!   network:
//!     - name: west
//!       services:
//!         - routingKey: backend
//!           connectors: [west/backend]
//!         - routingKey: frontend      # no connectors: not reachable
//! ```
//!
//! Every service entry with at least one connector contributes its routing key.
//! The walk is deliberately lenient: an entry of the wrong shape contributes
//! nothing and its well-formed siblings are still read.

use crate::crd::Site;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Collect the routing keys currently reachable according to one Site's status.
///
/// Never fails. Missing `status`, missing `network`, or malformed nested entries
/// yield fewer keys; each malformed entry is logged with the Site name.
#[must_use]
pub fn extract_routing_keys(site: &Site) -> BTreeSet<String> {
    let site_name = site.name_any();
    let mut keys = BTreeSet::new();

    let Some(network) = site.status.as_ref().and_then(|s| s.network.as_ref()) else {
        debug!(site = %site_name, "Site reports no network; no routing keys");
        return keys;
    };

    let Some(entries) = network.as_array() else {
        warn!(
            site = %site_name,
            "Unexpected Site status: network is not a list, ignoring it"
        );
        return keys;
    };

    for (index, entry) in entries.iter().enumerate() {
        collect_entry_keys(&site_name, index, entry, &mut keys);
    }

    debug!(site = %site_name, count = keys.len(), "Extracted routing keys");
    keys
}

fn collect_entry_keys(site_name: &str, index: usize, entry: &Value, keys: &mut BTreeSet<String>) {
    if !entry.is_object() {
        warn!(
            site = %site_name,
            entry = index,
            "Unexpected Site status: network entry is {}, expected an object",
            json_type(entry)
        );
        return;
    }

    let services = match entry.get("services") {
        Some(Value::Array(services)) => services,
        // A network site with nothing exposed yet.
        None | Some(Value::Null) => return,
        Some(other) => {
            warn!(
                site = %site_name,
                entry = index,
                "Unexpected Site status: services is {}, expected a list",
                json_type(other)
            );
            return;
        }
    };

    for service in services {
        let has_connectors = service
            .get("connectors")
            .and_then(Value::as_array)
            .is_some_and(|connectors| !connectors.is_empty());
        if !has_connectors {
            continue;
        }

        match service.get("routingKey").and_then(Value::as_str) {
            Some(key) if !key.is_empty() => {
                keys.insert(key.to_string());
            }
            _ => warn!(
                site = %site_name,
                entry = index,
                "Unexpected Site status: service with connectors has no routingKey"
            ),
        }
    }
}

/// Routing keys for the namespace given every Site listed in it.
///
/// The controller serves a single site per namespace. With no Site, or more than
/// one, there is nothing to route to and the result is empty.
#[must_use]
pub fn routing_keys_from_sites(sites: &[Site]) -> BTreeSet<String> {
    match sites {
        [] => BTreeSet::new(),
        [site] => extract_routing_keys(site),
        _ => {
            warn!(
                "Expecting no more than one site, got {}; no routing keys available",
                sites.len()
            );
            BTreeSet::new()
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod routing_tests;
