// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service entity.
//!
//! A [`Service`] is defined by one controller-labeled `ConfigMap`:
//!
//! ```yaml
//! apiVersion: v1
//! kind: ConfigMap
//! metadata:
//!   name: orders                       # Service name
//!   labels:
//!     dmc.skupper.io/service: "true"
//! data:
//!   prefix: orders                     # optional, defaults to the name
//!   port: "9000"
//! ```
//!
//! It owns one [`Listener`] per routing key it tracks. The methods here only
//! compute and apply in-memory changes; the reconciler turns the returned deltas
//! into cluster calls.

use crate::cluster_errors::ServiceConfigError;
use crate::constants::{CONFIG_KEY_PORT, CONFIG_KEY_PREFIX};
use crate::crd::Listener as ListenerResource;
use crate::labels;
use crate::listener::{listener_host, listener_resource_name, Listener};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Listener changes produced by one key reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyDelta {
    /// Listeners activated by this pass. Each needs its resource created.
    pub added: Vec<Listener>,
    /// Listeners dropped by this pass, already deactivated. Each needs its resource deleted.
    pub removed: Vec<Listener>,
}

impl KeyDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of matching existing Listener resources against a Service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Adoption {
    /// Routing keys recorded as active listeners.
    pub adopted: Vec<String>,
    /// Names of owned resources whose spec no longer matches the Service.
    pub stale: Vec<String>,
}

/// A logical service: a prefix, a backend port, and one listener per routing key.
#[derive(Clone, Debug)]
pub struct Service {
    name: String,
    prefix: String,
    port: i32,
    listeners: BTreeMap<String, Listener>,
    registered_at: DateTime<Utc>,
}

impl Service {
    /// A Service with no listeners.
    #[must_use]
    pub fn new(name: &str, prefix: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            port: i32::from(port),
            listeners: BTreeMap::new(),
            registered_at: Utc::now(),
        }
    }

    /// Build a Service from a labeled `ConfigMap`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `ConfigMap` is unnamed, has no `port`, or the port
    /// is not an integer in 1-65535.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, ServiceConfigError> {
        let (name, prefix, port) = parse_config_map(config_map)?;
        Ok(Self::new(&name, &prefix, port))
    }

    /// Whether `config_map` still describes this Service's prefix and port.
    #[must_use]
    pub fn config_matches(&self, config_map: &ConfigMap) -> bool {
        match parse_config_map(config_map) {
            Ok((_, prefix, port)) => prefix == self.prefix && i32::from(port) == self.port,
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn port(&self) -> i32 {
        self.port
    }

    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Listeners keyed by listener name.
    #[must_use]
    pub fn listeners(&self) -> &BTreeMap<String, Listener> {
        &self.listeners
    }

    #[must_use]
    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.get(name)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.listeners.values().filter(|l| l.is_active()).count()
    }

    /// Routing keys of the active listeners.
    #[must_use]
    pub fn active_keys(&self) -> BTreeSet<String> {
        self.listeners
            .values()
            .filter(|l| l.is_active())
            .map(|l| l.routing_key().to_string())
            .collect()
    }

    /// Bring the listener set in line with `available`.
    ///
    /// New keys get a listener that is created and activated. Listeners whose key
    /// is gone are deactivated and dropped. Listeners whose key remains are left
    /// as they are, except that an inactive one is activated again. Calling this
    /// twice with the same set returns an empty delta the second time.
    pub fn reconcile_keys(&mut self, available: &BTreeSet<String>) -> KeyDelta {
        let mut delta = KeyDelta::default();

        let gone: Vec<String> = self
            .listeners
            .values()
            .filter(|l| !available.contains(l.routing_key()))
            .map(|l| l.name().to_string())
            .collect();
        for name in gone {
            if let Some(mut listener) = self.listeners.remove(&name) {
                listener.deactivate();
                delta.removed.push(listener);
            }
        }

        for key in available {
            let listener = self
                .listeners
                .entry(key.clone())
                .or_insert_with(|| Listener::new(&self.name, key, self.port));
            if listener.activate(&self.prefix) {
                delta.added.push(listener.clone());
            }
        }

        if !delta.is_empty() {
            debug!(
                service = %self.name,
                added = delta.added.len(),
                removed = delta.removed.len(),
                "Reconciled routing keys"
            );
        }
        delta
    }

    /// Record existing Listener resources owned by this Service as active listeners.
    ///
    /// A resource belongs to this Service when it carries the ownership annotation
    /// and its name is the resource name for (this Service, its routing key).
    /// Matching resources with a different port or host are reported as stale and not
    /// adopted. Listeners already tracked are left alone.
    pub fn reconcile_listeners_in(&mut self, resources: &[ListenerResource]) -> Adoption {
        let mut adoption = Adoption::default();

        for resource in resources {
            if !labels::is_controlled(&resource.metadata) {
                continue;
            }
            let key = &resource.spec.routing_key;
            if resource.name_any() != listener_resource_name(&self.name, key) {
                continue;
            }
            if resource.spec.port != self.port
                || resource.spec.host != listener_host(&self.prefix, &self.name, key)
            {
                adoption.stale.push(resource.name_any());
                continue;
            }
            if self.listeners.contains_key(key) {
                continue;
            }
            self.listeners
                .insert(key.clone(), Listener::adopted(&self.name, &resource.spec));
            adoption.adopted.push(key.clone());
        }

        adoption
    }

    /// Resources for active listeners that are missing from `existing`.
    #[must_use]
    pub fn reconcile_listeners_out(
        &self,
        namespace: &str,
        existing: &[ListenerResource],
    ) -> Vec<ListenerResource> {
        let present: BTreeSet<String> = existing.iter().map(|r| r.name_any()).collect();
        self.listeners
            .values()
            .filter(|l| !present.contains(&l.resource_name()))
            .filter_map(|l| l.to_resource(namespace))
            .collect()
    }

    /// Resource names this Service expects to exist.
    #[must_use]
    pub fn expected_resource_names(&self) -> BTreeSet<String> {
        self.listeners
            .values()
            .filter(|l| l.is_active())
            .map(Listener::resource_name)
            .collect()
    }

    /// Deactivate and drop every listener.
    ///
    /// Returns the listeners that were active, deactivated, so their resources can
    /// be deleted.
    pub fn destroy(&mut self) -> Vec<Listener> {
        std::mem::take(&mut self.listeners)
            .into_values()
            .filter_map(|mut listener| listener.deactivate().then_some(listener))
            .collect()
    }
}

fn parse_config_map(config_map: &ConfigMap) -> Result<(String, String, u16), ServiceConfigError> {
    let name = config_map
        .metadata
        .name
        .clone()
        .ok_or(ServiceConfigError::Unnamed)?;
    let data = config_map.data.as_ref();

    let prefix = data
        .and_then(|d| d.get(CONFIG_KEY_PREFIX))
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map_or_else(|| name.clone(), str::to_string);

    let raw_port = data
        .and_then(|d| d.get(CONFIG_KEY_PORT))
        .ok_or_else(|| ServiceConfigError::MissingKey {
            config_map: name.clone(),
            key: CONFIG_KEY_PORT,
        })?;
    let port = raw_port
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ServiceConfigError::InvalidPort {
            config_map: name.clone(),
            value: raw_port.clone(),
        })?;

    Ok((name, prefix, port))
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
