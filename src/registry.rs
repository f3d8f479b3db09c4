// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service Registry.
//!
//! Owns every [`Service`] by name and keeps that mapping in step with the
//! controller-labeled `ConfigMaps` in the namespace. A Service exists exactly
//! while a valid labeled `ConfigMap` of the same name exists.

use crate::labels;
use crate::listener::Listener;
use crate::service::Service;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Services registered and deregistered by one sync.
#[derive(Debug, Default)]
pub struct RegistryDelta {
    /// Names of newly registered Services.
    pub added: Vec<String>,
    /// Deregistered Services with the listeners that were active when they were destroyed.
    pub removed: Vec<(String, Vec<Listener>)>,
}

impl RegistryDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Name to Service mapping.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Service>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Service> {
        self.services.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Register a Service directly, replacing any Service of the same name.
    pub fn insert(&mut self, service: Service) {
        self.services.insert(service.name().to_string(), service);
    }

    /// Active listeners across all Services.
    #[must_use]
    pub fn active_listener_count(&self) -> usize {
        self.services.values().map(Service::active_count).sum()
    }

    /// Resource names every registered Service expects to exist.
    #[must_use]
    pub fn expected_resource_names(&self) -> BTreeSet<String> {
        self.services
            .values()
            .flat_map(Service::expected_resource_names)
            .collect()
    }

    /// Bring the registry in line with the `ConfigMaps` currently in the namespace.
    ///
    /// `config_maps` is the full listing; unlabeled ones are ignored. Labeled
    /// `ConfigMaps` with invalid data are logged and treated as absent. A Service
    /// whose `ConfigMap` is still present is left untouched even if the data
    /// changed; a warning is logged instead.
    pub fn sync_services(&mut self, config_maps: &[ConfigMap]) -> RegistryDelta {
        let mut delta = RegistryDelta::default();
        let mut desired: BTreeMap<String, &ConfigMap> = BTreeMap::new();

        for config_map in config_maps
            .iter()
            .filter(|cm| labels::has_service_label(&cm.metadata))
        {
            desired.insert(config_map.name_any(), config_map);
        }

        let gone: Vec<String> = self
            .services
            .keys()
            .filter(|name| !desired.contains_key(*name))
            .cloned()
            .collect();
        for name in gone {
            if let Some(mut service) = self.services.remove(&name) {
                let torn_down = service.destroy();
                info!(
                    service = %name,
                    listeners = torn_down.len(),
                    "Service ConfigMap removed; deregistering service"
                );
                delta.removed.push((name, torn_down));
            }
        }

        for (name, config_map) in desired {
            if let Some(existing) = self.services.get(&name) {
                if !existing.config_matches(config_map) {
                    warn!(
                        service = %name,
                        "Service ConfigMap data changed; changes are not applied to a registered service, recreate the ConfigMap to apply them"
                    );
                }
                continue;
            }

            match Service::from_config_map(config_map) {
                Ok(service) => {
                    info!(
                        service = %name,
                        prefix = %service.prefix(),
                        port = service.port(),
                        "Registering service"
                    );
                    self.services.insert(name.clone(), service);
                    delta.added.push(name);
                }
                Err(e) => {
                    warn!(service = %name, "Ignoring invalid service ConfigMap: {e}");
                }
            }
        }

        delta
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
