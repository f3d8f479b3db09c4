// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures and an in-memory [`ClusterInterface`] for unit tests.

use crate::cluster::{ClusterInterface, WatchEvent, WatchStream};
use crate::cluster_errors::ClusterError;
use crate::constants::{CONFIG_KEY_PORT, CONFIG_KEY_PREFIX, KIND_LISTENER, KIND_SITE};
use crate::crd::{Listener as ListenerResource, Site, SiteSpec, SiteStatus};
use crate::labels::DMC_SERVICE_LABEL;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Service as KubeService};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const TEST_NAMESPACE: &str = "test-ns";

/// A `ConfigMap` with arbitrary data, optionally carrying the service label.
pub fn config_map(name: &str, labeled: bool, data: &[(&str, &str)]) -> ConfigMap {
    let labels = labeled
        .then(|| BTreeMap::from([(DMC_SERVICE_LABEL.to_string(), "true".to_string())]));
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            labels,
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

/// A labeled Service `ConfigMap` with `prefix` and `port`.
pub fn service_config_map(name: &str, prefix: &str, port: u16) -> ConfigMap {
    config_map(
        name,
        true,
        &[(CONFIG_KEY_PREFIX, prefix), (CONFIG_KEY_PORT, &port.to_string())],
    )
}

/// A Site whose status carries the given raw `network` value.
pub fn site_with_network(name: &str, network: Value) -> Site {
    let mut site = Site::new(name, SiteSpec::default());
    site.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    site.status = Some(SiteStatus {
        status: Some("Ready".to_string()),
        network: Some(network),
        ..Default::default()
    });
    site
}

/// A Site reporting each routing key with one connector.
pub fn site_with_keys(name: &str, keys: &[&str]) -> Site {
    let services: Vec<Value> = keys
        .iter()
        .map(|key| json!({ "routingKey": key, "connectors": [format!("{name}/{key}")] }))
        .collect();
    site_with_network(name, json!([{ "name": name, "services": services }]))
}

/// A platform Service with the given name.
pub fn kube_service(name: &str) -> KubeService {
    KubeService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn request_error(operation: &'static str, kind: &'static str) -> ClusterError {
    ClusterError::Request {
        operation,
        kind,
        reason: "injected failure".to_string(),
    }
}

/// Holds one `delete_listener` call open until released.
///
/// `entered` is notified when the call reaches the gate; the call then waits on
/// `release`.
#[derive(Clone, Default)]
pub struct DeleteGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

type ScriptedSubscription<K> = Result<Vec<Result<WatchEvent<K>, ClusterError>>, ClusterError>;

/// In-memory cluster.
///
/// Listener creates and deletes mutate an in-memory listener set and are recorded
/// in call order. Failures can be injected per operation. Watch subscriptions
/// replay scripted event batches; once the script runs out, further subscriptions
/// stay open without delivering anything.
#[derive(Default)]
pub struct FakeCluster {
    pub config_maps: Mutex<Vec<ConfigMap>>,
    pub services: Mutex<Vec<KubeService>>,
    pub sites: Mutex<Vec<Site>>,
    pub listeners: Mutex<BTreeMap<String, ListenerResource>>,

    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,

    pub fail_list_config_maps: Mutex<bool>,
    pub fail_list_sites: Mutex<bool>,
    /// Number of upcoming `create_listener` calls that fail.
    pub fail_next_creates: Mutex<usize>,
    /// Number of upcoming `delete_listener` calls that fail.
    pub fail_next_deletes: Mutex<usize>,
    pub delete_gate: Mutex<Option<DeleteGate>>,

    pub config_map_script: Mutex<VecDeque<ScriptedSubscription<ConfigMap>>>,
    pub service_script: Mutex<VecDeque<ScriptedSubscription<KubeService>>>,
    pub site_script: Mutex<VecDeque<ScriptedSubscription<Site>>>,
    pub subscriptions: Mutex<BTreeMap<&'static str, usize>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_maps(self, config_maps: Vec<ConfigMap>) -> Self {
        *self.config_maps.lock().unwrap() = config_maps;
        self
    }

    pub fn with_sites(self, sites: Vec<Site>) -> Self {
        *self.sites.lock().unwrap() = sites;
        self
    }

    pub fn with_listeners(self, listeners: Vec<ListenerResource>) -> Self {
        *self.listeners.lock().unwrap() = listeners
            .into_iter()
            .map(|l| (l.name_any(), l))
            .collect();
        self
    }

    pub fn with_services(self, services: Vec<KubeService>) -> Self {
        *self.services.lock().unwrap() = services;
        self
    }

    pub fn set_config_maps(&self, config_maps: Vec<ConfigMap>) {
        *self.config_maps.lock().unwrap() = config_maps;
    }

    pub fn set_sites(&self, sites: Vec<Site>) {
        *self.sites.lock().unwrap() = sites;
    }

    /// Hold the next `delete_listener` call at a gate.
    pub fn gate_next_delete(&self) -> DeleteGate {
        let gate = DeleteGate::default();
        *self.delete_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.lock().unwrap().keys().cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.created.lock().unwrap().clear();
        self.deleted.lock().unwrap().clear();
    }

    pub fn subscription_count(&self, kind: &'static str) -> usize {
        self.subscriptions
            .lock()
            .unwrap()
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    fn subscribe<K: Send + 'static>(
        &self,
        kind: &'static str,
        script: &Mutex<VecDeque<ScriptedSubscription<K>>>,
    ) -> Result<WatchStream<K>, ClusterError> {
        *self.subscriptions.lock().unwrap().entry(kind).or_insert(0) += 1;
        match script.lock().unwrap().pop_front() {
            Some(Ok(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(Err(err)) => Err(err),
            None => Ok(futures::stream::pending::<Result<WatchEvent<K>, ClusterError>>().boxed()),
        }
    }
}

#[async_trait]
impl ClusterInterface for FakeCluster {
    fn namespace(&self) -> &str {
        TEST_NAMESPACE
    }

    async fn list_config_maps(&self) -> Result<Vec<ConfigMap>, ClusterError> {
        if *self.fail_list_config_maps.lock().unwrap() {
            return Err(request_error("list", "ConfigMap"));
        }
        Ok(self.config_maps.lock().unwrap().clone())
    }

    async fn list_services(&self) -> Result<Vec<KubeService>, ClusterError> {
        Ok(self.services.lock().unwrap().clone())
    }

    async fn list_sites(&self) -> Result<Vec<Site>, ClusterError> {
        if *self.fail_list_sites.lock().unwrap() {
            return Err(request_error("list", KIND_SITE));
        }
        Ok(self.sites.lock().unwrap().clone())
    }

    async fn list_listeners(&self) -> Result<Vec<ListenerResource>, ClusterError> {
        Ok(self.listeners.lock().unwrap().values().cloned().collect())
    }

    async fn create_listener(&self, listener: &ListenerResource) -> Result<(), ClusterError> {
        let name = listener.name_any();
        self.created.lock().unwrap().push(name.clone());

        {
            let mut failures = self.fail_next_creates.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(request_error("create", KIND_LISTENER));
            }
        }

        let mut listeners = self.listeners.lock().unwrap();
        if listeners.contains_key(&name) {
            return Err(ClusterError::AlreadyExists {
                kind: KIND_LISTENER,
                name,
            });
        }
        listeners.insert(name, listener.clone());
        Ok(())
    }

    async fn delete_listener(&self, name: &str) -> Result<(), ClusterError> {
        let gate = self.delete_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.deleted.lock().unwrap().push(name.to_string());

        {
            let mut failures = self.fail_next_deletes.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(request_error("delete", KIND_LISTENER));
            }
        }

        match self.listeners.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                kind: KIND_LISTENER,
                name: name.to_string(),
            }),
        }
    }

    async fn watch_config_maps(&self) -> Result<WatchStream<ConfigMap>, ClusterError> {
        self.subscribe("ConfigMaps", &self.config_map_script)
    }

    async fn watch_services(&self) -> Result<WatchStream<KubeService>, ClusterError> {
        self.subscribe("Services", &self.service_script)
    }

    async fn watch_sites(&self) -> Result<WatchStream<Site>, ClusterError> {
        self.subscribe("Sites", &self.site_script)
    }
}
