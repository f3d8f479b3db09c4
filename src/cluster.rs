// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster interface used by the reconciliation engine.
//!
//! [`ClusterInterface`] is the capability the engine calls for every read, write,
//! and watch subscription. [`KubeCluster`] implements it against the Kubernetes API
//! for a single namespace; tests substitute an in-memory double.
//!
//! Watches are raw API watches: each subscription delivers events until the API
//! server closes it, then ends. Restarting is the job of
//! [`crate::watch::WatchSupervisor`].

use crate::cluster_errors::ClusterError;
use crate::constants::{KIND_CONFIG_MAP, KIND_LISTENER, KIND_SERVICE, KIND_SITE};
use crate::crd::{Listener as ListenerResource, Site};
use crate::labels;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Service as KubeService};
use kube::api::{
    Api, DeleteParams, ListParams, PostParams, WatchEvent as KubeWatchEvent, WatchParams,
};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug, Display};
use tracing::{debug, info};

/// Type of change delivered by a watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
        })
    }
}

/// One (event-type, object) pair from a watch.
#[derive(Clone, Debug)]
pub struct WatchEvent<K> {
    pub event_type: EventType,
    pub object: K,
}

impl<K> WatchEvent<K> {
    #[must_use]
    pub fn new(event_type: EventType, object: K) -> Self {
        Self { event_type, object }
    }
}

/// A single watch subscription. Ends when the server closes the watch.
pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, ClusterError>>;

/// Resource kinds the controller watches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ConfigMaps,
    Services,
    Sites,
}

impl ResourceKind {
    /// Kind name as used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigMaps => "ConfigMaps",
            Self::Services => "Services",
            Self::Sites => "Sites",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the reconciliation engine needs from the cluster.
///
/// All calls are scoped to the controller's namespace. None of them carry an
/// explicit timeout; a stalled call stalls only the pass that issued it.
#[async_trait]
pub trait ClusterInterface: Send + Sync {
    /// Namespace every call is scoped to.
    fn namespace(&self) -> &str;

    async fn list_config_maps(&self) -> Result<Vec<ConfigMap>, ClusterError>;

    async fn list_services(&self) -> Result<Vec<KubeService>, ClusterError>;

    async fn list_sites(&self) -> Result<Vec<Site>, ClusterError>;

    async fn list_listeners(&self) -> Result<Vec<ListenerResource>, ClusterError>;

    /// Create a Listener resource. The object must already carry the ownership annotation.
    async fn create_listener(&self, listener: &ListenerResource) -> Result<(), ClusterError>;

    async fn delete_listener(&self, name: &str) -> Result<(), ClusterError>;

    async fn watch_config_maps(&self) -> Result<WatchStream<ConfigMap>, ClusterError>;

    async fn watch_services(&self) -> Result<WatchStream<KubeService>, ClusterError>;

    async fn watch_sites(&self) -> Result<WatchStream<Site>, ClusterError>;
}

/// [`ClusterInterface`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn list<K>(&self, kind: &'static str) -> Result<Vec<K>, ClusterError>
    where
        K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let list = self
            .api::<K>()
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::from_kube("list", kind, None, e))?;
        debug!(kind, count = list.items.len(), namespace = %self.namespace, "Listed resources");
        Ok(list.items)
    }

    async fn watch<K>(&self, kind: &'static str) -> Result<WatchStream<K>, ClusterError>
    where
        K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + 'static,
    {
        // Resource version "0" replays the current objects as ADDED events, so every
        // restarted watch begins with a full resync.
        let stream = self
            .api::<K>()
            .watch(&WatchParams::default(), "0")
            .await
            .map_err(|e| ClusterError::from_kube("watch", kind, None, e))?;

        Ok(stream
            .map_err(move |e| ClusterError::from_kube("watch", kind, None, e))
            .try_filter_map(move |event| async move {
                match event {
                    KubeWatchEvent::Added(obj) => Ok(Some(WatchEvent::new(EventType::Added, obj))),
                    KubeWatchEvent::Modified(obj) => {
                        Ok(Some(WatchEvent::new(EventType::Modified, obj)))
                    }
                    KubeWatchEvent::Deleted(obj) => {
                        Ok(Some(WatchEvent::new(EventType::Deleted, obj)))
                    }
                    KubeWatchEvent::Bookmark(_) => Ok(None),
                    KubeWatchEvent::Error(err) => Err(ClusterError::WatchFailed {
                        kind,
                        reason: format!("{err:?}"),
                    }),
                }
            })
            .boxed())
    }
}

#[async_trait]
impl ClusterInterface for KubeCluster {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_config_maps(&self) -> Result<Vec<ConfigMap>, ClusterError> {
        self.list::<ConfigMap>(KIND_CONFIG_MAP).await
    }

    async fn list_services(&self) -> Result<Vec<KubeService>, ClusterError> {
        self.list::<KubeService>(KIND_SERVICE).await
    }

    async fn list_sites(&self) -> Result<Vec<Site>, ClusterError> {
        self.list::<Site>(KIND_SITE).await
    }

    async fn list_listeners(&self) -> Result<Vec<ListenerResource>, ClusterError> {
        self.list::<ListenerResource>(KIND_LISTENER).await
    }

    async fn create_listener(&self, listener: &ListenerResource) -> Result<(), ClusterError> {
        let name = listener.name_any();
        let mut obj = listener.clone();
        obj.metadata.namespace = Some(self.namespace.clone());
        labels::mark_controlled(&mut obj.metadata);

        info!("Creating resource: {} {}", KIND_LISTENER, name);
        self.api::<ListenerResource>()
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| ClusterError::from_kube("create", KIND_LISTENER, Some(&name), e))?;
        Ok(())
    }

    async fn delete_listener(&self, name: &str) -> Result<(), ClusterError> {
        info!("Deleting resource: {} {}", KIND_LISTENER, name);
        self.api::<ListenerResource>()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ClusterError::from_kube("delete", KIND_LISTENER, Some(name), e))?;
        Ok(())
    }

    async fn watch_config_maps(&self) -> Result<WatchStream<ConfigMap>, ClusterError> {
        self.watch::<ConfigMap>(KIND_CONFIG_MAP).await
    }

    async fn watch_services(&self) -> Result<WatchStream<KubeService>, ClusterError> {
        self.watch::<KubeService>(KIND_SERVICE).await
    }

    async fn watch_sites(&self) -> Result<WatchStream<Site>, ClusterError> {
        self.watch::<Site>(KIND_SITE).await
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
