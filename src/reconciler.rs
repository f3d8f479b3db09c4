// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation engine.
//!
//! Keeps the Skupper `Listener` resources in the namespace equal to
//! (registered Services) x (routing keys reported by the Site).
//!
//! # Triggers
//!
//! - **`ConfigMap` events** re-run the registry sync. Services that appear are
//!   reconciled at once against the last observed routing keys; Services that
//!   disappear have their Listener resources deleted.
//! - **Site events** re-list the Sites, extract the routing keys and reconcile
//!   every Service against them, then audit the Listener resources.
//! - **Service events** only update which listener hosts are exposed.
//!
//! Watch handlers run synchronously and forward into one queue per trigger.
//! Each queue is drained by its own loop, so passes of the same trigger never
//! overlap while `ConfigMap` and Site passes interleave. All engine state sits
//! behind one async mutex that is released before any cluster call; each step
//! re-checks that its Service still exists after reacquiring it.
//!
//! # Failures
//!
//! A failed read aborts the current pass and leaves the in-memory state as it
//! was. A failed write is logged and the in-memory state is kept as attempted;
//! the next audit re-creates missing resources and deletes orphans.

use crate::cluster::{ClusterInterface, EventType};
use crate::cluster_errors::ClusterError;
use crate::constants::{KIND_CONFIG_MAP, KIND_LISTENER, KIND_SITE};
use crate::crd::{Listener as ListenerResource, Site};
use crate::labels;
use crate::metrics;
use crate::registry::{RegistryDelta, ServiceRegistry};
use crate::routing::routing_keys_from_sites;
use crate::service::{KeyDelta, Service};
use crate::watch::WatchRegistry;
use k8s_openapi::api::core::v1::{ConfigMap, Service as KubeService};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TRIGGER_STARTUP: &str = "startup";
const TRIGGER_CONFIG: &str = "config";
const TRIGGER_SITE: &str = "site";
const TRIGGER_AUDIT: &str = "audit";

/// Listener resources created and deleted by one audit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditDelta {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    /// Resources whose create or delete failed; the next audit retries them.
    pub failed: Vec<String>,
}

struct EngineState {
    registry: ServiceRegistry,
    // None until a Site has been read once.
    routing_keys: Option<BTreeSet<String>>,
}

/// A `ConfigMap` event as queued for the registry loop.
struct ConfigMapEvent {
    event_type: EventType,
    name: String,
    labeled: bool,
}

/// The reconciliation engine for one namespace.
pub struct Reconciler {
    cluster: Arc<dyn ClusterInterface>,
    state: tokio::sync::Mutex<EngineState>,
    exposed: Mutex<BTreeSet<String>>,
}

impl Reconciler {
    /// Engine over `cluster` starting from `registry` (normally empty).
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterInterface>, registry: ServiceRegistry) -> Self {
        Self {
            cluster,
            state: tokio::sync::Mutex::new(EngineState {
                registry,
                routing_keys: None,
            }),
            exposed: Mutex::new(BTreeSet::new()),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.cluster.namespace()
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Establish the baseline before any watch is opened.
    ///
    /// Syncs the registry, adopts owned Listener resources, reconciles against
    /// the Site currently in the namespace, audits, and seeds the exposed host
    /// set. Failures are logged; the watches retry from there.
    pub async fn start(&self) {
        let started = Instant::now();
        info!(namespace = %self.namespace(), "Starting reconciliation engine");

        if let Err(e) = self.sync_services().await {
            error!("Initial service sync failed; waiting for ConfigMap events: {e}");
        }

        match self.adopt_listener_resources().await {
            Ok(adopted) if !adopted.is_empty() => {
                info!("Adopted {} existing {KIND_LISTENER} resources", adopted.len());
            }
            Ok(_) => {}
            Err(e) => warn!("Could not list existing {KIND_LISTENER} resources: {e}"),
        }

        match self.cluster.list_sites().await {
            Ok(sites) => {
                self.reconcile_routing_keys(routing_keys_from_sites(&sites))
                    .await;
            }
            Err(e) => {
                metrics::record_error(KIND_SITE, e.error_type());
                warn!("Initial Site listing failed; waiting for Site events: {e}");
            }
        }

        if let Err(e) = self.audit_listener_resources().await {
            warn!("Initial {KIND_LISTENER} audit failed: {e}");
        }

        match self.cluster.list_services().await {
            Ok(services) => {
                let mut exposed = self.exposed.lock().unwrap_or_else(PoisonError::into_inner);
                exposed.extend(services.iter().map(|s| s.name_any()));
            }
            Err(e) => warn!("Could not list Services; exposure starts empty: {e}"),
        }

        metrics::record_reconciliation_success(TRIGGER_STARTUP, started.elapsed());
        let services = self.state.lock().await.registry.len();
        info!(services, "Reconciliation engine started");
    }

    /// Register the watch handlers and process events until the watches stop.
    ///
    /// The watches never stop on their own, so this only returns if every
    /// supervisor is dropped.
    pub async fn run(self: Arc<Self>, watches: &WatchRegistry) {
        let (config_tx, config_rx) = mpsc::unbounded_channel();
        watches
            .config_maps
            .register(move |event_type, config_map: &ConfigMap| {
                let _ = config_tx.send(ConfigMapEvent {
                    event_type,
                    name: config_map.name_any(),
                    labeled: labels::has_service_label(&config_map.metadata),
                });
            });

        let (site_tx, site_rx) = mpsc::unbounded_channel();
        watches.sites.register(move |event_type, site: &Site| {
            let _ = site_tx.send((event_type, site.name_any()));
        });

        let exposure = Arc::clone(&self);
        watches
            .services
            .register(move |event_type, service: &KubeService| {
                exposure.handle_service_event(event_type, service);
            });

        tokio::join!(
            self.run_config_loop(config_rx),
            self.run_site_loop(site_rx)
        );
    }

    async fn run_config_loop(&self, mut rx: mpsc::UnboundedReceiver<ConfigMapEvent>) {
        while let Some(event) = rx.recv().await {
            let mut relevant = self.is_relevant(&event).await;
            // Everything queued behind this event is covered by the same sync.
            while let Ok(next) = rx.try_recv() {
                relevant |= self.is_relevant(&next).await;
            }
            if !relevant {
                continue;
            }
            if let Err(e) = self.sync_services().await {
                error!("Service sync failed, keeping current services: {e}");
            }
        }
    }

    async fn is_relevant(&self, event: &ConfigMapEvent) -> bool {
        let relevant = event.labeled || self.state.lock().await.registry.get(&event.name).is_some();
        if relevant {
            debug!(config_map = %event.name, "{} {KIND_CONFIG_MAP}", event.event_type);
        }
        relevant
    }

    async fn run_site_loop(&self, mut rx: mpsc::UnboundedReceiver<(EventType, String)>) {
        while let Some(mut latest) = rx.recv().await {
            // Only the newest Site event matters.
            while let Ok(next) = rx.try_recv() {
                latest = next;
            }
            let (event_type, name) = latest;
            if let Err(e) = self.handle_site_event(event_type, &name).await {
                error!(site = %name, "Site reconciliation failed: {e}");
            }
        }
    }

    // ========================================================================
    // Registry sync
    // ========================================================================

    /// Sync the registry against a fresh `ConfigMap` listing.
    ///
    /// Deletes the Listener resources of deregistered Services and reconciles
    /// newly registered ones against the routing keys current at that point.
    ///
    /// # Errors
    ///
    /// Returns the listing error; the registry is left unchanged.
    pub async fn sync_services(&self) -> Result<RegistryDelta, ClusterError> {
        let started = Instant::now();

        let config_maps = match self.cluster.list_config_maps().await {
            Ok(config_maps) => config_maps,
            Err(e) => {
                metrics::record_error(KIND_CONFIG_MAP, e.error_type());
                metrics::record_reconciliation_error(TRIGGER_CONFIG, started.elapsed());
                return Err(e);
            }
        };

        let delta = {
            let mut state = self.state.lock().await;
            let delta = state.registry.sync_services(&config_maps);
            update_gauges(&state.registry);
            delta
        };

        let mut writes_ok = true;
        for (service, torn_down) in &delta.removed {
            for listener in torn_down {
                debug!(service = %service, listener = %listener.name(), "Tearing down listener");
                writes_ok &= self.delete_resource(&listener.resource_name()).await;
            }
        }

        // A Site pass may have run during the deletes above, so the keys are
        // read again for each new Service.
        for name in &delta.added {
            writes_ok &= self.reconcile_service(name, None).await.1;
        }

        record_pass(TRIGGER_CONFIG, started, writes_ok);
        Ok(delta)
    }

    // ========================================================================
    // Key reconciliation
    // ========================================================================

    /// Reconcile one Service against `available` and apply the result to the cluster.
    ///
    /// A Service that is no longer registered is skipped and yields an empty delta.
    pub async fn reconcile_service_keys(&self, name: &str, available: &BTreeSet<String>) -> KeyDelta {
        self.reconcile_service(name, Some(available)).await.0
    }

    /// Reconcile one Service against the routing keys current when its state is locked.
    ///
    /// Does nothing until a Site has been read.
    pub async fn reconcile_service_current_keys(&self, name: &str) -> KeyDelta {
        self.reconcile_service(name, None).await.0
    }

    /// Reconcile one Service against `available`, or the current routing keys when
    /// `None`. Also returns whether every resulting cluster write succeeded.
    async fn reconcile_service(
        &self,
        name: &str,
        available: Option<&BTreeSet<String>>,
    ) -> (KeyDelta, bool) {
        let delta = {
            let mut state = self.state.lock().await;
            let EngineState {
                registry,
                routing_keys,
            } = &mut *state;
            let Some(keys) = available.or(routing_keys.as_ref()) else {
                return (KeyDelta::default(), true);
            };
            let Some(service) = registry.get_mut(name) else {
                debug!(service = %name, "Service no longer registered; skipping key reconciliation");
                return (KeyDelta::default(), true);
            };
            let delta = service.reconcile_keys(keys);
            update_gauges(registry);
            delta
        };

        let mut writes_ok = true;
        for listener in &delta.removed {
            info!(service = %name, routing_key = %listener.routing_key(), "Routing key gone; removing listener");
            writes_ok &= self.delete_resource(&listener.resource_name()).await;
        }

        let namespace = self.namespace().to_string();
        for listener in &delta.added {
            info!(
                service = %name,
                routing_key = %listener.routing_key(),
                host = listener.host().unwrap_or_default(),
                "Routing key available; adding listener"
            );
            if let Some(resource) = listener.to_resource(&namespace) {
                writes_ok &= self.create_resource(&resource).await;
            }
        }

        (delta, writes_ok)
    }

    /// Record `keys` as the current routing keys and reconcile every Service against them.
    pub async fn reconcile_routing_keys(&self, keys: BTreeSet<String>) -> BTreeMap<String, KeyDelta> {
        self.apply_routing_keys(keys).await.0
    }

    async fn apply_routing_keys(&self, keys: BTreeSet<String>) -> (BTreeMap<String, KeyDelta>, bool) {
        let names = {
            let mut state = self.state.lock().await;
            state.routing_keys = Some(keys.clone());
            state.registry.names()
        };
        debug!(keys = keys.len(), services = names.len(), "Reconciling routing keys");

        let mut deltas = BTreeMap::new();
        let mut writes_ok = true;
        for name in names {
            let (delta, ok) = self.reconcile_service(&name, Some(&keys)).await;
            writes_ok &= ok;
            deltas.insert(name, delta);
        }
        (deltas, writes_ok)
    }

    /// Routing keys after an event on Site `name`.
    ///
    /// The event only says that something changed. The Sites are listed again and
    /// go through the same single-site rule as startup, so an old event never
    /// reapplies stale status and a second Site never contributes keys.
    ///
    /// # Errors
    ///
    /// Returns the listing error.
    pub async fn site_keys_for_event(
        &self,
        event_type: EventType,
        name: &str,
    ) -> Result<BTreeSet<String>, ClusterError> {
        if event_type == EventType::Deleted {
            info!(site = %name, "Site deleted");
        }
        let sites = self.cluster.list_sites().await?;
        if sites.is_empty() {
            info!("No Site in namespace; no routing keys available");
        }
        Ok(routing_keys_from_sites(&sites))
    }

    /// Full Site-triggered pass: refresh keys, reconcile every Service, audit.
    ///
    /// # Errors
    ///
    /// Returns the Site read error; nothing is changed in that case.
    pub async fn handle_site_event(&self, event_type: EventType, name: &str) -> Result<(), ClusterError> {
        let started = Instant::now();
        debug!(site = %name, "{event_type} {KIND_SITE}");

        let keys = match self.site_keys_for_event(event_type, name).await {
            Ok(keys) => keys,
            Err(e) => {
                metrics::record_error(KIND_SITE, e.error_type());
                metrics::record_reconciliation_error(TRIGGER_SITE, started.elapsed());
                return Err(e);
            }
        };

        let (_, mut writes_ok) = self.apply_routing_keys(keys).await;

        match self.audit_listener_resources().await {
            Ok(audit) => writes_ok &= audit.failed.is_empty(),
            Err(e) => {
                warn!("{KIND_LISTENER} audit failed: {e}");
                writes_ok = false;
            }
        }

        record_pass(TRIGGER_SITE, started, writes_ok);
        Ok(())
    }

    // ========================================================================
    // Adoption and audit
    // ========================================================================

    /// Record owned Listener resources already in the cluster as active listeners.
    ///
    /// Owned resources that match a Service by name but not by port or host are
    /// deleted so the next reconciliation re-creates them from the current config.
    ///
    /// # Errors
    ///
    /// Returns the listing error.
    pub async fn adopt_listener_resources(&self) -> Result<Vec<String>, ClusterError> {
        let existing = self.list_listener_resources().await?;

        let (adopted, stale) = {
            let mut state = self.state.lock().await;
            let mut adopted = Vec::new();
            let mut stale = Vec::new();
            for service in state.registry.iter_mut() {
                let adoption = service.reconcile_listeners_in(&existing);
                for key in adoption.adopted {
                    debug!(service = %service.name(), routing_key = %key, "Adopted listener");
                    adopted.push(crate::listener::listener_resource_name(service.name(), &key));
                }
                stale.extend(adoption.stale);
            }
            update_gauges(&state.registry);
            (adopted, stale)
        };

        for name in stale {
            warn!(listener = %name, "Existing {KIND_LISTENER} has a stale port or host; replacing it");
            self.delete_resource(&name).await;
        }

        Ok(adopted)
    }

    /// Make the Listener resources match the in-memory state.
    ///
    /// Re-creates resources missing for active listeners and deletes owned
    /// resources no active listener accounts for. Resources without the
    /// ownership annotation are never touched.
    ///
    /// # Errors
    ///
    /// Returns the listing error; nothing is changed in that case.
    pub async fn audit_listener_resources(&self) -> Result<AuditDelta, ClusterError> {
        let started = Instant::now();
        let existing = match self.list_listener_resources().await {
            Ok(existing) => existing,
            Err(e) => {
                metrics::record_reconciliation_error(TRIGGER_AUDIT, started.elapsed());
                return Err(e);
            }
        };

        let (missing, orphans) = {
            let state = self.state.lock().await;
            let namespace = self.namespace();
            let missing: Vec<ListenerResource> = state
                .registry
                .iter()
                .flat_map(|service| service.reconcile_listeners_out(namespace, &existing))
                .collect();
            let expected = state.registry.expected_resource_names();
            let orphans: Vec<String> = existing
                .iter()
                .filter(|r| labels::is_controlled(&r.metadata))
                .map(|r| r.name_any())
                .filter(|name| !expected.contains(name))
                .collect();
            (missing, orphans)
        };

        let mut delta = AuditDelta::default();

        for resource in missing {
            let name = resource.name_any();
            if !self.is_expected(&name).await {
                continue;
            }
            info!(listener = %name, "{KIND_LISTENER} missing; re-creating");
            if self.create_resource(&resource).await {
                delta.created.push(name);
            } else {
                delta.failed.push(name);
            }
        }

        for name in orphans {
            if self.is_expected(&name).await {
                continue;
            }
            info!(listener = %name, "Deleting orphaned {KIND_LISTENER}");
            if self.delete_resource(&name).await {
                delta.deleted.push(name);
            } else {
                delta.failed.push(name);
            }
        }

        record_pass(TRIGGER_AUDIT, started, delta.failed.is_empty());
        Ok(delta)
    }

    async fn is_expected(&self, resource_name: &str) -> bool {
        self.state
            .lock()
            .await
            .registry
            .expected_resource_names()
            .contains(resource_name)
    }

    async fn list_listener_resources(&self) -> Result<Vec<ListenerResource>, ClusterError> {
        self.cluster.list_listeners().await.inspect_err(|e| {
            metrics::record_error(KIND_LISTENER, e.error_type());
        })
    }

    // ========================================================================
    // Cluster writes
    // ========================================================================

    /// Create one Listener resource. An existing resource counts as success.
    async fn create_resource(&self, resource: &ListenerResource) -> bool {
        let name = resource.name_any();
        match self.cluster.create_listener(resource).await {
            Ok(()) => {
                metrics::record_resource_created(KIND_LISTENER);
                true
            }
            Err(e) if e.is_already_exists() => {
                debug!(listener = %name, "{KIND_LISTENER} already exists");
                true
            }
            Err(e) => {
                metrics::record_error(KIND_LISTENER, e.error_type());
                error!(listener = %name, "Failed to create {KIND_LISTENER} {name}: {e}");
                false
            }
        }
    }

    /// Delete one Listener resource. A missing resource counts as success.
    async fn delete_resource(&self, name: &str) -> bool {
        match self.cluster.delete_listener(name).await {
            Ok(()) => {
                metrics::record_resource_deleted(KIND_LISTENER);
                true
            }
            Err(e) if e.is_not_found() => {
                debug!(listener = %name, "{KIND_LISTENER} already gone");
                true
            }
            Err(e) => {
                metrics::record_error(KIND_LISTENER, e.error_type());
                error!(listener = %name, "Failed to delete {KIND_LISTENER} {name}: {e}");
                false
            }
        }
    }

    // ========================================================================
    // Exposure and read access
    // ========================================================================

    /// Track platform Services so listener hosts can be reported as exposed.
    pub fn handle_service_event(&self, event_type: EventType, service: &KubeService) {
        let name = service.name_any();
        let mut exposed = self.exposed.lock().unwrap_or_else(PoisonError::into_inner);
        match event_type {
            EventType::Added | EventType::Modified => {
                exposed.insert(name);
            }
            EventType::Deleted => {
                exposed.remove(&name);
            }
        }
    }

    /// Whether a platform Service named `host` exists.
    #[must_use]
    pub fn is_exposed(&self, host: &str) -> bool {
        self.exposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(host)
    }

    /// Copy of every registered Service.
    pub async fn snapshot(&self) -> Vec<Service> {
        self.state.lock().await.registry.iter().cloned().collect()
    }

    /// Copy of one registered Service.
    pub async fn service(&self, name: &str) -> Option<Service> {
        self.state.lock().await.registry.get(name).cloned()
    }

    /// Last routing keys observed, if a Site has been read.
    pub async fn routing_keys(&self) -> Option<BTreeSet<String>> {
        self.state.lock().await.routing_keys.clone()
    }
}

/// Record a pass as an error if any of its cluster writes failed.
fn record_pass(trigger: &str, started: Instant, writes_ok: bool) {
    if writes_ok {
        metrics::record_reconciliation_success(trigger, started.elapsed());
    } else {
        metrics::record_reconciliation_error(trigger, started.elapsed());
    }
}

fn update_gauges(registry: &ServiceRegistry) {
    metrics::set_registry_state(registry.len(), registry.active_listener_count());
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
