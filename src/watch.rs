// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch supervision.
//!
//! The API server closes watches periodically, so a watch ending is routine.
//! [`WatchSupervisor`] resubscribes immediately whenever its subscription ends,
//! for any reason, and fans every delivered event out to its registered handlers
//! in registration order.
//!
//! Failures (a subscription that cannot be opened, or an error item on an open
//! one) are not logged individually above `debug`. [`WatchErrorTracker`] counts
//! them per one-minute window and emits one aggregated error line for a window
//! whose count exceeds the threshold. A clean end-of-stream is not a failure.

use crate::cluster::{ClusterInterface, EventType, ResourceKind, WatchStream};
use crate::cluster_errors::ClusterError;
use crate::constants::{WATCH_ERROR_THRESHOLD, WATCH_ERROR_WINDOW_SECS};
use crate::crd::Site;
use crate::metrics;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Service as KubeService};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

// ============================================================================
// Error aggregation
// ============================================================================

/// Aggregated failures for one closed window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchErrorSummary {
    pub count: u64,
    pub last_error: String,
}

impl fmt::Display for WatchErrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Watch errors exceeded threshold: {} failures in the last minute, last error: {}",
            self.count, self.last_error
        )
    }
}

#[derive(Debug, Default)]
struct ErrorWindow {
    count: u64,
    last_error: Option<String>,
}

/// Counts watch failures across every supervisor in the process.
#[derive(Debug, Default)]
pub struct WatchErrorTracker {
    window: tokio::sync::Mutex<ErrorWindow>,
}

impl WatchErrorTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one failure in the current window.
    pub async fn record(&self, kind: ResourceKind, error: &ClusterError) {
        debug!(resource = %kind, "Watch failure: {error}");
        metrics::record_watch_error(kind.as_str());

        let mut window = self.window.lock().await;
        window.count += 1;
        window.last_error = Some(format!("{kind}: {error}"));
    }

    /// Close the current window and start a new one.
    ///
    /// Returns a summary only if the closed window's count exceeded the threshold.
    pub async fn close_window(&self) -> Option<WatchErrorSummary> {
        let closed = std::mem::take(&mut *self.window.lock().await);
        if closed.count > WATCH_ERROR_THRESHOLD {
            Some(WatchErrorSummary {
                count: closed.count,
                last_error: closed.last_error.unwrap_or_default(),
            })
        } else {
            None
        }
    }

    /// Close a window every minute, logging one error line for a noisy window.
    ///
    /// Never returns.
    pub async fn run_reporter(&self) {
        self.run_reporter_with(|summary| error!("{summary}")).await;
    }

    /// Close a window every minute and pass each noisy window's summary to `emit`.
    ///
    /// Never returns.
    pub async fn run_reporter_with<F>(&self, mut emit: F)
    where
        F: FnMut(&WatchErrorSummary),
    {
        let period = Duration::from_secs(WATCH_ERROR_WINDOW_SECS);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if let Some(summary) = self.close_window().await {
                emit(&summary);
            }
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Event callback. Runs synchronously on the supervisor task.
pub type WatchHandler<K> = Arc<dyn Fn(EventType, &K) + Send + Sync>;

/// Opens one subscription.
pub type Subscribe<K> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<WatchStream<K>, ClusterError>> + Send + Sync>;

type HandlerList<K> = Arc<Mutex<Vec<WatchHandler<K>>>>;

/// One logical watch over one resource kind, shared by all of its handlers.
pub struct WatchSupervisor<K> {
    kind: ResourceKind,
    subscribe: Subscribe<K>,
    handlers: HandlerList<K>,
    started: AtomicBool,
    errors: Arc<WatchErrorTracker>,
}

impl<K> WatchSupervisor<K>
where
    K: Send + Sync + 'static,
{
    pub fn new<F>(kind: ResourceKind, errors: Arc<WatchErrorTracker>, subscribe: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<WatchStream<K>, ClusterError>> + Send + Sync + 'static,
    {
        Self {
            kind,
            subscribe: Arc::new(subscribe),
            handlers: Arc::new(Mutex::new(Vec::new())),
            started: AtomicBool::new(false),
            errors,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Whether the subscription loop is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Add a handler for every future event of this kind.
    ///
    /// The first registration starts the subscription loop on the current Tokio
    /// runtime; later registrations share it.
    pub fn register<F>(&self, handler: F)
    where
        F: Fn(EventType, &K) + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));

        if !self.started.swap(true, Ordering::SeqCst) {
            info!(resource = %self.kind, "Starting watch");
            tokio::spawn(supervise(
                self.kind,
                Arc::clone(&self.subscribe),
                Arc::clone(&self.handlers),
                Arc::clone(&self.errors),
            ));
        }
    }
}

async fn supervise<K>(
    kind: ResourceKind,
    subscribe: Subscribe<K>,
    handlers: HandlerList<K>,
    errors: Arc<WatchErrorTracker>,
) where
    K: Send + Sync + 'static,
{
    loop {
        metrics::record_watch_restart(kind.as_str());
        match subscribe().await {
            Ok(stream) => {
                if let Err(e) = deliver(stream, &handlers).await {
                    errors.record(kind, &e).await;
                } else {
                    debug!(resource = %kind, "Watch closed by server; resubscribing");
                }
            }
            Err(e) => errors.record(kind, &e).await,
        }
        tokio::task::yield_now().await;
    }
}

/// Dispatch every event of one subscription. Stops at the first error item.
async fn deliver<K>(
    mut stream: WatchStream<K>,
    handlers: &HandlerList<K>,
) -> Result<(), ClusterError> {
    while let Some(item) = stream.next().await {
        let event = item?;
        let current: Vec<WatchHandler<K>> = handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in &current {
            handler(event.event_type, &event.object);
        }
    }
    Ok(())
}

// ============================================================================
// Per-kind supervisors
// ============================================================================

/// The three supervisors the controller uses, sharing one error tracker.
pub struct WatchRegistry {
    pub config_maps: WatchSupervisor<ConfigMap>,
    pub services: WatchSupervisor<KubeService>,
    pub sites: WatchSupervisor<Site>,
    errors: Arc<WatchErrorTracker>,
}

impl WatchRegistry {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterInterface>) -> Self {
        let errors = Arc::new(WatchErrorTracker::new());

        let c = Arc::clone(&cluster);
        let config_maps = WatchSupervisor::new(
            ResourceKind::ConfigMaps,
            Arc::clone(&errors),
            move || {
                let c = Arc::clone(&c);
                async move { c.watch_config_maps().await }.boxed()
            },
        );

        let c = Arc::clone(&cluster);
        let services = WatchSupervisor::new(
            ResourceKind::Services,
            Arc::clone(&errors),
            move || {
                let c = Arc::clone(&c);
                async move { c.watch_services().await }.boxed()
            },
        );

        let c = cluster;
        let sites = WatchSupervisor::new(
            ResourceKind::Sites,
            Arc::clone(&errors),
            move || {
                let c = Arc::clone(&c);
                async move { c.watch_sites().await }.boxed()
            },
        );

        Self {
            config_maps,
            services,
            sites,
            errors,
        }
    }

    /// Tracker shared by all three supervisors.
    #[must_use]
    pub fn errors(&self) -> Arc<WatchErrorTracker> {
        Arc::clone(&self.errors)
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;
