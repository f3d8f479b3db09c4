// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `watch.rs`

use super::*;
use crate::cluster::WatchEvent;
use crate::test_support::{config_map, site_with_keys, FakeCluster};
use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn failure() -> ClusterError {
    ClusterError::WatchFailed {
        kind: "Site",
        reason: "too old resource version".to_string(),
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

async fn wait_for_subscriptions(cluster: &FakeCluster, kind: &'static str, count: usize) {
    timeout(WAIT, async {
        while cluster.subscription_count(kind) < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for resubscription");
}

// ========== Error aggregation ==========

#[tokio::test]
async fn test_eleven_failures_emit_one_summary() {
    let tracker = WatchErrorTracker::new();
    for _ in 0..11 {
        tracker.record(ResourceKind::Sites, &failure()).await;
    }

    let summary = tracker.close_window().await.expect("summary expected");
    assert_eq!(summary.count, 11);
    assert!(summary.last_error.contains("too old resource version"));
    assert!(summary.to_string().contains("11 failures in the last minute"));

    // The counter resets with the window.
    assert_eq!(tracker.close_window().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_reporter_emits_one_line_per_noisy_window() {
    let tracker = Arc::new(WatchErrorTracker::new());
    let emitted = Arc::new(Mutex::new(Vec::new()));
    let reporter = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        let emitted = Arc::clone(&emitted);
        async move {
            tracker
                .run_reporter_with(move |summary: &WatchErrorSummary| {
                    emitted.lock().unwrap().push(summary.clone());
                })
                .await;
        }
    });

    for _ in 0..11 {
        tracker.record(ResourceKind::Sites, &failure()).await;
    }
    tokio::time::sleep(Duration::from_secs(WATCH_ERROR_WINDOW_SECS + 1)).await;

    {
        let emitted = emitted.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].count, 11);
    }

    // A quiet window emits nothing.
    for _ in 0..3 {
        tracker.record(ResourceKind::Sites, &failure()).await;
    }
    tokio::time::sleep(Duration::from_secs(WATCH_ERROR_WINDOW_SECS)).await;
    assert_eq!(emitted.lock().unwrap().len(), 1);

    reporter.abort();
}

#[tokio::test]
async fn test_few_failures_emit_nothing() {
    let tracker = WatchErrorTracker::new();
    for _ in 0..3 {
        tracker.record(ResourceKind::ConfigMaps, &failure()).await;
    }
    assert_eq!(tracker.close_window().await, None);
}

#[tokio::test]
async fn test_threshold_is_exclusive() {
    let tracker = WatchErrorTracker::new();
    for _ in 0..WATCH_ERROR_THRESHOLD {
        tracker.record(ResourceKind::Services, &failure()).await;
    }
    assert_eq!(tracker.close_window().await, None);
}

#[tokio::test]
async fn test_summary_names_last_failure() {
    let tracker = WatchErrorTracker::new();
    for _ in 0..11 {
        tracker.record(ResourceKind::Sites, &failure()).await;
    }
    let last = ClusterError::Request {
        operation: "watch",
        kind: "ConfigMap",
        reason: "forbidden".to_string(),
    };
    tracker.record(ResourceKind::ConfigMaps, &last).await;

    let summary = tracker.close_window().await.unwrap();
    assert_eq!(summary.count, 12);
    assert!(summary.last_error.starts_with("ConfigMaps: "));
    assert!(summary.last_error.contains("forbidden"));
}

// ========== Supervisor ==========

#[tokio::test]
async fn test_subscription_starts_on_first_registration() {
    let cluster = Arc::new(FakeCluster::new());
    let watches = WatchRegistry::new(cluster.clone());

    tokio::task::yield_now().await;
    assert!(!watches.sites.is_started());
    assert_eq!(cluster.subscription_count("Sites"), 0);

    watches.sites.register(|_, _| {});
    assert!(watches.sites.is_started());
    wait_for_subscriptions(&cluster, "Sites", 1).await;
}

#[tokio::test]
async fn test_handlers_share_one_subscription_and_run_in_order() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.config_map_script.lock().unwrap().push_back(Ok(vec![
        Ok(WatchEvent::new(EventType::Added, config_map("one", true, &[]))),
        Ok(WatchEvent::new(EventType::Deleted, config_map("two", true, &[]))),
    ]));
    let watches = WatchRegistry::new(cluster.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = tx.clone();
    watches.config_maps.register(move |event, cm: &ConfigMap| {
        let _ = first.send(format!("first {event} {}", cm.name_any()));
    });
    let second = tx;
    watches.config_maps.register(move |event, cm: &ConfigMap| {
        let _ = second.send(format!("second {event} {}", cm.name_any()));
    });

    assert_eq!(watches.config_maps.handler_count(), 2);

    // Registration happens before the spawned loop first runs, so both handlers
    // see the whole script.
    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(recv(&mut rx).await);
    }
    assert_eq!(
        seen,
        vec![
            "first ADDED one",
            "second ADDED one",
            "first DELETED two",
            "second DELETED two",
        ]
    );
    wait_for_subscriptions(&cluster, "ConfigMaps", 2).await;
    assert_eq!(cluster.subscription_count("ConfigMaps"), 2);
}

#[tokio::test]
async fn test_resubscribes_after_clean_end_error_item_and_failed_subscribe() {
    let cluster = Arc::new(FakeCluster::new());
    {
        let mut script = cluster.site_script.lock().unwrap();
        script.push_back(Ok(vec![Ok(WatchEvent::new(
            EventType::Added,
            site_with_keys("west", &["rk1"]),
        ))]));
        script.push_back(Ok(vec![Err(failure())]));
        script.push_back(Err(failure()));
        script.push_back(Ok(vec![Ok(WatchEvent::new(
            EventType::Modified,
            site_with_keys("west", &["rk2"]),
        ))]));
    }
    let watches = WatchRegistry::new(cluster.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    watches.sites.register(move |event, _site: &Site| {
        let _ = tx.send(event);
    });

    assert_eq!(recv(&mut rx).await, EventType::Added);
    assert_eq!(recv(&mut rx).await, EventType::Modified);
    wait_for_subscriptions(&cluster, "Sites", 5).await;

    // The error item and the failed subscription count; the clean end does not.
    let errors = watches.errors();
    for _ in 0..9 {
        errors.record(ResourceKind::Sites, &failure()).await;
    }
    let summary = errors.close_window().await.expect("eleven failures in window");
    assert_eq!(summary.count, 11);
}

#[tokio::test]
async fn test_error_item_stops_delivery_of_that_subscription() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.site_script.lock().unwrap().push_back(Ok(vec![
        Err(failure()),
        Ok(WatchEvent::new(EventType::Added, site_with_keys("stale", &[]))),
    ]));
    cluster.site_script.lock().unwrap().push_back(Ok(vec![Ok(WatchEvent::new(
        EventType::Added,
        site_with_keys("fresh", &[]),
    ))]));
    let watches = WatchRegistry::new(cluster.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    watches.sites.register(move |_, site: &Site| {
        let _ = tx.send(site.name_any());
    });

    assert_eq!(recv(&mut rx).await, "fresh");
}
