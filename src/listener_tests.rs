// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `listener.rs`

use super::*;
use crate::labels::{is_controlled, K8S_MANAGED_BY};

#[test]
fn test_new_listener_is_inactive() {
    let listener = Listener::new("svc-a", "rk1", 9000);
    assert!(!listener.is_active());
    assert_eq!(listener.host(), None);
    assert_eq!(listener.name(), "rk1");
    assert_eq!(listener.routing_key(), "rk1");
    assert_eq!(listener.service(), "svc-a");
    assert_eq!(listener.port(), 9000);
}

#[test]
fn test_activate_assigns_host() {
    let mut listener = Listener::new("svc-a", "rk1", 9000);
    assert!(listener.activate("a"));
    assert!(listener.is_active());

    let host = listener.host().unwrap();
    assert!(host.starts_with("a-rk1-"), "unexpected host {host}");
    assert_eq!(host.len(), "a-rk1-".len() + NAME_HASH_LEN);
}

#[test]
fn test_activate_is_idempotent() {
    let mut listener = Listener::new("svc-a", "rk1", 9000);
    assert!(listener.activate("a"));
    let host = listener.host().map(str::to_string);

    assert!(!listener.activate("other-prefix"));
    assert_eq!(listener.host().map(str::to_string), host);
}

#[test]
fn test_deactivate_clears_host() {
    let mut listener = Listener::new("svc-a", "rk1", 9000);
    listener.activate("a");

    assert!(listener.deactivate());
    assert!(!listener.is_active());
    assert_eq!(listener.host(), None);

    assert!(!listener.deactivate());
}

#[test]
fn test_inactive_listener_has_no_resource() {
    let listener = Listener::new("svc-a", "rk1", 9000);
    assert!(listener.to_resource("ns").is_none());
}

#[test]
fn test_active_listener_resource_shape() {
    let mut listener = Listener::new("svc-a", "rk1", 9000);
    listener.activate("a");

    let resource = listener.to_resource("ns").unwrap();
    assert_eq!(resource.metadata.name.as_deref(), Some(listener.resource_name().as_str()));
    assert_eq!(resource.metadata.namespace.as_deref(), Some("ns"));
    assert_eq!(resource.spec.routing_key, "rk1");
    assert_eq!(resource.spec.port, 9000);
    assert_eq!(Some(resource.spec.host.as_str()), listener.host());
    assert!(is_controlled(&resource.metadata));
    assert_eq!(
        resource
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(K8S_MANAGED_BY))
            .map(String::as_str),
        Some(crate::constants::CONTROLLER_NAME)
    );
}

#[test]
fn test_adopted_listener_keeps_host() {
    let spec = ListenerSpec {
        routing_key: "rk1".to_string(),
        host: "existing-host".to_string(),
        port: 9000,
        tls_credentials: None,
    };
    let listener = Listener::adopted("svc-a", &spec);
    assert!(listener.is_active());
    assert_eq!(listener.host(), Some("existing-host"));
    assert_eq!(listener.name(), "rk1");
}

#[test]
fn test_resource_name_is_deterministic() {
    assert_eq!(
        listener_resource_name("svc-a", "rk1"),
        listener_resource_name("svc-a", "rk1")
    );
    assert_ne!(
        listener_resource_name("svc-a", "rk1"),
        listener_resource_name("svc-b", "rk1")
    );
}

#[test]
fn test_resource_name_is_dns_safe() {
    let name = listener_resource_name("Svc_A", "orders.backend/v1");
    assert!(name.starts_with("svc-a-orders-backend-v1-"), "unexpected name {name}");
    assert!(name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
}

#[test]
fn test_sanitized_collisions_stay_distinct() {
    assert_ne!(
        listener_resource_name("svc", "a.b"),
        listener_resource_name("svc", "a_b")
    );
}

#[test]
fn test_long_names_are_truncated() {
    let key = "k".repeat(200);
    let name = listener_resource_name("service", &key);
    let host = listener_host("prefix", "service", &key);
    assert!(name.len() <= DNS_LABEL_MAX_LEN);
    assert!(host.len() <= DNS_LABEL_MAX_LEN);
    assert!(!name.contains("--"));
}

#[test]
fn test_unprintable_key_still_gets_a_name() {
    let name = listener_resource_name("", "***");
    assert!(name.starts_with("l-"));
    assert_eq!(name.len(), 2 + NAME_HASH_LEN);
}
