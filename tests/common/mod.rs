// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, PostParams},
    client::Client,
};
use skupper_dmc::labels::{DMC_SERVICE_LABEL, MARKER_VALUE};
use std::collections::BTreeMap;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Whether the Skupper Site and Listener CRDs are installed
pub async fn skupper_crds_installed(client: &Client) -> bool {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    for name in ["sites.skupper.io", "listeners.skupper.io"] {
        if crds.get_opt(name).await.ok().flatten().is_none() {
            eprintln!("Skipping integration test: CRD {name} is not installed");
            return false;
        }
    }
    true
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([
                ("test".to_string(), "integration".to_string()),
                ("managed-by".to_string(), "skupper-dmc-test".to_string()),
            ])),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            println!("Deleted test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Create a labeled service `ConfigMap`
pub async fn create_service_config_map(
    client: &Client,
    namespace: &str,
    name: &str,
    prefix: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);

    let cm = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                DMC_SERVICE_LABEL.to_string(),
                MARKER_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            ("prefix".to_string(), prefix.to_string()),
            ("port".to_string(), port.to_string()),
        ])),
        ..Default::default()
    };

    config_maps.create(&PostParams::default(), &cm).await?;
    println!("Created service ConfigMap: {namespace}/{name}");
    Ok(())
}
