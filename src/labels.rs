// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label and annotation constants, plus the ownership helpers built on them.
//!
//! Two markers matter to the reconciliation engine:
//!
//! - [`DMC_SERVICE_LABEL`] on a `ConfigMap` declares a Service for the controller.
//! - [`DMC_CONTROLLED_ANNOTATION`] on any object the controller creates marks it as
//!   controller-owned, so later list/watch passes can tell it apart from objects
//!   created by people or other controllers.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of` on resources created by this controller
pub const PART_OF_SKUPPER: &str = "skupper";

/// Component value for listener resources
pub const COMPONENT_LISTENER: &str = "dynamic-listener";

// ============================================================================
// Controller-Specific Labels and Annotations
// ============================================================================

/// Label that turns a `ConfigMap` into a Service definition for this controller
pub const DMC_SERVICE_LABEL: &str = "dmc.skupper.io/service";

/// Annotation marking an object as created and managed by this controller
pub const DMC_CONTROLLED_ANNOTATION: &str = "dmc.skupper.io/controlled";

/// Value carried by [`DMC_SERVICE_LABEL`] and [`DMC_CONTROLLED_ANNOTATION`]
pub const MARKER_VALUE: &str = "true";

/// Look up an annotation value on an object's metadata.
#[must_use]
pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Whether the object carries this controller's ownership annotation.
#[must_use]
pub fn is_controlled(meta: &ObjectMeta) -> bool {
    annotation(meta, DMC_CONTROLLED_ANNOTATION) == Some(MARKER_VALUE)
}

/// Add the ownership annotation, keeping any annotations already present.
pub fn mark_controlled(meta: &mut ObjectMeta) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(DMC_CONTROLLED_ANNOTATION.to_string(), MARKER_VALUE.to_string());
}

/// Whether a `ConfigMap` carries the controller-recognition label.
#[must_use]
pub fn has_service_label(meta: &ObjectMeta) -> bool {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(DMC_SERVICE_LABEL))
        .is_some_and(|value| value == MARKER_VALUE)
}

/// Standard labels applied to every listener resource the controller creates.
#[must_use]
pub fn listener_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            K8S_MANAGED_BY.to_string(),
            crate::constants::CONTROLLER_NAME.to_string(),
        ),
        (K8S_PART_OF.to_string(), PART_OF_SKUPPER.to_string()),
        (K8S_COMPONENT.to_string(), COMPONENT_LISTENER.to_string()),
    ])
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
