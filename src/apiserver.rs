// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Health and read-only status HTTP API.
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | `GET` | `/healthz` | `Ok` |
//! | `GET` | `/metrics` | Prometheus text |
//! | `GET` | `/api/v1alpha1/services` | [`ServiceSummary`] list |
//! | `GET` | `/api/v1alpha1/services/{sname}/instances` | [`InstanceSummary`] list |
//! | `GET` | `/api/v1alpha1/services/{sname}/instances/{iname}` | one [`InstanceSummary`] |
//!
//! Unknown services and instances return `404` with a JSON error body.

use crate::constants::{API_PATH_PREFIX, HEALTH_PATH, METRICS_PATH};
use crate::listener::Listener;
use crate::metrics;
use crate::reconciler::Reconciler;
use crate::service::Service;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// One Service as reported by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub name: String,
    pub prefix: String,
    pub port: i32,
    pub listeners: usize,
    pub active_listeners: usize,
    pub registered_at: DateTime<Utc>,
}

impl From<&Service> for ServiceSummary {
    fn from(service: &Service) -> Self {
        Self {
            name: service.name().to_string(),
            prefix: service.prefix().to_string(),
            port: service.port(),
            listeners: service.listeners().len(),
            active_listeners: service.active_count(),
            registered_at: service.registered_at(),
        }
    }
}

/// One listener as reported by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub name: String,
    pub routing_key: String,
    pub resource_name: String,
    pub port: i32,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// A platform Service named after the host exists.
    pub exposed: bool,
}

impl InstanceSummary {
    fn new(listener: &Listener, reconciler: &Reconciler) -> Self {
        Self {
            name: listener.name().to_string(),
            routing_key: listener.routing_key().to_string(),
            resource_name: listener.resource_name(),
            port: listener.port(),
            active: listener.is_active(),
            host: listener.host().map(str::to_string),
            exposed: listener.host().is_some_and(|h| reconciler.is_exposed(h)),
        }
    }
}

/// API errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ApiError {
    #[error("service '{0}' not found")]
    ServiceNotFound(String),

    #[error("instance '{instance}' not found in service '{service}'")]
    InstanceNotFound { service: String, instance: String },

    #[error("failed to encode metrics: {0}")]
    Metrics(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::ServiceNotFound(_) | Self::InstanceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Router over `reconciler`'s state.
pub fn router(reconciler: Arc<Reconciler>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(healthz))
        .route(METRICS_PATH, get(metrics_text))
        .route(&format!("{API_PATH_PREFIX}/services"), get(list_services))
        .route(
            &format!("{API_PATH_PREFIX}/services/{{sname}}/instances"),
            get(list_instances),
        )
        .route(
            &format!("{API_PATH_PREFIX}/services/{{sname}}/instances/{{iname}}"),
            get(get_instance),
        )
        .with_state(reconciler)
}

/// Serve the API on `addr` until the process exits.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, reconciler: Arc<Reconciler>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Status API listening on {addr}");
    axum::serve(listener, router(reconciler)).await?;
    Ok(())
}

pub async fn healthz() -> &'static str {
    "Ok"
}

/// # Errors
///
/// Returns [`ApiError::Metrics`] if encoding fails.
pub async fn metrics_text() -> Result<impl IntoResponse, ApiError> {
    let body = metrics::gather_metrics().map_err(|e| {
        error!("Failed to gather metrics: {e}");
        ApiError::Metrics(e.to_string())
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

pub async fn list_services(State(reconciler): State<Arc<Reconciler>>) -> Json<Vec<ServiceSummary>> {
    debug!("GET services");
    let services = reconciler.snapshot().await;
    Json(services.iter().map(ServiceSummary::from).collect())
}

/// # Errors
///
/// Returns [`ApiError::ServiceNotFound`] for an unknown service.
pub async fn list_instances(
    State(reconciler): State<Arc<Reconciler>>,
    Path(sname): Path<String>,
) -> Result<Json<Vec<InstanceSummary>>, ApiError> {
    debug!(service = %sname, "GET instances");
    let service = reconciler
        .service(&sname)
        .await
        .ok_or_else(|| ApiError::ServiceNotFound(sname.clone()))?;
    Ok(Json(
        service
            .listeners()
            .values()
            .map(|l| InstanceSummary::new(l, &reconciler))
            .collect(),
    ))
}

/// # Errors
///
/// Returns a not-found error for an unknown service or instance.
pub async fn get_instance(
    State(reconciler): State<Arc<Reconciler>>,
    Path((sname, iname)): Path<(String, String)>,
) -> Result<Json<InstanceSummary>, ApiError> {
    debug!(service = %sname, instance = %iname, "GET instance");
    let service = reconciler
        .service(&sname)
        .await
        .ok_or_else(|| ApiError::ServiceNotFound(sname.clone()))?;
    let listener = service
        .listener(&iname)
        .ok_or(ApiError::InstanceNotFound {
            service: sname,
            instance: iname.clone(),
        })?;
    Ok(Json(InstanceSummary::new(listener, &reconciler)))
}

#[cfg(test)]
#[path = "apiserver_tests.rs"]
mod apiserver_tests;
