// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use kube::Client;
use skupper_dmc::{
    apiserver,
    cluster::{ClusterInterface, KubeCluster},
    config::{ControllerConfig, LogFormat},
    constants::{CONTROLLER_NAME, CONTROLLER_VERSION},
    reconciler::Reconciler,
    registry::ServiceRegistry,
    watch::WatchRegistry,
};
use std::sync::Arc;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let config = ControllerConfig::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name(CONTROLLER_NAME)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

fn init_tracing(format: LogFormat) {
    // Format: timestamp file:line LEVEL message
    // Respects RUST_LOG if set, otherwise defaults to INFO level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: ControllerConfig) -> Result<()> {
    init_tracing(config.log_format);

    info!("Starting Skupper dynamic multichannel controller v{CONTROLLER_VERSION}");
    debug!(?config, "Loaded configuration");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    let namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());
    info!("Watching namespace {namespace}");

    let cluster: Arc<dyn ClusterInterface> = Arc::new(KubeCluster::new(client, namespace));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&cluster), ServiceRegistry::new()));

    // Baseline first, so the first watch events land on a populated registry.
    reconciler.start().await;

    let watches = WatchRegistry::new(cluster);
    let watch_errors = watches.errors();

    // None of these should ever return; if one does, exit the process.
    tokio::select! {
        () = Arc::clone(&reconciler).run(&watches) => {
            error!("CRITICAL: reconciliation engine exited unexpectedly");
            anyhow::bail!("reconciliation engine exited unexpectedly")
        }
        () = watch_errors.run_reporter() => {
            anyhow::bail!("watch error reporter exited unexpectedly")
        }
        result = apiserver::serve(config.api_addr(), Arc::clone(&reconciler)) => {
            error!("CRITICAL: status API exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("status API exited unexpectedly without error")
        }
        () = shutdown_signal() => {
            info!("Shutdown signal received, stopping controller");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
