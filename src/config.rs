// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration from command-line flags and environment variables.

use crate::constants::{DEFAULT_API_BIND_ADDRESS, DEFAULT_API_PORT, TOKIO_WORKER_THREADS};
use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable lines with ANSI colours
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Skupper dynamic multichannel controller
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ControllerConfig {
    /// Namespace to watch. Defaults to the client's namespace (service account
    /// namespace in-cluster, current context otherwise).
    #[arg(long, env = "DMC_NAMESPACE")]
    pub namespace: Option<String>,

    /// Port of the health and status API
    #[arg(long, env = "DMC_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Address the health and status API binds to
    #[arg(long, env = "DMC_API_BIND_ADDRESS", default_value = DEFAULT_API_BIND_ADDRESS)]
    pub api_bind_address: IpAddr,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Tokio worker threads
    #[arg(long, env = "DMC_WORKER_THREADS", default_value_t = TOKIO_WORKER_THREADS)]
    pub worker_threads: usize,
}

impl ControllerConfig {
    /// Socket address of the status API.
    #[must_use]
    pub fn api_addr(&self) -> SocketAddr {
        SocketAddr::new(self.api_bind_address, self.api_port)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
