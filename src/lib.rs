//! egressgate - Egress proxy gateway
//!
//! A forward proxy that decides, per request, whether outbound traffic may
//! leave the network.
//!
//! # Overview
//!
//! The policy engines and filters live in the `egressgate-core` crate; this
//! crate wires them to the environment and to the network:
//! - Configuration from environment variables, cached at first access
//! - A hyper based hosting engine handling CONNECT tunnels and plain HTTP
//! - Connection limiting and graceful shutdown
//! - Structured logging with JSON support
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use egressgate::config::{self, EnvVarConfig};
//! use egressgate::connection::ConnectionTracker;
//! use egressgate::proxy::ProxyEngine;
//! use egressgate_core::pipeline::{FilterConfiguration, FilterRegistry, FilterSource, SharedServices};
//! use egressgate_core::{PlatformProvider, ProxyMetrics};
//!
//! let config = EnvVarConfig::new();
//! let services = SharedServices::system(&config, Arc::new(ProxyMetrics::new())).unwrap();
//! let registry = FilterRegistry::new(&config, services);
//! let configuration = FilterConfiguration::from_names(&registry, config::get_filter_names());
//! let source = FilterSource::new(registry, configuration, config.cloud_platform().clone());
//! let engine = ProxyEngine::new(source, config::get_proxy_settings().clone(), ConnectionTracker::new()).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`config`] - Configuration management from environment variables
//! - [`env_vars`] - Environment variable constants
//! - [`proxy`] - Hosting engine driving the filter hooks
//! - [`connection`] - Connection limiting and tracking
//! - [`server`] - Logging setup and startup info
//! - [`args`] - Command line argument parsing

#![forbid(unsafe_code)]

pub mod args;
pub mod config;
pub mod connection;
pub mod env_vars;
pub mod proxy;
pub mod server;

// Re-export egressgate-core modules
pub use egressgate_core::filters;
pub use egressgate_core::metrics;
pub use egressgate_core::pipeline;
pub use egressgate_core::types;

pub use config::{
    EnvVarConfig, MetricsExportConfig, ProxySettings, get_cloud_platform, get_filter_names,
    get_max_connections, get_metrics_export_config, get_proxy_settings,
};
pub use proxy::ProxyEngine;
