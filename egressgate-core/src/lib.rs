//! EgressGate Core - Filter pipeline for forward (egress) proxies
//!
//! This crate provides the policy side of an egress proxy:
//! - A four-hook per-request filter abstraction and its composite
//! - Egress domain allow-listing with wildcard support
//! - Private address and VPC endpoint protection based on resolved addresses
//! - Client address restriction, HTTP to HTTPS upgrade and legacy webhook rewriting
//! - Diagnostic endpoints and aggregated request metrics
//!
//! # Overview
//!
//! `egressgate-core` does not own a socket. A hosting engine asks a
//! [`pipeline::FilterSource`] for one filter per request and calls its hooks
//! at the right moments. Configuration is provided via the [`ConfigProvider`]
//! trait, allowing flexible configuration from any source.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use egressgate_core::{
//!     AddressPolicyProvider, BridgeConfig, ClientAccessProvider, ClientAddressSource,
//!     CloudPlatform, DeploymentMode, EgressPolicyProvider, ForwardingProvider,
//!     PlatformProvider, ProxyMetrics,
//! };
//! use egressgate_core::pipeline::{FilterConfiguration, FilterNames, FilterRegistry, FilterSource, SharedServices};
//! use ipnet::IpNet;
//!
//! struct MyConfig {
//!     platform: CloudPlatform,
//!     mode: DeploymentMode,
//!     bridge: BridgeConfig,
//! }
//!
//! impl PlatformProvider for MyConfig {
//!     fn cloud_platform(&self) -> &CloudPlatform { &self.platform }
//! }
//!
//! impl EgressPolicyProvider for MyConfig {
//!     fn enforce_allowed_egress_domains(&self) -> bool { true }
//!     fn allowed_egress_domains(&self) -> Option<&str> { Some("glean.com,*.temu.com") }
//! }
//!
//! impl AddressPolicyProvider for MyConfig {
//!     fn deployment_mode(&self) -> &DeploymentMode { &self.mode }
//!     fn managed_service_range(&self) -> Option<&IpNet> { None }
//!     fn internal_interface(&self) -> &str { "eth1" }
//!     fn external_interface(&self) -> &str { "eth0" }
//!     fn route_cache_capacity(&self) -> usize { 1000 }
//! }
//!
//! impl ClientAccessProvider for MyConfig {
//!     fn allowed_proxy_address(&self) -> Option<&str> { None }
//!     fn allowed_proxy_address_type(&self) -> ClientAddressSource { ClientAddressSource::Remote }
//! }
//!
//! impl ForwardingProvider for MyConfig {
//!     fn upgrade_http_requests(&self) -> bool { false }
//!     fn webhook_target(&self) -> Option<&str> { None }
//!     fn allow_api_ingress(&self) -> bool { false }
//!     fn bridge_config(&self) -> &BridgeConfig { &self.bridge }
//! }
//!
//! let config = MyConfig {
//!     platform: CloudPlatform::Aws,
//!     mode: DeploymentMode::Standalone,
//!     bridge: BridgeConfig::default(),
//! };
//! let services = SharedServices::system(&config, Arc::new(ProxyMetrics::new())).unwrap();
//! let registry = FilterRegistry::new(&config, services);
//! let configuration = FilterConfiguration::from_names(&registry, &FilterNames::default());
//! let source = FilterSource::new(registry, configuration, config.cloud_platform().clone());
//! ```
//!
//! # Modules
//!
//! - [`types`] - Configuration traits and core types
//! - [`error`] - Error types and result aliases
//! - [`filter`] - The [`HttpFilter`] trait and [`CompositeFilter`]
//! - [`filters`] - Built-in filters
//! - [`pipeline`] - Filter registry, configuration and per-request chain selection
//! - [`domains`] - Egress domain allow-list
//! - [`address`] - Private address policy
//! - [`route`] - Interface lookup through `ip route get`
//! - [`bridge`] - HTTPS bridge used by upgrading filters
//! - [`metrics`] - Request metrics aggregation and export

#![forbid(unsafe_code)]

pub mod address;
pub mod bridge;
pub mod defaults;
pub mod domains;
pub mod error;
pub mod filter;
pub mod filters;
pub mod headers;
pub mod lookup;
pub mod message;
pub mod metrics;
pub mod on_premises;
pub mod pipeline;
pub mod response;
pub mod route;
#[cfg(test)]
pub mod test_utils;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{GateError, Result};
pub use filter::{CompositeFilter, HttpFilter};
pub use message::{ConnectionInfo, ProxyRequest};
pub use metrics::{MetricsExporter, ProxyMetrics};
pub use response::GateResponse;
pub use types::{
    // Composable configuration traits
    AddressPolicyProvider,
    // Configuration structs and enums
    BridgeConfig,
    ClientAccessProvider,
    ClientAddressSource,
    CloudPlatform,
    // Aggregated configuration trait
    ConfigProvider,
    DeploymentMode,
    EgressPolicyProvider,
    ForwardingProvider,
    PlatformProvider,
};
