//! Default configuration values for egressgate.
//!
//! Centralizes defaults so production code and tests agree.

use std::time::Duration;

/// Maximum number of IP to interface mappings kept by the route cache.
pub const ROUTE_CACHE_CAPACITY: usize = 1000;

/// Interface that faces the internal network in shared VPC and transit modes.
pub const INTERNAL_INTERFACE: &str = "eth1";

/// Interface that faces the internet.
pub const EXTERNAL_INTERFACE: &str = "eth0";

/// Upper bound on simultaneous bridged requests.
pub const BRIDGE_MAX_TOTAL_CONNECTIONS: usize = 500;

/// Upper bound on simultaneous bridged requests to one destination host.
pub const BRIDGE_MAX_CONNECTIONS_PER_HOST: usize = 200;

/// Bridge connect timeout.
pub const BRIDGE_CONNECT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Bridge socket read timeout.
pub const BRIDGE_READ_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Maximum wait for a bridge connection slot.
pub const BRIDGE_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// User-Agent sent by the egress upgrade filter when the client sent none.
pub const EGRESS_USER_AGENT: &str = "Egress-Proxy";

/// User-Agent sent by the legacy on-premises filter when the client sent none.
pub const ON_PREM_USER_AGENT: &str = "OnPrem-Proxy";

/// Default metrics export period in seconds.
pub const METRICS_EXPORT_INTERVAL_SECS: u64 = 60;

/// Default metrics export period.
pub const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(METRICS_EXPORT_INTERVAL_SECS);

/// Maximum request body buffered by the hosting engine, in megabytes.
pub const MAX_BODY_SIZE_MB: usize = 5;

/// Maximum request body buffered by the hosting engine, in bytes.
pub const MAX_BODY_SIZE: usize = MAX_BODY_SIZE_MB * 1024 * 1024;

/// Default upstream timeout in seconds for directly proxied requests.
pub const UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Default upstream timeout.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(UPSTREAM_TIMEOUT_SECS);

/// Default maximum concurrent client connections.
pub const MAX_CONNECTIONS: usize = 10_000;

/// Path prefix answered by the liveness filter.
pub const LIVENESS_PATH: &str = "/liveness_check";

/// Path prefix served by the debug filter chain.
pub const DEBUG_PATH: &str = "/proxy_debug";

/// Default AWS filter chain.
pub const AWS_FILTERS: &str = "VpcEndpointFilter,EgressDomainFilter";

/// Default Google Cloud filter chain.
pub const GOOGLE_FILTERS: &str = "InternalAddressFilter";

/// Default filters placed ahead of every platform chain.
pub const CROSS_PLATFORM_FILTERS: &str = "ClientAddressFilter,UpgradeRequestFilter,ProxyMetricsFilter";

/// Default debug chain.
pub const DEBUG_FILTERS: &str = "ClientAddressFilter,ProxyDebugFilter";

/// Default chain for legacy `/proxy/...` requests.
pub const LEGACY_FILTERS: &str = "LegacyRequestFilter,ProxyMetricsFilter";

/// Path prefix handled by the legacy chain.
pub const LEGACY_PATH: &str = "/proxy/";

/// Longest wait for open connections to finish after a shutdown signal.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
