//! Type definitions for egressgate configuration.
//!
//! Configuration reaches the filters through small provider traits, one per
//! concern, aggregated by [`ConfigProvider`]. The binary reads them from the
//! environment; tests use an in-memory builder.

use std::fmt;
use std::time::Duration;

use ipnet::IpNet;

use crate::defaults;

// ============================================================================
// Composable Configuration Traits
// ============================================================================

/// Selects the platform-specific filter chain.
pub trait PlatformProvider: Send + Sync {
    /// Returns the cloud platform this gateway runs on.
    fn cloud_platform(&self) -> &CloudPlatform;
}

/// Configuration for the egress domain allow-list.
pub trait EgressPolicyProvider: Send + Sync {
    /// Returns true when destinations must appear on the allow-list.
    fn enforce_allowed_egress_domains(&self) -> bool;

    /// Returns the raw comma-separated allow-list, if configured.
    fn allowed_egress_domains(&self) -> Option<&str>;
}

/// Configuration for the internal-address blocker.
pub trait AddressPolicyProvider: Send + Sync {
    /// Returns how the gateway sits relative to the protected network.
    fn deployment_mode(&self) -> &DeploymentMode;

    /// Returns the managed-service CIDR treated as private, if configured.
    fn managed_service_range(&self) -> Option<&IpNet>;

    /// Returns the interface name that faces the internal network.
    fn internal_interface(&self) -> &str;

    /// Returns the interface name that faces the internet.
    fn external_interface(&self) -> &str;

    /// Returns the capacity of the IP to interface cache.
    fn route_cache_capacity(&self) -> usize;
}

/// Configuration for the client address filter.
pub trait ClientAccessProvider: Send + Sync {
    /// Returns the only non-loopback address allowed to use the proxy.
    fn allowed_proxy_address(&self) -> Option<&str>;

    /// Returns which side of the client socket is compared.
    fn allowed_proxy_address_type(&self) -> ClientAddressSource;
}

/// Configuration for request rewriting and the upgrade bridge.
pub trait ForwardingProvider: Send + Sync {
    /// Returns true when plain `http://` requests are re-issued over TLS.
    fn upgrade_http_requests(&self) -> bool;

    /// Returns the webhook target used by the legacy and VPC endpoint filters.
    fn webhook_target(&self) -> Option<&str>;

    /// Returns true when `/proxy/api` and `/proxy/rest/api` are accepted.
    fn allow_api_ingress(&self) -> bool;

    /// Returns the bridge client configuration.
    fn bridge_config(&self) -> &BridgeConfig;
}

// ============================================================================
// ConfigProvider - Aggregated trait for full configuration
// ============================================================================

/// Trait for complete configuration injection.
///
/// Any type implementing every provider trait is a `ConfigProvider`.
pub trait ConfigProvider:
    PlatformProvider
    + EgressPolicyProvider
    + AddressPolicyProvider
    + ClientAccessProvider
    + ForwardingProvider
{
}

impl<T> ConfigProvider for T where
    T: PlatformProvider
        + EgressPolicyProvider
        + AddressPolicyProvider
        + ClientAccessProvider
        + ForwardingProvider
{
}

// ============================================================================
// Configuration values
// ============================================================================

/// Cloud platform the gateway is deployed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloudPlatform {
    Aws,
    Google,
    /// Any other value; every request on a platform chain fails with 500.
    Unrecognized(String),
}

impl CloudPlatform {
    /// Parses the platform name. Matching is exact, as configured.
    ///
    /// ```
    /// use egressgate_core::CloudPlatform;
    ///
    /// assert_eq!(CloudPlatform::parse("AWS"), CloudPlatform::Aws);
    /// assert_eq!(CloudPlatform::parse("aws"), CloudPlatform::Unrecognized("aws".into()));
    /// ```
    pub fn parse(value: &str) -> Self {
        match value {
            "AWS" => Self::Aws,
            "GOOGLE" => Self::Google,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for CloudPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => f.write_str("AWS"),
            Self::Google => f.write_str("GOOGLE"),
            Self::Unrecognized(value) => f.write_str(value),
        }
    }
}

/// How the gateway sits relative to the protected network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Single interface; any private destination is refused.
    Standalone,
    /// Two interfaces inside a shared VPC.
    SharedVpc,
    /// Two interfaces inside a transit VPC.
    Transit,
    Unrecognized(String),
}

impl DeploymentMode {
    pub fn parse(value: &str) -> Self {
        match value {
            "STANDALONE" => Self::Standalone,
            "SHARED_VPC" => Self::SharedVpc,
            "TRANSIT" => Self::Transit,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => f.write_str("STANDALONE"),
            Self::SharedVpc => f.write_str("SHARED_VPC"),
            Self::Transit => f.write_str("TRANSIT"),
            Self::Unrecognized(value) => f.write_str(value),
        }
    }
}

/// Which address of the client connection the client address filter checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClientAddressSource {
    /// The peer address of the client socket.
    #[default]
    Remote,
    /// The local address the client connected to.
    Local,
}

impl ClientAddressSource {
    /// Parses `REMOTE` or `LOCAL`; anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REMOTE" => Some(Self::Remote),
            "LOCAL" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Configuration for the upgrade bridge's shared outbound client.
///
/// # Example
///
/// ```
/// use egressgate_core::BridgeConfig;
///
/// let config = BridgeConfig::default();
/// assert!(config.is_valid());
/// assert_eq!(config.max_total_connections, 500);
/// ```
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Maximum time to establish a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Maximum idle time while reading from the socket.
    pub read_timeout: Duration,
    /// Maximum wait for a free connection slot.
    pub acquire_timeout: Duration,
    /// Slots shared by all destinations.
    pub max_total_connections: usize,
    /// Slots available to a single destination host.
    pub max_connections_per_host: usize,
    /// Roots trusted in addition to the bundled web PKI roots, for targets
    /// behind a private CA.
    pub root_certificates: Vec<reqwest::Certificate>,
}

impl BridgeConfig {
    /// Returns `true` if the configuration is valid.
    ///
    /// All timeouts and limits must be non-zero and the per-host limit may not
    /// exceed the total.
    pub fn is_valid(&self) -> bool {
        !self.connect_timeout.is_zero()
            && !self.read_timeout.is_zero()
            && !self.acquire_timeout.is_zero()
            && self.max_total_connections > 0
            && self.max_connections_per_host > 0
            && self.max_connections_per_host <= self.max_total_connections
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: defaults::BRIDGE_CONNECT_TIMEOUT,
            read_timeout: defaults::BRIDGE_READ_TIMEOUT,
            acquire_timeout: defaults::BRIDGE_ACQUIRE_TIMEOUT,
            max_total_connections: defaults::BRIDGE_MAX_TOTAL_CONNECTIONS,
            max_connections_per_host: defaults::BRIDGE_MAX_CONNECTIONS_PER_HOST,
            root_certificates: Vec::new(),
        }
    }
}
