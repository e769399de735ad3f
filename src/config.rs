//! Configuration management for egressgate.
//!
//! This module handles loading and caching configuration from environment variables.
//! All configurations are computed once at first access and cached for the lifetime
//! of the application using `once_cell::sync::Lazy`.
//!
//! Invalid values are logged with a warning and replaced by their default, so a
//! typo never prevents the gateway from starting.
//!
//! # Example
//!
//! ```
//! use egressgate::config;
//!
//! let settings = config::get_proxy_settings();
//! println!("Upstream timeout: {:?}", settings.upstream_timeout);
//!
//! let platform = config::get_cloud_platform();
//! println!("Platform: {platform}");
//! ```

use std::env::{self, VarError};
use std::str::FromStr;
use std::time::Duration;

use ipnet::IpNet;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::env_vars;
use egressgate_core::defaults;
use egressgate_core::pipeline::FilterNames;
use egressgate_core::{
    AddressPolicyProvider, BridgeConfig, ClientAccessProvider, ClientAddressSource, CloudPlatform,
    DeploymentMode, EgressPolicyProvider, ForwardingProvider, PlatformProvider,
};

// ============================================================================
// Configuration structs
// ============================================================================

/// Settings of the hosting engine itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxySettings {
    /// Timeout for requests forwarded directly to upstream.
    pub upstream_timeout: Duration,
    /// Largest request body the engine buffers, in bytes.
    pub max_body_size: usize,
}

impl ProxySettings {
    pub fn max_body_size_mb(&self) -> usize {
        self.max_body_size / (1024 * 1024)
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            upstream_timeout: defaults::UPSTREAM_TIMEOUT,
            max_body_size: defaults::MAX_BODY_SIZE,
        }
    }
}

/// Periodic metrics export settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsExportConfig {
    pub enabled: bool,
    pub interval: Duration,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct EgressPolicy {
    enforce: bool,
    domains: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ClientAccess {
    address: Option<String>,
    source: ClientAddressSource,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Forwarding {
    upgrade_http_requests: bool,
    webhook_target: Option<String>,
    allow_api_ingress: bool,
}

// ============================================================================
// Cached Configuration (computed once at first access)
// ============================================================================

static CLOUD_PLATFORM: Lazy<CloudPlatform> =
    Lazy::new(|| compute_cloud_platform_internal(system_env));
static DEPLOYMENT_MODE: Lazy<DeploymentMode> =
    Lazy::new(|| compute_deployment_mode_internal(system_env));
static MANAGED_SERVICE_RANGE: Lazy<Option<IpNet>> =
    Lazy::new(|| compute_managed_service_range_internal(system_env));
static INTERNAL_INTERFACE: Lazy<String> = Lazy::new(|| {
    string_or_default(&system_env, env_vars::INTERNAL_INTERFACE, defaults::INTERNAL_INTERFACE)
});
static EXTERNAL_INTERFACE: Lazy<String> = Lazy::new(|| {
    string_or_default(&system_env, env_vars::EXTERNAL_INTERFACE, defaults::EXTERNAL_INTERFACE)
});
static ROUTE_CACHE_CAPACITY: Lazy<usize> =
    Lazy::new(|| compute_route_cache_capacity_internal(system_env));
static EGRESS_POLICY: Lazy<EgressPolicy> =
    Lazy::new(|| compute_egress_policy_internal(system_env));
static CLIENT_ACCESS: Lazy<ClientAccess> =
    Lazy::new(|| compute_client_access_internal(system_env));
static FORWARDING: Lazy<Forwarding> = Lazy::new(|| compute_forwarding_internal(system_env));
static BRIDGE_CONFIG: Lazy<BridgeConfig> = Lazy::new(BridgeConfig::default);
static FILTER_NAMES: Lazy<FilterNames> =
    Lazy::new(|| compute_filter_names_internal(system_env));
static METRICS_EXPORT: Lazy<MetricsExportConfig> =
    Lazy::new(|| compute_metrics_export_internal(system_env));
static PROXY_SETTINGS: Lazy<ProxySettings> =
    Lazy::new(|| compute_proxy_settings_internal(system_env));
static MAX_CONNECTIONS: Lazy<usize> = Lazy::new(|| {
    parse_env_var_or_default(&system_env, env_vars::MAX_CONNECTIONS, defaults::MAX_CONNECTIONS)
});

// ============================================================================
// Internal Helpers
// ============================================================================

fn system_env(key: &str) -> Result<String, VarError> {
    env::var(key)
}

/// Parses an environment variable with fallback to a default value.
///
/// Logs a warning if the value exists but cannot be parsed.
fn parse_env_var_or_default<T, F>(env_var: &F, var_name: &str, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Result<String, VarError>,
{
    match env_var(var_name) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = var_name, value = %value, "Invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Returns the trimmed value of a variable, or `None` when unset or blank.
fn non_empty<F>(env_var: &F, var_name: &str) -> Option<String>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    env_var(var_name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn string_or_default<F>(env_var: &F, var_name: &str, default: &str) -> String
where
    F: Fn(&str) -> Result<String, VarError>,
{
    non_empty(env_var, var_name).unwrap_or_else(|| default.to_string())
}

/// `true` only when the variable equals `true`, ignoring case.
fn parse_flag<F>(env_var: &F, var_name: &str) -> bool
where
    F: Fn(&str) -> Result<String, VarError>,
{
    env_var(var_name).is_ok_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

// ============================================================================
// Computations
// ============================================================================

fn compute_cloud_platform_internal<F>(env_var: F) -> CloudPlatform
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let platform = CloudPlatform::parse(&env_var(env_vars::CLOUD_PLATFORM).unwrap_or_default());
    if let CloudPlatform::Unrecognized(value) = &platform {
        warn!(
            var = env_vars::CLOUD_PLATFORM,
            value = %value,
            "Unrecognized cloud platform, platform requests will be refused"
        );
    }
    platform
}

fn compute_deployment_mode_internal<F>(env_var: F) -> DeploymentMode
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match non_empty(&env_var, env_vars::PROXY_TYPE) {
        Some(value) => DeploymentMode::parse(&value),
        None => DeploymentMode::Standalone,
    }
}

fn compute_managed_service_range_internal<F>(env_var: F) -> Option<IpNet>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let value = non_empty(&env_var, env_vars::GKE_SERVICE_IP_RANGE)?;
    match value.parse() {
        Ok(range) => Some(range),
        Err(err) => {
            warn!(
                var = env_vars::GKE_SERVICE_IP_RANGE,
                value = %value,
                error = %err,
                "Invalid CIDR, managed service range ignored"
            );
            None
        }
    }
}

fn compute_route_cache_capacity_internal<F>(env_var: F) -> usize
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let capacity =
        parse_env_var_or_default(&env_var, env_vars::ROUTE_CACHE_CAPACITY, defaults::ROUTE_CACHE_CAPACITY);
    if capacity == 0 {
        warn!("Route cache capacity must be positive, using default");
        return defaults::ROUTE_CACHE_CAPACITY;
    }
    capacity
}

fn compute_egress_policy_internal<F>(env_var: F) -> EgressPolicy
where
    F: Fn(&str) -> Result<String, VarError>,
{
    EgressPolicy {
        enforce: parse_flag(&env_var, env_vars::ENFORCE_ALLOWED_EGRESS_DOMAINS),
        domains: non_empty(&env_var, env_vars::ALLOWED_EGRESS_DOMAINS),
    }
}

fn compute_client_access_internal<F>(env_var: F) -> ClientAccess
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let source = match non_empty(&env_var, env_vars::ALLOWED_PROXY_ADDRESS_TYPE) {
        None => ClientAddressSource::Remote,
        Some(value) => ClientAddressSource::parse(&value.to_uppercase()).unwrap_or_else(|| {
            warn!(
                var = env_vars::ALLOWED_PROXY_ADDRESS_TYPE,
                value = %value,
                "Expected REMOTE or LOCAL, using REMOTE"
            );
            ClientAddressSource::Remote
        }),
    };

    ClientAccess {
        address: non_empty(&env_var, env_vars::ALLOWED_PROXY_ADDRESS),
        source,
    }
}

fn compute_forwarding_internal<F>(env_var: F) -> Forwarding
where
    F: Fn(&str) -> Result<String, VarError>,
{
    Forwarding {
        upgrade_http_requests: parse_flag(&env_var, env_vars::UPGRADE_HTTP_REQUESTS),
        webhook_target: non_empty(&env_var, env_vars::WEBHOOK_TARGET),
        allow_api_ingress: parse_flag(&env_var, env_vars::ALLOW_API_INGRESS),
    }
}

/// Unset variables fall back to the default list; a set but empty variable
/// yields an empty chain.
fn compute_filter_names_internal<F>(env_var: F) -> FilterNames
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let defaults = FilterNames::default();
    let list = |var_name: &str, default: String| env_var(var_name).unwrap_or(default);

    FilterNames {
        aws: list(env_vars::AWS_FILTERS, defaults.aws),
        google: list(env_vars::GOOGLE_FILTERS, defaults.google),
        cross_platform: list(env_vars::CROSS_PLATFORM_FILTERS, defaults.cross_platform),
        debug: list(env_vars::DEBUG_FILTERS, defaults.debug),
        legacy: list(env_vars::LEGACY_FILTERS, defaults.legacy),
    }
}

/// Export is on unless explicitly disabled with `false` or `0`.
fn compute_metrics_export_internal<F>(env_var: F) -> MetricsExportConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let enabled = match env_var(env_vars::ENABLE_METRICS_EXPORT) {
        Ok(value) => {
            let value = value.trim();
            !(value.eq_ignore_ascii_case("false") || value == "0")
        }
        Err(_) => true,
    };

    let mut interval_secs = parse_env_var_or_default(
        &env_var,
        env_vars::METRICS_EXPORT_INTERVAL_SECS,
        defaults::METRICS_EXPORT_INTERVAL_SECS,
    );
    if interval_secs == 0 {
        warn!("Metrics export interval must be positive, using default");
        interval_secs = defaults::METRICS_EXPORT_INTERVAL_SECS;
    }

    MetricsExportConfig {
        enabled,
        interval: Duration::from_secs(interval_secs),
    }
}

fn compute_proxy_settings_internal<F>(env_var: F) -> ProxySettings
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let timeout_secs =
        parse_env_var_or_default(&env_var, env_vars::UPSTREAM_TIMEOUT_SECS, defaults::UPSTREAM_TIMEOUT_SECS);
    let max_body_mb =
        parse_env_var_or_default(&env_var, env_vars::MAX_REQUEST_BODY_MB, defaults::MAX_BODY_SIZE_MB);

    if timeout_secs == 0 || max_body_mb == 0 {
        warn!("Invalid proxy settings, using defaults");
        return ProxySettings::default();
    }

    ProxySettings {
        upstream_timeout: Duration::from_secs(timeout_secs),
        max_body_size: max_body_mb.saturating_mul(1024 * 1024),
    }
}

// ============================================================================
// Public Configuration Getters
// ============================================================================

/// Returns the cached cloud platform (`CLOUD_PLATFORM`).
pub fn get_cloud_platform() -> &'static CloudPlatform {
    &CLOUD_PLATFORM
}

/// Returns the cached deployment mode (`PROXY_TYPE`, default `STANDALONE`).
pub fn get_deployment_mode() -> &'static DeploymentMode {
    &DEPLOYMENT_MODE
}

/// Returns the cached managed service range (`GKE_SERVICE_IP_RANGE`).
pub fn get_managed_service_range() -> Option<&'static IpNet> {
    MANAGED_SERVICE_RANGE.as_ref()
}

/// Returns the cached filter chain names.
///
/// # Example
///
/// ```
/// use egressgate::config::get_filter_names;
///
/// let names = get_filter_names();
/// println!("AWS chain: {}", names.aws);
/// ```
pub fn get_filter_names() -> &'static FilterNames {
    &FILTER_NAMES
}

/// Returns the cached metrics export settings.
///
/// - `ENABLE_METRICS_EXPORT`: `false` or `0` disables export (default: enabled)
/// - `METRICS_EXPORT_INTERVAL_SECS`: export period (default: 60)
pub fn get_metrics_export_config() -> &'static MetricsExportConfig {
    &METRICS_EXPORT
}

/// Returns the cached hosting engine settings.
///
/// - `UPSTREAM_TIMEOUT_SECS`: timeout of directly forwarded requests (default: 30)
/// - `MAX_REQUEST_BODY_MB`: largest buffered request body (default: 5)
pub fn get_proxy_settings() -> &'static ProxySettings {
    &PROXY_SETTINGS
}

/// Returns the cached maximum number of concurrent connections.
///
/// `0` means unlimited. **Default**: `10000`
pub fn get_max_connections() -> usize {
    *MAX_CONNECTIONS
}

// ============================================================================
// EnvVarConfig - provider implementations using environment variables
// ============================================================================

/// Configuration provider that reads from environment variables.
///
/// This is the default configuration provider for the egressgate CLI.
/// All values are cached at first access using the global lazy statics.
///
/// # Example
///
/// ```
/// use egressgate::config::EnvVarConfig;
/// use egressgate_core::AddressPolicyProvider;
///
/// let config = EnvVarConfig::new();
/// println!("Internal interface: {}", config.internal_interface());
/// ```
#[derive(Clone, Debug)]
pub struct EnvVarConfig {
    _private: (),
}

impl EnvVarConfig {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for EnvVarConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformProvider for EnvVarConfig {
    fn cloud_platform(&self) -> &CloudPlatform {
        get_cloud_platform()
    }
}

impl EgressPolicyProvider for EnvVarConfig {
    fn enforce_allowed_egress_domains(&self) -> bool {
        EGRESS_POLICY.enforce
    }

    fn allowed_egress_domains(&self) -> Option<&str> {
        EGRESS_POLICY.domains.as_deref()
    }
}

impl AddressPolicyProvider for EnvVarConfig {
    fn deployment_mode(&self) -> &DeploymentMode {
        get_deployment_mode()
    }

    fn managed_service_range(&self) -> Option<&IpNet> {
        get_managed_service_range()
    }

    fn internal_interface(&self) -> &str {
        &INTERNAL_INTERFACE
    }

    fn external_interface(&self) -> &str {
        &EXTERNAL_INTERFACE
    }

    fn route_cache_capacity(&self) -> usize {
        *ROUTE_CACHE_CAPACITY
    }
}

impl ClientAccessProvider for EnvVarConfig {
    fn allowed_proxy_address(&self) -> Option<&str> {
        CLIENT_ACCESS.address.as_deref()
    }

    fn allowed_proxy_address_type(&self) -> ClientAddressSource {
        CLIENT_ACCESS.source
    }
}

impl ForwardingProvider for EnvVarConfig {
    fn upgrade_http_requests(&self) -> bool {
        FORWARDING.upgrade_http_requests
    }

    fn webhook_target(&self) -> Option<&str> {
        FORWARDING.webhook_target.as_deref()
    }

    fn allow_api_ingress(&self) -> bool {
        FORWARDING.allow_api_ingress
    }

    fn bridge_config(&self) -> &BridgeConfig {
        &BRIDGE_CONFIG
    }
}
