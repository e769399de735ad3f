//! Environment variable names used throughout egressgate configuration

/// Deployment
pub const CLOUD_PLATFORM: &str = "CLOUD_PLATFORM";
pub const PROXY_TYPE: &str = "PROXY_TYPE";
pub const GKE_SERVICE_IP_RANGE: &str = "GKE_SERVICE_IP_RANGE";
pub const INTERNAL_INTERFACE: &str = "INTERNAL_INTERFACE";
pub const EXTERNAL_INTERFACE: &str = "EXTERNAL_INTERFACE";
pub const ROUTE_CACHE_CAPACITY: &str = "ROUTE_CACHE_CAPACITY";

/// Client access
pub const ALLOWED_PROXY_ADDRESS: &str = "ALLOWED_PROXY_ADDRESS";
pub const ALLOWED_PROXY_ADDRESS_TYPE: &str = "ALLOWED_PROXY_ADDRESS_TYPE";

/// Egress policy
pub const ENFORCE_ALLOWED_EGRESS_DOMAINS: &str = "ENFORCE_ALLOWED_EGRESS_DOMAINS";
pub const ALLOWED_EGRESS_DOMAINS: &str = "ALLOWED_EGRESS_DOMAINS";

/// Forwarding
pub const UPGRADE_HTTP_REQUESTS: &str = "UPGRADE_HTTP_REQUESTS";
pub const WEBHOOK_TARGET: &str = "WEBHOOK_TARGET";
pub const ALLOW_API_INGRESS: &str = "ALLOW_API_INGRESS";

/// Filter chains
pub const AWS_FILTERS: &str = "AWS_FILTERS";
pub const GOOGLE_FILTERS: &str = "GOOGLE_FILTERS";
pub const CROSS_PLATFORM_FILTERS: &str = "CROSS_PLATFORM_FILTERS";
pub const DEBUG_FILTERS: &str = "DEBUG_FILTERS";
pub const LEGACY_FILTERS: &str = "LEGACY_FILTERS";

/// Metrics export
pub const ENABLE_METRICS_EXPORT: &str = "ENABLE_METRICS_EXPORT";
pub const METRICS_EXPORT_INTERVAL_SECS: &str = "METRICS_EXPORT_INTERVAL_SECS";

/// Hosting engine
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
pub const UPSTREAM_TIMEOUT_SECS: &str = "UPSTREAM_TIMEOUT_SECS";
pub const MAX_REQUEST_BODY_MB: &str = "MAX_REQUEST_BODY_MB";

/// Get all environment variable names for documentation/validation
pub fn all_env_vars() -> &'static [&'static str] {
    &[
        CLOUD_PLATFORM,
        PROXY_TYPE,
        GKE_SERVICE_IP_RANGE,
        INTERNAL_INTERFACE,
        EXTERNAL_INTERFACE,
        ROUTE_CACHE_CAPACITY,
        ALLOWED_PROXY_ADDRESS,
        ALLOWED_PROXY_ADDRESS_TYPE,
        ENFORCE_ALLOWED_EGRESS_DOMAINS,
        ALLOWED_EGRESS_DOMAINS,
        UPGRADE_HTTP_REQUESTS,
        WEBHOOK_TARGET,
        ALLOW_API_INGRESS,
        AWS_FILTERS,
        GOOGLE_FILTERS,
        CROSS_PLATFORM_FILTERS,
        DEBUG_FILTERS,
        LEGACY_FILTERS,
        ENABLE_METRICS_EXPORT,
        METRICS_EXPORT_INTERVAL_SECS,
        MAX_CONNECTIONS,
        UPSTREAM_TIMEOUT_SECS,
        MAX_REQUEST_BODY_MB,
    ]
}
