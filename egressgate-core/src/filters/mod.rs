//! Built-in filters.
//!
//! Each filter is created fresh for a single request by the
//! [`FilterRegistry`](crate::pipeline::FilterRegistry) and owns whatever
//! state it needs between hooks. Shared engines (allow-list, address policy,
//! bridge, metrics) are passed in behind `Arc`s.

mod client_address;
mod debug;
mod egress_domain;
mod internal_address;
mod invalid_platform;
mod legacy;
mod liveness;
mod metrics;
mod upgrade;
mod vpc_endpoint;

pub use client_address::ClientAddressFilter;
pub use debug::{
    ConnectivityReport, ConnectivityStatus, DebugEnvironment, ProxyDebugFilter, ResolveHostReport,
    ResolvedBy, RouteDirection, RouteFailureReason, RouteReport,
};
pub use egress_domain::EgressDomainFilter;
pub use internal_address::InternalAddressFilter;
pub use invalid_platform::InvalidPlatformFilter;
pub use legacy::LegacyRequestFilter;
pub use liveness::LivenessFilter;
pub use metrics::ProxyMetricsFilter;
pub use upgrade::UpgradeRequestFilter;
pub use vpc_endpoint::{VpcEndpointFilter, VpcEndpointGuard};
