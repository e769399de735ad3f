//! Route classification: which network interface carries traffic to an IP.
//!
//! - [`command`] - External command execution behind a mockable trait
//! - [`ip_route`] - Resolver backed by `ip route get`
//! - [`cache`] - Bounded LRU cache in front of any resolver

use async_trait::async_trait;

use crate::error::Result;

pub mod cache;
pub mod command;
pub mod ip_route;

pub use cache::CachedNicResolver;
pub use command::{CommandRunner, ProcessOutput, SystemCommandRunner};
pub use ip_route::IpRouteNicResolver;

/// Resolves the outbound network interface for a destination address.
#[async_trait]
pub trait NicResolver: Send + Sync {
    /// Returns the interface name (for example `eth0`) traffic to `ip` uses.
    ///
    /// Failures are reported as [`GateError::RouteResolution`](crate::GateError::RouteResolution).
    async fn resolve(&self, ip: &str) -> Result<String>;
}
