//! Internal-address policy.
//!
//! Decides whether the gateway may connect to a resolved destination address.
//! The decision combines the address's privacy class with the deployment
//! mode and, outside standalone mode, the interface the route uses.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use ipnet::IpNet;

use crate::error::{GateError, Result};
use crate::route::NicResolver;
use crate::types::DeploymentMode;

/// Returns true if `ip` must not be reached from the outside.
///
/// Loopback, RFC 1918 site-local, link-local (169.254/16, fe80::/10), IPv6
/// site-local (fec0::/10) and any member of `managed_range` are private.
/// IPv4-mapped IPv6 addresses are classified as their IPv4 form.
///
/// # Example
///
/// ```
/// use egressgate_core::address::is_private;
///
/// let range = "34.118.224.0/20".parse().ok();
/// assert!(is_private("10.1.2.3".parse().unwrap(), None));
/// assert!(is_private("34.118.230.1".parse().unwrap(), range.as_ref()));
/// assert!(!is_private("8.8.8.8".parse().unwrap(), range.as_ref()));
/// ```
pub fn is_private(ip: IpAddr, managed_range: Option<&IpNet>) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        IpAddr::V4(_) => ip,
    };

    let reserved = match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    };

    reserved || managed_range.is_some_and(|range| range.contains(&ip))
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let prefix = ip.segments()[0] & 0xffc0;
    ip.is_loopback() || prefix == 0xfe80 || prefix == 0xfec0
}

/// Mode-aware policy for destination addresses.
pub struct AddressPolicy {
    mode: DeploymentMode,
    managed_range: Option<IpNet>,
    internal_interface: String,
    resolver: Arc<dyn NicResolver>,
}

impl AddressPolicy {
    pub fn new(
        mode: DeploymentMode,
        managed_range: Option<IpNet>,
        internal_interface: impl Into<String>,
        resolver: Arc<dyn NicResolver>,
    ) -> Self {
        Self {
            mode,
            managed_range,
            internal_interface: internal_interface.into(),
            resolver,
        }
    }

    pub fn mode(&self) -> &DeploymentMode {
        &self.mode
    }

    /// Returns `Ok(())` if the gateway may connect to `ip`.
    ///
    /// - Standalone: private addresses are refused.
    /// - Shared VPC and transit: the route is resolved first (failure is a
    ///   [`GateError::RouteResolution`]); private addresses are refused only
    ///   when routed through the internal interface.
    /// - Any other mode is refused with [`GateError::UnknownProxyType`].
    pub async fn check(&self, ip: IpAddr) -> Result<()> {
        match &self.mode {
            DeploymentMode::Standalone => {
                if is_private(ip, self.managed_range.as_ref()) {
                    return Err(GateError::PrivateAddress(ip.to_string()));
                }
                Ok(())
            }
            DeploymentMode::SharedVpc | DeploymentMode::Transit => {
                let nic = self
                    .resolver
                    .resolve(&ip.to_string())
                    .await
                    .map_err(|err| match err {
                        GateError::RouteResolution(reason) => GateError::RouteResolution(reason),
                        other => GateError::RouteResolution(other.to_string()),
                    })?;

                if nic == self.internal_interface && is_private(ip, self.managed_range.as_ref()) {
                    return Err(GateError::PrivateAddress(ip.to_string()));
                }
                Ok(())
            }
            DeploymentMode::Unrecognized(mode) => Err(GateError::UnknownProxyType(mode.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticNicResolver;

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    fn policy(mode: DeploymentMode, resolver: Arc<StaticNicResolver>) -> AddressPolicy {
        AddressPolicy::new(mode, "34.118.224.0/20".parse().ok(), "eth1", resolver)
    }

    #[test]
    fn test_loopback_is_private() {
        assert!(is_private(ip("127.0.0.1"), None));
        assert!(is_private(ip("127.8.9.10"), None));
        assert!(is_private(ip("::1"), None));
    }

    #[test]
    fn test_site_local_is_private() {
        assert!(is_private(ip("10.0.0.1"), None));
        assert!(is_private(ip("172.16.0.1"), None));
        assert!(is_private(ip("172.31.255.255"), None));
        assert!(is_private(ip("192.168.1.1"), None));
        assert!(is_private(ip("fec0::1"), None));
    }

    #[test]
    fn test_link_local_is_private() {
        assert!(is_private(ip("169.254.169.254"), None));
        assert!(is_private(ip("fe80::1"), None));
    }

    #[test]
    fn test_public_is_not_private() {
        assert!(!is_private(ip("8.8.8.8"), None));
        assert!(!is_private(ip("172.32.0.1"), None));
        assert!(!is_private(ip("2001:4860:4860::8888"), None));
    }

    #[test]
    fn test_managed_range_is_private() {
        let range: IpNet = "34.118.224.0/20".parse().unwrap();
        assert!(is_private(ip("34.118.224.1"), Some(&range)));
        assert!(is_private(ip("34.118.239.254"), Some(&range)));
        assert!(!is_private(ip("34.118.240.1"), Some(&range)));
        assert!(!is_private(ip("34.118.224.1"), None));
    }

    #[test]
    fn test_ipv4_mapped_ipv6_uses_ipv4_rules() {
        assert!(is_private(ip("::ffff:10.0.0.1"), None));
        assert!(!is_private(ip("::ffff:8.8.8.8"), None));

        let range: IpNet = "34.118.224.0/20".parse().unwrap();
        assert!(is_private(ip("::ffff:34.118.224.9"), Some(&range)));
    }

    // ===========================================
    // AddressPolicy tests
    // ===========================================

    #[tokio::test]
    async fn test_standalone_blocks_private() {
        let resolver = Arc::new(StaticNicResolver::new("eth1"));
        let policy = policy(DeploymentMode::Standalone, resolver.clone());

        let err = policy.check(ip("10.0.0.1")).await.unwrap_err();
        assert_eq!(err.to_string(), "Ingress Route not allowed For Private IPs: 10.0.0.1");
        assert!(policy.check(ip("34.118.224.7")).await.is_err());
        assert!(policy.check(ip("8.8.8.8")).await.is_ok());
        // Standalone mode never consults the route table.
        assert_eq!(resolver.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_transit_blocks_private_via_internal_interface() {
        let policy = policy(DeploymentMode::Transit, Arc::new(StaticNicResolver::new("eth1")));
        let err = policy.check(ip("10.0.0.1")).await.unwrap_err();
        assert!(matches!(err, GateError::PrivateAddress(_)));
        assert!(policy.check(ip("8.8.8.8")).await.is_ok());
    }

    #[tokio::test]
    async fn test_shared_vpc_allows_private_via_external_interface() {
        let policy = policy(DeploymentMode::SharedVpc, Arc::new(StaticNicResolver::new("eth0")));
        assert!(policy.check(ip("10.0.0.1")).await.is_ok());
        assert!(policy.check(ip("8.8.8.8")).await.is_ok());
    }

    #[tokio::test]
    async fn test_route_failure_is_route_resolution_error() {
        let policy = policy(
            DeploymentMode::SharedVpc,
            Arc::new(StaticNicResolver::failing("RTNETLINK answers: No route to host")),
        );
        let err = policy.check(ip("10.0.0.1")).await.unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::UNAUTHORIZED);
        assert!(err.to_string().starts_with("Could not resolve route: "));
        assert!(err.to_string().contains("No route to host"));
    }

    #[tokio::test]
    async fn test_unrecognized_mode_names_the_mode() {
        let policy = policy(
            DeploymentMode::parse("MESH"),
            Arc::new(StaticNicResolver::new("eth0")),
        );
        let err = policy.check(ip("8.8.8.8")).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown proxy type: MESH");
        assert_eq!(err.status_code(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
