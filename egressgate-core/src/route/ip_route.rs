//! Route resolution through `ip route get`.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::NicResolver;
use super::command::{CommandRunner, SystemCommandRunner};
use crate::error::{GateError, Result};

static DEVICE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\bdev\s+(\S+)").ok());
static SOURCE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\bsrc\s+(\S+)").ok());

/// Extracts the interface name following `dev` in `ip route get` output.
///
/// ```
/// use egressgate_core::route::ip_route::parse_device;
///
/// let output = "10.64.32.2 via 10.128.0.1 dev eth1 src 10.128.0.3 uid 20162";
/// assert_eq!(parse_device(output), Some("eth1"));
/// ```
pub fn parse_device(output: &str) -> Option<&str> {
    capture(&DEVICE_PATTERN, output)
}

/// Extracts the source address following `src` in `ip route get` output.
pub fn parse_source(output: &str) -> Option<&str> {
    capture(&SOURCE_PATTERN, output)
}

fn capture<'a>(pattern: &Lazy<Option<Regex>>, output: &'a str) -> Option<&'a str> {
    pattern
        .as_ref()?
        .captures(output)?
        .get(1)
        .map(|m| m.as_str())
}

/// Asks the kernel routing table which interface reaches an address.
#[derive(Clone)]
pub struct IpRouteNicResolver {
    runner: Arc<dyn CommandRunner>,
}

impl IpRouteNicResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Default for IpRouteNicResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemCommandRunner))
    }
}

#[async_trait]
impl NicResolver for IpRouteNicResolver {
    async fn resolve(&self, ip: &str) -> Result<String> {
        let output = self
            .runner
            .run("ip", &["route", "get", ip])
            .await
            .map_err(|err| GateError::RouteResolution(err.to_string()))?;

        match parse_device(&output.stdout) {
            Some(device) => Ok(device.to_string()),
            None if output.stderr.is_empty() => Err(GateError::RouteResolution(format!(
                "NIC not found in route output for {ip}"
            ))),
            None => Err(GateError::RouteResolution(format!(
                "NIC not found in route output for {ip}: {}",
                output.stderr
            ))),
        }
    }
}
