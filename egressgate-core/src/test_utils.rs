//! Test utilities for egressgate.
//!
//! This module provides shared test configuration and fakes used across unit
//! tests. It is only compiled when running tests (`#[cfg(test)]`).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::IpNet;
use parking_lot::Mutex;

use crate::defaults;
use crate::error::{GateError, Result};
use crate::lookup::HostLookup;
use crate::route::{CommandRunner, NicResolver, ProcessOutput};
use crate::types::{
    AddressPolicyProvider, BridgeConfig, ClientAccessProvider, ClientAddressSource, CloudPlatform,
    DeploymentMode, EgressPolicyProvider, ForwardingProvider, PlatformProvider,
};

/// Shared test configuration for unit tests.
///
/// This struct implements all configuration traits with sensible defaults
/// and builder methods for customization.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub cloud_platform: CloudPlatform,
    pub enforce_allowed_egress_domains: bool,
    pub allowed_egress_domains: Option<String>,
    pub deployment_mode: DeploymentMode,
    pub managed_service_range: Option<IpNet>,
    pub internal_interface: String,
    pub external_interface: String,
    pub route_cache_capacity: usize,
    pub allowed_proxy_address: Option<String>,
    pub allowed_proxy_address_type: ClientAddressSource,
    pub upgrade_http_requests: bool,
    pub webhook_target: Option<String>,
    pub allow_api_ingress: bool,
    pub bridge: BridgeConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            cloud_platform: CloudPlatform::Google,
            enforce_allowed_egress_domains: false,
            allowed_egress_domains: None,
            deployment_mode: DeploymentMode::Standalone,
            managed_service_range: None,
            internal_interface: defaults::INTERNAL_INTERFACE.to_string(),
            external_interface: defaults::EXTERNAL_INTERFACE.to_string(),
            route_cache_capacity: defaults::ROUTE_CACHE_CAPACITY,
            allowed_proxy_address: None,
            allowed_proxy_address_type: ClientAddressSource::Remote,
            upgrade_http_requests: false,
            webhook_target: None,
            allow_api_ingress: false,
            bridge: BridgeConfig::default(),
        }
    }
}

impl TestConfig {
    /// Create a new test configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platform(mut self, platform: CloudPlatform) -> Self {
        self.cloud_platform = platform;
        self
    }

    /// Enforce the given comma-separated egress allow-list.
    pub fn with_allowed_egress_domains(mut self, domains: &str) -> Self {
        self.enforce_allowed_egress_domains = true;
        self.allowed_egress_domains = Some(domains.to_string());
        self
    }

    pub fn with_deployment_mode(mut self, mode: DeploymentMode) -> Self {
        self.deployment_mode = mode;
        self
    }

    pub fn with_allowed_proxy_address(mut self, address: &str) -> Self {
        self.allowed_proxy_address = Some(address.to_string());
        self
    }

    pub fn with_upgrade_http_requests(mut self, upgrade: bool) -> Self {
        self.upgrade_http_requests = upgrade;
        self
    }

    pub fn with_webhook_target(mut self, target: &str, allow_api_ingress: bool) -> Self {
        self.webhook_target = Some(target.to_string());
        self.allow_api_ingress = allow_api_ingress;
        self
    }
}

impl PlatformProvider for TestConfig {
    fn cloud_platform(&self) -> &CloudPlatform {
        &self.cloud_platform
    }
}

impl EgressPolicyProvider for TestConfig {
    fn enforce_allowed_egress_domains(&self) -> bool {
        self.enforce_allowed_egress_domains
    }

    fn allowed_egress_domains(&self) -> Option<&str> {
        self.allowed_egress_domains.as_deref()
    }
}

impl AddressPolicyProvider for TestConfig {
    fn deployment_mode(&self) -> &DeploymentMode {
        &self.deployment_mode
    }

    fn managed_service_range(&self) -> Option<&IpNet> {
        self.managed_service_range.as_ref()
    }

    fn internal_interface(&self) -> &str {
        &self.internal_interface
    }

    fn external_interface(&self) -> &str {
        &self.external_interface
    }

    fn route_cache_capacity(&self) -> usize {
        self.route_cache_capacity
    }
}

impl ClientAccessProvider for TestConfig {
    fn allowed_proxy_address(&self) -> Option<&str> {
        self.allowed_proxy_address.as_deref()
    }

    fn allowed_proxy_address_type(&self) -> ClientAddressSource {
        self.allowed_proxy_address_type
    }
}

impl ForwardingProvider for TestConfig {
    fn upgrade_http_requests(&self) -> bool {
        self.upgrade_http_requests
    }

    fn webhook_target(&self) -> Option<&str> {
        self.webhook_target.as_deref()
    }

    fn allow_api_ingress(&self) -> bool {
        self.allow_api_ingress
    }

    fn bridge_config(&self) -> &BridgeConfig {
        &self.bridge
    }
}

/// Command runner answering from a script keyed by program name.
///
/// Unscripted programs fail as if they could not be started. Clones share
/// the call log.
#[derive(Clone, Default)]
pub struct FakeCommandRunner {
    outputs: HashMap<String, ProcessOutput>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, program: &str, output: ProcessOutput) -> Self {
        self.outputs.insert(program.to_string(), output);
        self
    }

    /// Command lines run so far, program and arguments joined by spaces.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<ProcessOutput> {
        let mut line = vec![program];
        line.extend_from_slice(args);
        self.calls.lock().push(line.join(" "));

        self.outputs
            .get(program)
            .cloned()
            .ok_or_else(|| GateError::Command(format!("{program}: not found")))
    }
}

/// NIC resolver that answers every address with the same interface, or
/// always fails, and counts lookups per address.
pub struct StaticNicResolver {
    answer: std::result::Result<String, String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticNicResolver {
    pub fn new(nic: &str) -> Self {
        Self {
            answer: Ok(nic.to_string()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self, ip: &str) -> usize {
        self.calls.lock().get(ip).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl NicResolver for StaticNicResolver {
    async fn resolve(&self, ip: &str) -> Result<String> {
        *self.calls.lock().entry(ip.to_string()).or_insert(0) += 1;
        self.answer.clone().map_err(GateError::RouteResolution)
    }
}

/// Host lookup backed by a fixed table.
#[derive(Clone, Default)]
pub struct FakeHostLookup {
    hosts: HashMap<String, IpAddr>,
}

impl FakeHostLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, ip: &str) -> Self {
        if let Ok(ip) = ip.parse() {
            self.hosts.insert(host.to_string(), ip);
        }
        self
    }
}

#[async_trait]
impl HostLookup for FakeHostLookup {
    async fn lookup(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        self.hosts
            .get(host)
            .map(|ip| vec![SocketAddr::new(*ip, port)])
            .ok_or_else(|| GateError::UpstreamConnectionFailed(format!("could not resolve {host}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TestConfig::new();
        assert_eq!(config.cloud_platform(), &CloudPlatform::Google);
        assert!(!config.enforce_allowed_egress_domains());
        assert_eq!(config.internal_interface(), "eth1");
        assert!(config.bridge_config().is_valid());
    }

    #[test]
    fn test_builder_methods() {
        let config = TestConfig::new()
            .with_platform(CloudPlatform::Aws)
            .with_allowed_egress_domains("glean.com")
            .with_webhook_target("http://hooks", true);

        assert_eq!(config.cloud_platform(), &CloudPlatform::Aws);
        assert!(config.enforce_allowed_egress_domains());
        assert_eq!(config.allowed_egress_domains(), Some("glean.com"));
        assert_eq!(config.webhook_target(), Some("http://hooks"));
        assert!(config.allow_api_ingress());
    }

    #[tokio::test]
    async fn test_fake_command_runner_records_calls() {
        let runner = FakeCommandRunner::new().with_output("ip", ProcessOutput::default());
        assert!(runner.run("ip", &["route", "get", "1.1.1.1"]).await.is_ok());
        assert!(runner.run("nslookup", &["x"]).await.is_err());
        assert_eq!(runner.calls(), vec!["ip route get 1.1.1.1", "nslookup x"]);
    }
}
