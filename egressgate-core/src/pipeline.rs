//! Filter chain assembly.
//!
//! Startup builds three things, in order:
//!
//! 1. a [`FilterRegistry`] holding the shared engines every filter needs,
//!    plus any custom filters registered by the embedding application;
//! 2. a [`FilterConfiguration`] resolving the configured filter names into
//!    ordered lists of [`FilterSpec`]s (unknown names are skipped with a
//!    warning);
//! 3. a [`FilterSource`] that picks and instantiates the chain for each
//!    request.
//!
//! Once the registry is moved into the source it can no longer be extended,
//! so the set of filters is fixed for the lifetime of the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::address::AddressPolicy;
use crate::bridge::UpgradeBridge;
use crate::defaults;
use crate::domains::AllowedEgressDomains;
use crate::error::Result;
use crate::filter::{CompositeFilter, HttpFilter};
use crate::filters::{
    ClientAddressFilter, DebugEnvironment, EgressDomainFilter, InternalAddressFilter,
    InvalidPlatformFilter, LegacyRequestFilter, LivenessFilter, ProxyDebugFilter,
    ProxyMetricsFilter, UpgradeRequestFilter, VpcEndpointFilter, VpcEndpointGuard,
};
use crate::lookup::{HostLookup, SystemHostLookup};
use crate::message::ProxyRequest;
use crate::metrics::ProxyMetrics;
use crate::on_premises::OnPremisesTarget;
use crate::route::{CachedNicResolver, CommandRunner, IpRouteNicResolver, NicResolver, SystemCommandRunner};
use crate::types::{CloudPlatform, ConfigProvider};

/// Creates a fresh filter for one request.
pub type FilterFactory = Arc<dyn Fn(&ProxyRequest) -> Box<dyn HttpFilter> + Send + Sync>;

// ============================================================================
// Filter kinds
// ============================================================================

/// Filters shipped with the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinFilter {
    VpcEndpoint,
    EgressDomain,
    InternalAddress,
    ClientAddress,
    UpgradeRequest,
    ProxyMetrics,
    ProxyDebug,
    LegacyRequest,
}

impl BuiltinFilter {
    pub const ALL: [BuiltinFilter; 8] = [
        Self::VpcEndpoint,
        Self::EgressDomain,
        Self::InternalAddress,
        Self::ClientAddress,
        Self::UpgradeRequest,
        Self::ProxyMetrics,
        Self::ProxyDebug,
        Self::LegacyRequest,
    ];

    /// Name used in filter lists.
    pub fn name(self) -> &'static str {
        match self {
            Self::VpcEndpoint => "VpcEndpointFilter",
            Self::EgressDomain => "EgressDomainFilter",
            Self::InternalAddress => "InternalAddressFilter",
            Self::ClientAddress => "ClientAddressFilter",
            Self::UpgradeRequest => "UpgradeRequestFilter",
            Self::ProxyMetrics => "ProxyMetricsFilter",
            Self::ProxyDebug => "ProxyDebugFilter",
            Self::LegacyRequest => "LegacyRequestFilter",
        }
    }

    /// Parses a filter name. Names used by earlier deployments are accepted
    /// as aliases.
    ///
    /// ```
    /// use egressgate_core::pipeline::BuiltinFilter;
    ///
    /// assert_eq!(BuiltinFilter::from_name("EgressDomainFilter"), Some(BuiltinFilter::EgressDomain));
    /// assert_eq!(BuiltinFilter::from_name("IpAddressRequestFilter"), Some(BuiltinFilter::ClientAddress));
    /// assert_eq!(BuiltinFilter::from_name("Nope"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(filter) = Self::ALL.into_iter().find(|filter| filter.name() == name) {
            return Some(filter);
        }
        match name {
            "AwsDisallowInternalAddressForTransitVpc" => Some(Self::VpcEndpoint),
            "AwsFilterEgressTrafficByDomain" => Some(Self::EgressDomain),
            "GCPDisallowInternalAddressFilter" => Some(Self::InternalAddress),
            "IpAddressRequestFilter" => Some(Self::ClientAddress),
            _ => None,
        }
    }
}

impl fmt::Display for BuiltinFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One resolved entry of a filter list.
#[derive(Clone)]
pub enum FilterSpec {
    Builtin(BuiltinFilter),
    Custom { name: String, factory: FilterFactory },
}

impl FilterSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(filter) => filter.name(),
            Self::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(filter) => f.debug_tuple("Builtin").field(filter).finish(),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Long-lived collaborators shared by every request.
#[derive(Clone)]
pub struct SharedServices {
    pub metrics: Arc<ProxyMetrics>,
    pub bridge: Arc<UpgradeBridge>,
    pub nic_resolver: Arc<dyn NicResolver>,
    pub command_runner: Arc<dyn CommandRunner>,
    pub host_lookup: Arc<dyn HostLookup>,
}

impl SharedServices {
    /// Services backed by the host: `ip route get` behind an LRU cache, the
    /// system resolver and a pooled bridge client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the bridge client cannot be built.
    pub fn system(config: &impl ConfigProvider, metrics: Arc<ProxyMetrics>) -> Result<Self> {
        let command_runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let route_resolver = Arc::new(IpRouteNicResolver::new(command_runner.clone()));
        let nic_resolver = Arc::new(CachedNicResolver::with_capacity(
            route_resolver,
            config.route_cache_capacity(),
        ));

        Ok(Self {
            metrics,
            bridge: Arc::new(UpgradeBridge::new(config.bridge_config())?),
            nic_resolver,
            command_runner,
            host_lookup: Arc::new(SystemHostLookup),
        })
    }
}

/// Why a filter name did not resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unresolved {
    /// Neither a custom nor a built-in filter.
    Unknown,
    /// A built-in filter whose environment variable is not set.
    NotConfigured(&'static str),
}

/// Knows how to build every available filter.
pub struct FilterRegistry {
    custom: HashMap<String, FilterFactory>,
    services: SharedServices,
    egress_domains: Arc<AllowedEgressDomains>,
    enforce_egress_domains: bool,
    address_policy: Arc<AddressPolicy>,
    client_address: ClientAddressFilter,
    upgrade_http_requests: bool,
    vpc_endpoint: Arc<VpcEndpointGuard>,
    on_premises: Option<Arc<OnPremisesTarget>>,
    debug: Arc<DebugEnvironment>,
}

impl FilterRegistry {
    /// Builds the shared engines from `config`.
    pub fn new(config: &impl ConfigProvider, services: SharedServices) -> Self {
        let address_policy = AddressPolicy::new(
            config.deployment_mode().clone(),
            config.managed_service_range().cloned(),
            config.internal_interface(),
            services.nic_resolver.clone(),
        );

        let debug = DebugEnvironment {
            runner: services.command_runner.clone(),
            lookup: services.host_lookup.clone(),
            internal_interface: config.internal_interface().to_string(),
            external_interface: config.external_interface().to_string(),
        };

        let on_premises = config
            .webhook_target()
            .and_then(|target| OnPremisesTarget::new(target, config.allow_api_ingress()))
            .map(Arc::new);

        Self {
            custom: HashMap::new(),
            egress_domains: Arc::new(AllowedEgressDomains::parse(
                config.allowed_egress_domains().unwrap_or_default(),
            )),
            enforce_egress_domains: config.enforce_allowed_egress_domains(),
            address_policy: Arc::new(address_policy),
            client_address: ClientAddressFilter::new(
                config.allowed_proxy_address(),
                config.allowed_proxy_address_type(),
            ),
            upgrade_http_requests: config.upgrade_http_requests(),
            vpc_endpoint: Arc::new(VpcEndpointGuard::from_webhook_target(config.webhook_target())),
            on_premises,
            debug: Arc::new(debug),
            services,
        }
    }

    /// Registers a custom filter under `name`.
    ///
    /// A custom filter registered under a built-in name replaces the
    /// built-in.
    pub fn register_custom(&mut self, name: impl Into<String>, factory: FilterFactory) {
        let name = name.into();
        info!(filter = %name, "Registered custom filter");
        self.custom.insert(name, factory);
    }

    pub fn services(&self) -> &SharedServices {
        &self.services
    }

    /// Resolves a filter name.
    ///
    /// # Errors
    ///
    /// [`Unresolved::Unknown`] for names neither registered nor built in,
    /// [`Unresolved::NotConfigured`] for built-ins whose configuration is
    /// missing.
    pub fn resolve(&self, name: &str) -> std::result::Result<FilterSpec, Unresolved> {
        if let Some(factory) = self.custom.get(name) {
            return Ok(FilterSpec::Custom {
                name: name.to_string(),
                factory: factory.clone(),
            });
        }

        let builtin = BuiltinFilter::from_name(name).ok_or(Unresolved::Unknown)?;
        match builtin {
            BuiltinFilter::LegacyRequest if self.on_premises.is_none() => {
                Err(Unresolved::NotConfigured("WEBHOOK_TARGET"))
            }
            BuiltinFilter::VpcEndpoint if *self.vpc_endpoint == VpcEndpointGuard::Disabled => {
                warn!(filter = %builtin, "WEBHOOK_TARGET is not set; VPC endpoint guard is inactive");
                Ok(FilterSpec::Builtin(builtin))
            }
            _ => Ok(FilterSpec::Builtin(builtin)),
        }
    }

    /// Creates the filter described by `spec` for `request`.
    fn instantiate(&self, spec: &FilterSpec, request: &ProxyRequest) -> Option<Box<dyn HttpFilter>> {
        let builtin = match spec {
            FilterSpec::Custom { factory, .. } => return Some(factory(request)),
            FilterSpec::Builtin(builtin) => *builtin,
        };

        let filter: Box<dyn HttpFilter> = match builtin {
            BuiltinFilter::VpcEndpoint => Box::new(VpcEndpointFilter::new(self.vpc_endpoint.clone())),
            BuiltinFilter::EgressDomain => Box::new(EgressDomainFilter::new(
                self.egress_domains.clone(),
                self.enforce_egress_domains,
            )),
            BuiltinFilter::InternalAddress => {
                Box::new(InternalAddressFilter::new(self.address_policy.clone()))
            }
            BuiltinFilter::ClientAddress => Box::new(self.client_address.clone()),
            BuiltinFilter::UpgradeRequest => Box::new(UpgradeRequestFilter::new(
                self.upgrade_http_requests,
                request,
                self.services.bridge.clone(),
            )),
            BuiltinFilter::ProxyMetrics => {
                Box::new(ProxyMetricsFilter::new(self.services.metrics.clone(), request))
            }
            BuiltinFilter::ProxyDebug => Box::new(ProxyDebugFilter::new(self.debug.clone())),
            BuiltinFilter::LegacyRequest => Box::new(LegacyRequestFilter::new(
                self.on_premises.clone()?,
                self.services.bridge.clone(),
            )),
        };
        Some(filter)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Comma-separated filter lists, one per chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterNames {
    pub aws: String,
    pub google: String,
    pub cross_platform: String,
    pub debug: String,
    pub legacy: String,
}

impl Default for FilterNames {
    fn default() -> Self {
        Self {
            aws: defaults::AWS_FILTERS.to_string(),
            google: defaults::GOOGLE_FILTERS.to_string(),
            cross_platform: defaults::CROSS_PLATFORM_FILTERS.to_string(),
            debug: defaults::DEBUG_FILTERS.to_string(),
            legacy: defaults::LEGACY_FILTERS.to_string(),
        }
    }
}

/// Resolved filter lists.
#[derive(Clone, Debug, Default)]
pub struct FilterConfiguration {
    pub aws: Vec<FilterSpec>,
    pub google: Vec<FilterSpec>,
    pub cross_platform: Vec<FilterSpec>,
    pub debug: Vec<FilterSpec>,
    pub legacy: Vec<FilterSpec>,
}

impl FilterConfiguration {
    /// Resolves every list against `registry`. Blank entries are ignored and
    /// unknown names are skipped with a warning.
    pub fn from_names(registry: &FilterRegistry, names: &FilterNames) -> Self {
        Self {
            aws: resolve_list(registry, &names.aws),
            google: resolve_list(registry, &names.google),
            cross_platform: resolve_list(registry, &names.cross_platform),
            debug: resolve_list(registry, &names.debug),
            legacy: resolve_list(registry, &names.legacy),
        }
    }
}

fn resolve_list(registry: &FilterRegistry, names: &str) -> Vec<FilterSpec> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| match registry.resolve(name) {
            Ok(spec) => Some(spec),
            Err(Unresolved::Unknown) => {
                warn!(filter = %name, "Unknown filter");
                None
            }
            Err(Unresolved::NotConfigured(variable)) => {
                warn!(filter = %name, variable, "Skipping filter: required variable is not set");
                None
            }
        })
        .collect()
}

// ============================================================================
// Per-request selection
// ============================================================================

/// Picks and instantiates the filter chain for each request.
pub struct FilterSource {
    registry: FilterRegistry,
    configuration: FilterConfiguration,
    platform: CloudPlatform,
}

impl FilterSource {
    pub fn new(registry: FilterRegistry, configuration: FilterConfiguration, platform: CloudPlatform) -> Self {
        Self {
            registry,
            configuration,
            platform,
        }
    }

    pub fn platform(&self) -> &CloudPlatform {
        &self.platform
    }

    pub fn configuration(&self) -> &FilterConfiguration {
        &self.configuration
    }

    pub fn services(&self) -> &SharedServices {
        self.registry.services()
    }

    /// Returns the chain for `request`.
    ///
    /// - `/liveness_check...`: liveness answer only.
    /// - `/proxy_debug...`: the debug chain.
    /// - `/proxy/...`: the legacy chain, when it is not empty.
    /// - anything else: the cross-platform chain followed by the platform
    ///   chain, or a chain refusing everything when the platform is not
    ///   recognised.
    pub fn filter_request(&self, request: &ProxyRequest) -> Box<dyn HttpFilter> {
        let target = request.target.as_str();
        debug!(method = %request.method, uri = %target, "Selecting filter chain");

        if target.starts_with(defaults::LIVENESS_PATH) {
            return Box::new(LivenessFilter);
        }
        if target.starts_with(defaults::DEBUG_PATH) {
            return self.chain(&[&self.configuration.debug], request);
        }
        if target.starts_with(defaults::LEGACY_PATH) && !self.configuration.legacy.is_empty() {
            return self.chain(&[&self.configuration.legacy], request);
        }

        let platform_filters = match &self.platform {
            CloudPlatform::Aws => &self.configuration.aws,
            CloudPlatform::Google => &self.configuration.google,
            CloudPlatform::Unrecognized(platform) => {
                return Box::new(InvalidPlatformFilter::new(platform.clone()));
            }
        };
        self.chain(&[&self.configuration.cross_platform, platform_filters], request)
    }

    fn chain(&self, lists: &[&Vec<FilterSpec>], request: &ProxyRequest) -> Box<dyn HttpFilter> {
        let filters = lists
            .iter()
            .flat_map(|list| list.iter())
            .filter_map(|spec| self.registry.instantiate(spec, request))
            .collect();
        Box::new(CompositeFilter::new(filters))
    }
}
