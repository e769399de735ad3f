//! Guard against reaching the VPC endpoint that fronts the webhook target.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::Uri;
use tracing::{error, warn};

use crate::error::GateError;
use crate::filter::HttpFilter;
use crate::message::ProxyRequest;
use crate::response::GateResponse;

/// The guarded endpoint, derived once from the webhook target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VpcEndpointGuard {
    /// No webhook target is configured; nothing is guarded.
    Disabled,
    /// Requests resolving to this host are refused.
    Endpoint(String),
    /// The webhook target could not be parsed; every request is refused.
    Invalid(String),
}

impl VpcEndpointGuard {
    pub fn from_webhook_target(webhook_target: Option<&str>) -> Self {
        let Some(target) = webhook_target.map(str::trim).filter(|target| !target.is_empty()) else {
            return Self::Disabled;
        };

        match target.parse::<Uri>() {
            Ok(uri) => match uri.host() {
                Some(host) => Self::Endpoint(host.trim_start_matches('[').trim_end_matches(']').to_string()),
                None => Self::Invalid(target.to_string()),
            },
            Err(_) => Self::Invalid(target.to_string()),
        }
    }
}

/// Refuses requests whose resolved address is the guarded endpoint.
pub struct VpcEndpointFilter {
    guard: Arc<VpcEndpointGuard>,
    rejection: Option<GateError>,
}

impl VpcEndpointFilter {
    pub fn new(guard: Arc<VpcEndpointGuard>) -> Self {
        Self {
            guard,
            rejection: None,
        }
    }
}

#[async_trait]
impl HttpFilter for VpcEndpointFilter {
    async fn on_client_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        if let VpcEndpointGuard::Invalid(target) = self.guard.as_ref() {
            error!(webhook_target = %target, "Refusing request: webhook target is not a valid URI");
            return Some(GateError::ConfigError(format!("invalid webhook target: {target}")).into_response());
        }
        None
    }

    async fn on_upstream_address_resolved(&mut self, host_port: &str, address: SocketAddr) {
        if let VpcEndpointGuard::Endpoint(endpoint) = self.guard.as_ref()
            && address.ip().to_string() == *endpoint
        {
            warn!(host = %host_port, address = %address, "Blocking request to VPC endpoint");
            self.rejection = Some(GateError::EndpointBlocked(endpoint.clone()));
        }
    }

    async fn on_upstream_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        self.rejection.take().map(GateError::into_response)
    }
}
