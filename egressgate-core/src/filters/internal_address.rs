//! Internal-address blocking.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::address::AddressPolicy;
use crate::error::GateError;
use crate::filter::HttpFilter;
use crate::message::ProxyRequest;
use crate::response::GateResponse;

/// Blocks requests whose resolved destination violates the address policy.
///
/// The decision is taken when the address is resolved and reported when the
/// upstream request is about to be sent.
pub struct InternalAddressFilter {
    policy: Arc<AddressPolicy>,
    rejection: Option<GateError>,
}

impl InternalAddressFilter {
    pub fn new(policy: Arc<AddressPolicy>) -> Self {
        Self {
            policy,
            rejection: None,
        }
    }
}

#[async_trait]
impl HttpFilter for InternalAddressFilter {
    async fn on_upstream_address_resolved(&mut self, host_port: &str, address: SocketAddr) {
        if let Err(err) = self.policy.check(address.ip()).await {
            if err.is_server_error() {
                error!(host = %host_port, address = %address, error = %err, "Address policy misconfigured");
            } else {
                warn!(host = %host_port, address = %address, error = %err, "Blocking upstream address");
            }
            self.rejection = Some(err);
        }
    }

    async fn on_upstream_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        self.rejection.take().map(GateError::into_response)
    }
}
