//! Client address allow-listing.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::GateError;
use crate::filter::HttpFilter;
use crate::message::ProxyRequest;
use crate::response::GateResponse;
use crate::types::ClientAddressSource;

const LOCALHOST: &str = "127.0.0.1";

/// Accepts only requests from the configured address or from localhost.
///
/// Depending on the configured [`ClientAddressSource`], the remote peer
/// address or the local address the client connected to is compared.
/// Requests whose address is unknown are refused.
#[derive(Clone, Debug)]
pub struct ClientAddressFilter {
    allowed_address: Option<String>,
    source: ClientAddressSource,
}

impl ClientAddressFilter {
    pub fn new(allowed_address: Option<&str>, source: ClientAddressSource) -> Self {
        Self {
            allowed_address: allowed_address.map(|address| address.trim().to_string()),
            source,
        }
    }

    fn accepts(&self, address: &str) -> bool {
        address == LOCALHOST || self.allowed_address.as_deref() == Some(address)
    }
}

#[async_trait]
impl HttpFilter for ClientAddressFilter {
    async fn on_client_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        let socket = match self.source {
            ClientAddressSource::Remote => request.connection.remote,
            ClientAddressSource::Local => request.connection.local,
        };

        let Some(socket) = socket else {
            warn!(source = ?self.source, "Rejected proxy request with unknown client address");
            return Some(GateError::ClientNotAllowed("unknown".to_string()).into_response());
        };

        let address = socket.ip().to_canonical().to_string();
        if self.accepts(&address) {
            debug!(address = %socket, "Client address accepted");
            return None;
        }

        warn!(address = %socket, "Rejected proxy request");
        Some(GateError::ClientNotAllowed(address).into_response())
    }
}
