//! Egress domain enforcement.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domains::{AllowedEgressDomains, extract_host};
use crate::error::GateError;
use crate::filter::HttpFilter;
use crate::message::ProxyRequest;
use crate::response::GateResponse;

/// Rejects requests whose destination host is not on the allow-list.
///
/// The host is always extracted, so a malformed target is answered with 400
/// even when enforcement is off. A denied host is answered with 403.
pub struct EgressDomainFilter {
    domains: Arc<AllowedEgressDomains>,
    enforce: bool,
}

impl EgressDomainFilter {
    pub fn new(domains: Arc<AllowedEgressDomains>, enforce: bool) -> Self {
        Self { domains, enforce }
    }

    /// Returns true if egress to `host` is permitted.
    pub fn is_allowed(&self, host: &str) -> bool {
        !self.enforce || self.domains.is_allowed(host)
    }
}

#[async_trait]
impl HttpFilter for EgressDomainFilter {
    async fn on_client_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        let host = match extract_host(request) {
            Ok(host) => host,
            Err(err) => {
                warn!(uri = %request.target, error = %err, "Rejecting egress request with unparsable target");
                return Some(err.into_response());
            }
        };

        if self.is_allowed(&host) {
            return None;
        }

        warn!(host = %host, uri = %request.target, "Blocking egress request to forbidden host");
        Some(GateError::DomainNotAllowed(host).into_response())
    }
}
