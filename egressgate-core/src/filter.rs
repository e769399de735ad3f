//! The four-hook filter abstraction and its composite.
//!
//! The hosting engine creates one filter per request and calls, in order:
//!
//! 1. [`HttpFilter::on_client_request`] once the request has been aggregated,
//! 2. [`HttpFilter::on_upstream_address_resolved`] once the destination host
//!    has been resolved,
//! 3. [`HttpFilter::on_upstream_request`] right before contacting upstream,
//! 4. [`HttpFilter::on_upstream_response`] on whatever response goes back to
//!    the client, whether it came from upstream or from a filter.
//!
//! A response returned from either request hook is terminal: the upstream is
//! not contacted and the response is passed straight to step 4.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::message::ProxyRequest;
use crate::response::GateResponse;

/// A per-request interceptor.
///
/// Every hook defaults to "no opinion", so implementations override only the
/// hooks they care about. Filters own per-request state (decisions stashed
/// between hooks, start timestamps), which is why hooks take `&mut self`.
#[async_trait]
pub trait HttpFilter: Send {
    /// Inspects or rewrites the request before anything is resolved.
    async fn on_client_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        None
    }

    /// Observes the address the upstream host resolved to.
    async fn on_upstream_address_resolved(&mut self, _host_port: &str, _address: SocketAddr) {}

    /// Last chance to block or substitute the upstream exchange.
    async fn on_upstream_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        None
    }

    /// Observes or transforms the response sent to the client.
    fn on_upstream_response(&mut self, response: GateResponse) -> GateResponse {
        response
    }
}

/// Runs an ordered list of filters as one.
///
/// Request hooks stop at the first member that answers; the resolution hook
/// reaches every member; the response hook threads the response through every
/// member in order.
#[derive(Default)]
pub struct CompositeFilter {
    filters: Vec<Box<dyn HttpFilter>>,
}

impl CompositeFilter {
    pub fn new(filters: Vec<Box<dyn HttpFilter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[async_trait]
impl HttpFilter for CompositeFilter {
    async fn on_client_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        for filter in &mut self.filters {
            if let Some(response) = filter.on_client_request(request).await {
                return Some(response);
            }
        }
        None
    }

    async fn on_upstream_address_resolved(&mut self, host_port: &str, address: SocketAddr) {
        for filter in &mut self.filters {
            filter.on_upstream_address_resolved(host_port, address).await;
        }
    }

    async fn on_upstream_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        for filter in &mut self.filters {
            if let Some(response) = filter.on_upstream_request(request).await {
                return Some(response);
            }
        }
        None
    }

    fn on_upstream_response(&mut self, response: GateResponse) -> GateResponse {
        self.filters
            .iter_mut()
            .fold(response, |response, filter| filter.on_upstream_response(response))
    }
}
