//! Liveness probe answered by the gateway itself.

use async_trait::async_trait;
use hyper::StatusCode;

use crate::filter::HttpFilter;
use crate::headers;
use crate::message::ProxyRequest;
use crate::response::{GateResponse, create_text_response};

/// Answers every request with `200 OK`.
#[derive(Debug, Default)]
pub struct LivenessFilter;

#[async_trait]
impl HttpFilter for LivenessFilter {
    async fn on_client_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        Some(create_text_response(StatusCode::OK, headers::TEXT_PLAIN, "OK"))
    }
}
