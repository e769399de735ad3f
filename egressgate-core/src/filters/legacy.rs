//! Legacy `/proxy/<intent>/...` requests addressed to the gateway itself.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::HeaderValue;
use hyper::{StatusCode, Uri};
use tracing::{debug, error};

use crate::bridge::UpgradeBridge;
use crate::defaults;
use crate::filter::HttpFilter;
use crate::headers;
use crate::message::ProxyRequest;
use crate::on_premises::OnPremisesTarget;
use crate::response::{GateResponse, create_text_response};

/// Rewrites legacy paths onto the on-premises target.
///
/// The second path segment is the intent: `webhook` is always accepted,
/// `api` and `rest` only when API ingress is allowed. The request target and
/// `Host` header are rewritten; when the configured target was `https://`
/// the rewritten request is sent through the upgrade bridge.
pub struct LegacyRequestFilter {
    target: Arc<OnPremisesTarget>,
    bridge: Arc<UpgradeBridge>,
}

impl LegacyRequestFilter {
    pub fn new(target: Arc<OnPremisesTarget>, bridge: Arc<UpgradeBridge>) -> Self {
        Self { target, bridge }
    }

    fn is_intent_allowed(&self, intent: &str) -> bool {
        match intent {
            "webhook" => true,
            "api" | "rest" => self.target.is_api_ingress_allowed(),
            _ => false,
        }
    }
}

fn bad_request(message: String) -> GateResponse {
    create_text_response(StatusCode::BAD_REQUEST, headers::TEXT_PLAIN_UTF8, &message)
}

#[async_trait]
impl HttpFilter for LegacyRequestFilter {
    async fn on_client_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        let uri = request.target.clone();
        let segments: Vec<&str> = uri.splitn(4, '/').collect();
        if segments.len() < 3 {
            error!(uri = %uri, "Unexpected legacy request format");
            return Some(bad_request(format!("Bad Request to URI: {uri}")));
        }

        let intent = segments[2];
        if !self.is_intent_allowed(intent) {
            error!(
                intent = %intent,
                allow_api_ingress = self.target.is_api_ingress_allowed(),
                "Unknown or disallowed legacy intent"
            );
            return Some(bad_request(format!("Bad Request to URI: {uri}")));
        }

        let rewritten = match self.target.target_url(&uri) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                error!(uri = %uri, error = %err, "Legacy request could not be rewritten");
                return Some(bad_request(format!("Bad Request to URI: {uri}")));
            }
        };

        let host = rewritten
            .parse::<Uri>()
            .ok()
            .and_then(|parsed| parsed.host().map(str::to_string))
            .and_then(|host| HeaderValue::from_str(&host).ok());
        let Some(host) = host else {
            error!(uri = %rewritten, "Rewritten legacy target is not a valid URI");
            return Some(bad_request(format!("Bad URI: {rewritten}")));
        };

        debug!(from = %uri, to = %rewritten, "Rewriting legacy request");
        request.target = rewritten;
        request.headers.insert(headers::HOST, host);
        None
    }

    async fn on_upstream_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        if !self.target.should_upgrade_protocol() {
            return None;
        }
        let upgraded = OnPremisesTarget::upgraded_url(&request.target);
        Some(
            self.bridge
                .forward(request, &upgraded, defaults::ON_PREM_USER_AGENT)
                .await,
        )
    }
}
