//! Plain HTTP to HTTPS upgrade.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bridge::UpgradeBridge;
use crate::defaults;
use crate::filter::HttpFilter;
use crate::message::ProxyRequest;
use crate::response::GateResponse;

/// Re-issues `http://` requests as `https://` through the upgrade bridge.
///
/// The decision uses the target as received from the client, before any
/// other filter rewrote it.
pub struct UpgradeRequestFilter {
    enabled: bool,
    original_target: String,
    bridge: Arc<UpgradeBridge>,
}

impl UpgradeRequestFilter {
    pub fn new(enabled: bool, request: &ProxyRequest, bridge: Arc<UpgradeBridge>) -> Self {
        Self {
            enabled,
            original_target: request.target.clone(),
            bridge,
        }
    }

    /// Returns the `https://` target when this request must be upgraded.
    fn upgraded_target(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.original_target
            .strip_prefix("http://")
            .map(|rest| format!("https://{rest}"))
    }
}

#[async_trait]
impl HttpFilter for UpgradeRequestFilter {
    async fn on_upstream_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        let target = self.upgraded_target()?;
        debug!(from = %self.original_target, to = %target, "Upgrading request to HTTPS");
        Some(
            self.bridge
                .forward(request, &target, defaults::EGRESS_USER_AGENT)
                .await,
        )
    }
}
