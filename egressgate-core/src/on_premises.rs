//! On-premises webhook target for legacy `/proxy/...` requests.
//!
//! Legacy clients address the gateway directly with paths such as
//! `/proxy/webhook/github/events`; the gateway rewrites them onto the
//! configured target. The target is always stored with an `http://` scheme;
//! when it was configured as `https://`, requests are re-issued through the
//! upgrade bridge instead of being sent in clear text.

use crate::error::{GateError, Result};

const WEBHOOK_PREFIX: &str = "/proxy/webhook/";
const API_PREFIX: &str = "/proxy/api/";
const REST_API_PREFIX: &str = "/proxy/rest/api/";

/// Where legacy requests are rewritten to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnPremisesTarget {
    webhook_target: String,
    allow_api_ingress: bool,
    protocol_upgrade: bool,
}

impl OnPremisesTarget {
    /// Creates a target. Returns `None` when `webhook_target` is empty.
    ///
    /// ```
    /// use egressgate_core::on_premises::OnPremisesTarget;
    ///
    /// let target = OnPremisesTarget::new("https://hooks.internal", false).unwrap();
    /// assert!(target.should_upgrade_protocol());
    /// assert_eq!(target.webhook_target(), "http://hooks.internal");
    /// ```
    pub fn new(webhook_target: &str, allow_api_ingress: bool) -> Option<Self> {
        let webhook_target = webhook_target.trim();
        if webhook_target.is_empty() {
            return None;
        }

        let (webhook_target, protocol_upgrade) = match webhook_target.strip_prefix("https://") {
            Some(rest) => (format!("http://{rest}"), true),
            None => (webhook_target.to_string(), false),
        };

        Some(Self {
            webhook_target,
            allow_api_ingress,
            protocol_upgrade,
        })
    }

    pub fn webhook_target(&self) -> &str {
        &self.webhook_target
    }

    pub fn is_api_ingress_allowed(&self) -> bool {
        self.allow_api_ingress
    }

    pub fn should_upgrade_protocol(&self) -> bool {
        self.protocol_upgrade
    }

    /// Rewrites a legacy path onto the target.
    ///
    /// `/proxy/webhook/<rest>` is always accepted. `/proxy/api/<rest>` and
    /// `/proxy/rest/api/<rest>` are accepted only with API ingress allowed and
    /// keep their `api` or `rest/api` segment.
    pub fn target_url(&self, path: &str) -> Result<String> {
        if let Some(rest) = path.strip_prefix(WEBHOOK_PREFIX) {
            return Ok(format!("{}/{rest}", self.webhook_target));
        }

        if self.allow_api_ingress {
            if let Some(rest) = path.strip_prefix(API_PREFIX) {
                return Ok(format!("{}/api/{rest}", self.webhook_target));
            }
            if let Some(rest) = path.strip_prefix(REST_API_PREFIX) {
                return Ok(format!("{}/rest/api/{rest}", self.webhook_target));
            }
        }

        Err(GateError::InvalidRequest(format!(
            "unexpected request URI format for webhook intent: {path}"
        )))
    }

    /// Returns the `https://` form of an already rewritten target.
    pub fn upgraded_url(rewritten: &str) -> String {
        match rewritten.strip_prefix("http://") {
            Some(rest) => format!("https://{rest}"),
            None => rewritten.to_string(),
        }
    }
}
