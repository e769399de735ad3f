//! Chain used when the cloud platform is not recognised.

use async_trait::async_trait;

use crate::error::GateError;
use crate::filter::HttpFilter;
use crate::message::ProxyRequest;
use crate::response::GateResponse;

/// Refuses every request with a 500 naming the configured platform.
///
/// Answers on the first hook, so no other filter and no upstream is ever
/// reached.
#[derive(Debug, Clone)]
pub struct InvalidPlatformFilter {
    platform: String,
}

impl InvalidPlatformFilter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl HttpFilter for InvalidPlatformFilter {
    async fn on_client_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        Some(GateError::InvalidCloudPlatform(self.platform.clone()).into_response())
    }
}
