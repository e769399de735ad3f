//! Request metrics recording.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::trace;

use crate::filter::HttpFilter;
use crate::message::ProxyRequest;
use crate::metrics::ProxyMetrics;
use crate::response::GateResponse;

/// Records status, method and latency of every response sent to the client.
pub struct ProxyMetricsFilter {
    metrics: Arc<ProxyMetrics>,
    method: String,
    started: Instant,
}

impl ProxyMetricsFilter {
    /// Starts the clock; it restarts once the request is fully received.
    pub fn new(metrics: Arc<ProxyMetrics>, request: &ProxyRequest) -> Self {
        Self {
            metrics,
            method: request.method.to_string(),
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl HttpFilter for ProxyMetricsFilter {
    async fn on_client_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        self.started = Instant::now();
        None
    }

    fn on_upstream_response(&mut self, response: GateResponse) -> GateResponse {
        let latency_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = response.status().as_u16();
        self.metrics.record(status, &self.method, latency_ms);
        trace!(method = %self.method, status, latency_ms, "Proxy request recorded");
        response
    }
}
