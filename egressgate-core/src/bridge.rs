//! Protocol-upgrade bridge.
//!
//! Re-issues a request through an independent pooled HTTP client, usually
//! to the `https://` form of a plain `http://` target, and converts the
//! upstream answer back into a [`GateResponse`].
//!
//! The translation is split into two pure builders,
//! [`build_outbound_request`] and [`build_inbound_response`], so both sides
//! can be tested without network access.
//!
//! # Connection limits
//!
//! reqwest pools connections but does not cap them, so the bridge bounds
//! in-flight requests with semaphores: one shared by every destination and
//! one per destination host. Waiting for a slot is bounded by the
//! acquisition timeout; running out of slots fails the request (500) rather
//! than queueing forever.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Method, Response, StatusCode, Version};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error};

use crate::error::{GateError, Result};
use crate::headers;
use crate::message::ProxyRequest;
use crate::response::{GateResponse, create_text_response};
use crate::types::BridgeConfig;

/// Body returned to the client whenever the bridge fails.
pub const FORWARDING_ERROR_MESSAGE: &str = "Server error during request forwarding";

/// Builds the outbound request for `target` from the client's request.
///
/// Only GET, POST and PUT are supported. Of the client headers only
/// Authorization, User-Agent and Accept are copied; `default_user_agent` is
/// supplied when the client sent no User-Agent. POST and PUT carry the
/// client body (shared, not copied) with the client's Content-Type or
/// `application/octet-stream`.
pub fn build_outbound_request(
    client: &reqwest::Client,
    request: &ProxyRequest,
    target: &str,
    default_user_agent: &str,
) -> Result<reqwest::Request> {
    let mut builder = match request.method {
        Method::GET => client.get(target),
        Method::POST => client.post(target),
        Method::PUT => client.put(target),
        ref other => {
            return Err(GateError::Forwarding(format!(
                "unsupported method for bridging: {other}"
            )));
        }
    };

    for name in headers::BRIDGED_HEADERS {
        for value in request.headers.get_all(*name) {
            builder = builder.header(*name, value.clone());
        }
    }

    if !request.headers.contains_key(headers::USER_AGENT) {
        builder = builder.header(headers::USER_AGENT, default_user_agent);
    }

    if request.method == Method::POST || request.method == Method::PUT {
        let content_type = request
            .headers
            .get(headers::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(headers::APPLICATION_OCTET_STREAM));
        builder = builder
            .header(headers::CONTENT_TYPE, content_type)
            .body(request.body.clone());
    }

    builder
        .build()
        .map_err(|err| GateError::Forwarding(format!("invalid bridged request to {target}: {err}")))
}

/// Builds the client-facing response from the upstream answer.
///
/// Status, reason phrase, every header and the body are copied verbatim.
/// The client side speaks HTTP/1, so versions other than HTTP/1.0 and
/// HTTP/1.1 fall back to HTTP/1.1.
pub fn build_inbound_response(
    status: StatusCode,
    reason: Option<ReasonPhrase>,
    version: Version,
    upstream_headers: &HeaderMap,
    body: Bytes,
) -> Result<GateResponse> {
    let version = if version == Version::HTTP_10 {
        Version::HTTP_10
    } else {
        Version::HTTP_11
    };

    let mut response = Response::builder()
        .status(status)
        .version(version)
        .body(Full::new(body))
        .map_err(|err| GateError::Forwarding(format!("invalid upstream response: {err}")))?;

    *response.headers_mut() = upstream_headers.clone();
    if let Some(reason) = reason {
        response.extensions_mut().insert(reason);
    }

    Ok(response)
}

type HostSlots = Arc<DashMap<String, Arc<Semaphore>>>;

/// Drops the semaphore of `host` once nobody holds or waits for one of its
/// slots. Entries are recreated on demand, so the map only holds hosts with
/// requests in flight.
fn remove_idle(per_host: &HostSlots, host: &str, per_host_limit: usize) {
    per_host.remove_if(host, |_, semaphore| {
        Arc::strong_count(semaphore) == 1 && semaphore.available_permits() == per_host_limit
    });
}

/// Slots held by one bridged request.
#[derive(Debug)]
struct BridgePermit {
    _global: OwnedSemaphorePermit,
    local: Option<OwnedSemaphorePermit>,
    host: String,
    per_host: HostSlots,
    per_host_limit: usize,
}

impl Drop for BridgePermit {
    fn drop(&mut self) {
        drop(self.local.take());
        remove_idle(&self.per_host, &self.host, self.per_host_limit);
    }
}

/// In-flight request limits for the bridge.
#[derive(Debug)]
struct BridgeLimiter {
    total: Arc<Semaphore>,
    per_host: HostSlots,
    per_host_limit: usize,
    config: BridgeConfig,
}

impl BridgeLimiter {
    fn new(config: &BridgeConfig) -> Self {
        Self {
            total: Arc::new(Semaphore::new(config.max_total_connections)),
            per_host: Arc::new(DashMap::new()),
            per_host_limit: config.max_connections_per_host,
            config: config.clone(),
        }
    }

    /// Waits for a global and a per-host slot, bounded by the acquisition timeout.
    async fn acquire(&self, host: &str) -> Result<BridgePermit> {
        let host_semaphore = self
            .per_host
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone();
        let total = self.total.clone();

        let acquire = async move {
            let global = total.acquire_owned().await?;
            let local = host_semaphore.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>((global, local))
        };

        let result = tokio::time::timeout(self.config.acquire_timeout, acquire).await;
        match result {
            Ok(Ok((global, local))) => Ok(BridgePermit {
                _global: global,
                local: Some(local),
                host: host.to_string(),
                per_host: self.per_host.clone(),
                per_host_limit: self.per_host_limit,
            }),
            Ok(Err(err)) => {
                remove_idle(&self.per_host, host, self.per_host_limit);
                Err(GateError::Forwarding(format!("connection pool closed: {err}")))
            }
            Err(_) => {
                remove_idle(&self.per_host, host, self.per_host_limit);
                Err(GateError::Forwarding(format!(
                    "timed out after {:?} waiting for a connection to {host}",
                    self.config.acquire_timeout
                )))
            }
        }
    }

    #[cfg(test)]
    fn tracked_hosts(&self) -> usize {
        self.per_host.len()
    }
}

/// Shared outbound client used to re-issue requests.
///
/// Construct once at startup and share it behind an `Arc`.
#[derive(Debug)]
pub struct UpgradeBridge {
    client: reqwest::Client,
    limiter: BridgeLimiter,
}

impl UpgradeBridge {
    /// Creates the pooled client.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::ConfigError`] when the configuration is invalid or
    /// the TLS backend cannot be initialised.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        if !config.is_valid() {
            return Err(GateError::ConfigError(format!(
                "invalid bridge configuration: {config:?}"
            )));
        }

        let client = config
            .root_certificates
            .iter()
            .fold(reqwest::Client::builder(), |builder, root| {
                builder.add_root_certificate(root.clone())
            })
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| GateError::ConfigError(format!("failed to build bridge client: {err}")))?;

        Ok(Self {
            client,
            limiter: BridgeLimiter::new(config),
        })
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Forwards `request` to `target`.
    ///
    /// Never fails: any error is logged with its detail and answered with a
    /// 500 carrying a generic body.
    pub async fn forward(
        &self,
        request: &ProxyRequest,
        target: &str,
        default_user_agent: &str,
    ) -> GateResponse {
        match self.try_forward(request, target, default_user_agent).await {
            Ok(response) => response,
            Err(err) => {
                error!(uri = %target, method = %request.method, error = ?err, "Bridge forwarding failed");
                create_text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    headers::TEXT_PLAIN_UTF8,
                    FORWARDING_ERROR_MESSAGE,
                )
            }
        }
    }

    async fn try_forward(
        &self,
        request: &ProxyRequest,
        target: &str,
        default_user_agent: &str,
    ) -> Result<GateResponse> {
        let outbound = build_outbound_request(&self.client, request, target, default_user_agent)?;
        let host = outbound.url().host_str().unwrap_or_default().to_string();

        let _permits = self.limiter.acquire(&host).await?;
        debug!(uri = %target, method = %request.method, "Forwarding through bridge");

        let upstream = self
            .client
            .execute(outbound)
            .await
            .map_err(|err| GateError::Forwarding(format!("request to {target} failed: {err}")))?;

        let status = upstream.status();
        let version = upstream.version();
        let reason = upstream.extensions().get::<ReasonPhrase>().cloned();
        let upstream_headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|err| GateError::Forwarding(format!("reading body from {target} failed: {err}")))?;

        build_inbound_response(status, reason, version, &upstream_headers, body)
    }
}
