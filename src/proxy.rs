//! Hosting engine: accepts proxy connections and drives the filter hooks.
//!
//! For every request the engine:
//!
//! 1. buffers the body (413 above the configured limit);
//! 2. asks the [`FilterSource`] for the request's filter chain;
//! 3. runs `on_client_request`;
//! 4. derives the upstream `host:port` and resolves it (502 on failure);
//! 5. runs `on_upstream_address_resolved` then `on_upstream_request`;
//! 6. opens a tunnel (CONNECT) or forwards the request to the resolved
//!    address;
//! 7. hands whatever response it ends up with to `on_upstream_response`.
//!
//! A response produced by a request hook short-circuits straight to step 7.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ProxySettings;
use crate::connection::{ConnectionGuard, ConnectionLimiter, ConnectionTracker};
use egressgate_core::headers;
use egressgate_core::lookup::HostLookup;
use egressgate_core::pipeline::FilterSource;
use egressgate_core::response::create_error_response;
use egressgate_core::{ConnectionInfo, GateError, GateResponse, HttpFilter, ProxyRequest, Result};

/// Drives filter chains for incoming proxy requests.
pub struct ProxyEngine {
    source: FilterSource,
    lookup: Arc<dyn HostLookup>,
    client: reqwest::Client,
    settings: ProxySettings,
    tracker: ConnectionTracker,
}

impl ProxyEngine {
    /// Creates the engine and its upstream client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the upstream client cannot be
    /// built.
    pub fn new(source: FilterSource, settings: ProxySettings, tracker: ConnectionTracker) -> Result<Self> {
        let client = upstream_client_builder(&settings)
            .build()
            .map_err(|err| GateError::ConfigError(format!("could not build upstream client: {err}")))?;

        Ok(Self {
            lookup: source.services().host_lookup.clone(),
            source,
            client,
            settings,
            tracker,
        })
    }

    pub fn source(&self) -> &FilterSource {
        &self.source
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Handles one request received on a client connection.
    pub async fn handle(
        &self,
        mut req: Request<Incoming>,
        connection: ConnectionInfo,
    ) -> std::result::Result<GateResponse, Infallible> {
        let upgrade = (req.method() == Method::CONNECT).then(|| hyper::upgrade::on(&mut req));
        let (parts, body) = req.into_parts();

        let body = match Limited::new(body, self.settings.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                let size = content_length(&parts.headers).unwrap_or(self.settings.max_body_size + 1);
                warn!(method = %parts.method, uri = %parts.uri, size, "Request body too large");
                return Ok(GateError::BodyTooLarge {
                    size,
                    max: self.settings.max_body_size,
                }
                .into_response());
            }
            Err(err) => {
                debug!(error = %err, "Failed to read request body");
                return Ok(create_error_response(
                    StatusCode::BAD_REQUEST,
                    "Failed to read request body",
                ));
            }
        };

        let mut request = ProxyRequest {
            method: parts.method,
            target: parts.uri.to_string(),
            headers: parts.headers,
            body,
            connection,
        };

        let mut filter = self.source.filter_request(&request);
        let response = self.process(filter.as_mut(), &mut request, upgrade).await;
        Ok(filter.on_upstream_response(response))
    }

    async fn process(
        &self,
        filter: &mut dyn HttpFilter,
        request: &mut ProxyRequest,
        upgrade: Option<OnUpgrade>,
    ) -> GateResponse {
        if let Some(response) = filter.on_client_request(request).await {
            return response;
        }

        let (host, port) = match upstream_authority(request) {
            Ok(authority) => authority,
            Err(err) => {
                warn!(uri = %request.target, error = %err, "Could not determine upstream host");
                return err.into_response();
            }
        };

        let address = match self.lookup.lookup(&host, port).await {
            Ok(addresses) => match addresses.first() {
                Some(address) => *address,
                None => {
                    return GateError::UpstreamConnectionFailed(format!("no addresses found for {host}"))
                        .into_response();
                }
            },
            Err(err) => {
                warn!(host = %host, error = %err, "Upstream host resolution failed");
                return err.into_response();
            }
        };
        filter
            .on_upstream_address_resolved(&format!("{host}:{port}"), address)
            .await;

        if let Some(response) = filter.on_upstream_request(request).await {
            return response;
        }

        match upgrade {
            Some(upgrade) => self.open_tunnel(&host, address, upgrade).await,
            None => self.forward(request, &host, port, address).await,
        }
    }

    /// Connects to `address` and splices it with the client once the
    /// connection is upgraded.
    async fn open_tunnel(&self, host: &str, address: SocketAddr, upgrade: OnUpgrade) -> GateResponse {
        let connect = tokio::time::timeout(self.settings.upstream_timeout, TcpStream::connect(address));
        let mut upstream = match connect.await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!(host = %host, %address, error = %err, "Tunnel connect failed");
                return GateError::UpstreamConnectionFailed(format!("could not connect to {host}"))
                    .into_response();
            }
            Err(_) => {
                warn!(host = %host, %address, "Tunnel connect timed out");
                return create_error_response(StatusCode::GATEWAY_TIMEOUT, "Upstream service timeout");
            }
        };

        let guard: ConnectionGuard = self.tracker.track();
        let host = host.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            match upgrade.await {
                Ok(upgraded) => {
                    let mut client = TokioIo::new(upgraded);
                    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                        Ok((sent, received)) => debug!(host = %host, sent, received, "Tunnel closed"),
                        Err(err) => debug!(host = %host, error = %err, "Tunnel closed with error"),
                    }
                }
                Err(err) => warn!(host = %host, error = %err, "Client connection upgrade failed"),
            }
        });

        Response::new(Full::new(Bytes::new()))
    }

    /// Client whose connections reach `address` and nothing else.
    ///
    /// Plain HTTP URLs already name the address. HTTPS URLs keep the host
    /// name, so they get a client with `host` pinned to `address` instead of
    /// a second DNS lookup.
    fn pinned_client(&self, request: &ProxyRequest, host: &str, address: SocketAddr) -> Result<reqwest::Client> {
        if !is_https(&request.target) {
            return Ok(self.client.clone());
        }
        upstream_client_builder(&self.settings)
            .resolve(host, address)
            .build()
            .map_err(|err| GateError::UpstreamConnectionFailed(format!("could not build client for {host}: {err}")))
    }

    /// Forwards a non-CONNECT request and buffers the upstream answer.
    async fn forward(&self, request: &ProxyRequest, host: &str, port: u16, address: SocketAddr) -> GateResponse {
        let url = outbound_url(request, address);
        let client = match self.pinned_client(request, host, address) {
            Ok(client) => client,
            Err(err) => {
                error!(url = %url, error = %err, "Upstream client setup failed");
                return err.into_response();
            }
        };
        let mut builder = client.request(request.method.clone(), &url);

        for (name, value) in &request.headers {
            if !headers::is_hop_by_hop(name.as_str())
                && name.as_str() != headers::CONTENT_LENGTH
                && name.as_str() != headers::HOST
            {
                builder = builder.header(name, value);
            }
        }
        builder = builder.header(headers::HOST, authority_header(host, port, &request.target));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let upstream = match builder.send().await {
            Ok(upstream) => upstream,
            Err(err) if err.is_timeout() => {
                warn!(url = %url, "Upstream request timed out");
                return create_error_response(StatusCode::GATEWAY_TIMEOUT, "Upstream service timeout");
            }
            Err(err) if err.is_connect() => {
                warn!(url = %url, error = %err, "Could not connect to upstream");
                return create_error_response(
                    StatusCode::BAD_GATEWAY,
                    "Could not connect to upstream service",
                );
            }
            Err(err) => {
                error!(url = %url, error = %err, "Upstream request failed");
                return create_error_response(StatusCode::BAD_GATEWAY, "Upstream service error");
            }
        };

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();
        let body = match upstream.bytes().await {
            Ok(body) => body,
            Err(err) => {
                warn!(url = %url, error = %err, "Failed to read upstream body");
                return create_error_response(StatusCode::BAD_GATEWAY, "Failed to read response body");
            }
        };

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        for (name, value) in &upstream_headers {
            if !headers::is_hop_by_hop(name.as_str()) && name.as_str() != headers::CONTENT_LENGTH {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }
        response
    }
}

/// Accepts connections on `listener` until `shutdown` flips to true.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<ProxyEngine>,
    limiter: ConnectionLimiter,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("No longer accepting connections");
                    return;
                }
                continue;
            }
        };

        let (stream, remote) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "Failed to accept connection");
                continue;
            }
        };

        let admission = limiter.admit();
        if admission.is_rejected() {
            warn!(%remote, max = limiter.max_connections(), "Connection limit reached, dropping connection");
            continue;
        }

        let connection = ConnectionInfo {
            remote: Some(remote),
            local: stream.local_addr().ok(),
        };
        let guard = engine.tracker().track();
        let engine = engine.clone();
        debug!(%remote, "New connection");

        tokio::spawn(async move {
            let _admission = admission;
            let _guard = guard;
            let service = service_fn(move |req| {
                let engine = engine.clone();
                async move { engine.handle(req, connection).await }
            });

            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                debug!(%remote, error = %err, "Connection error");
            }
        });
    }
}

// ============================================================================
// Target helpers
// ============================================================================

fn content_length(map: &hyper::HeaderMap) -> Option<usize> {
    map.get(headers::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Splits `host:port`, accepting bracketed IPv6 literals. The port defaults
/// to `default_port` when absent.
fn split_authority(authority: &str, default_port: u16) -> Result<(String, u16)> {
    let invalid = || GateError::InvalidRequest(format!("invalid authority: {authority}"));

    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        (host, after.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(port) => port.parse().map_err(|_| invalid())?,
        None => default_port,
    };
    Ok((host.to_string(), port))
}

/// Derives the upstream host and port of a request.
///
/// CONNECT targets are `host:port`; absolute targets carry their own
/// authority; origin-form targets fall back to the `Host` header.
fn upstream_authority(request: &ProxyRequest) -> Result<(String, u16)> {
    if request.is_connect() {
        return split_authority(&request.target, 443);
    }

    if request.target.contains("://") {
        let uri: Uri = request
            .target
            .parse()
            .map_err(|_| GateError::InvalidRequest(format!("invalid target: {}", request.target)))?;
        let host = uri
            .host()
            .ok_or_else(|| GateError::InvalidRequest(format!("missing host: {}", request.target)))?;
        let default_port = if uri.scheme_str() == Some("https") { 443 } else { 80 };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        return Ok((host.to_string(), uri.port_u16().unwrap_or(default_port)));
    }

    let host = request
        .headers
        .get(headers::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| GateError::InvalidRequest("missing Host header".to_string()))?;
    split_authority(host, 80)
}

fn upstream_client_builder(settings: &ProxySettings) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(settings.upstream_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
}

fn is_https(target: &str) -> bool {
    target.starts_with("https://")
}

/// URL the upstream request is sent to.
///
/// Plain HTTP goes to the resolved address; HTTPS keeps the host name for
/// certificate validation and relies on `ProxyEngine::pinned_client`.
fn outbound_url(request: &ProxyRequest, address: SocketAddr) -> String {
    if is_https(&request.target) {
        return request.target.clone();
    }

    let path_and_query = match request.target.find("://") {
        Some(index) => {
            let rest = &request.target[index + 3..];
            rest.find('/').map_or("/", |slash| &rest[slash..])
        }
        None => request.target.as_str(),
    };
    let path_and_query = if path_and_query.is_empty() { "/" } else { path_and_query };
    format!("http://{address}{path_and_query}")
}

/// `Host` header value for the upstream request.
fn authority_header(host: &str, port: u16, target: &str) -> HeaderValue {
    let default_port = if is_https(target) { 443 } else { 80 };
    let host = if host.contains(':') { format!("[{host}]") } else { host.to_string() };
    let value = if port == default_port {
        host
    } else {
        format!("{host}:{port}")
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("localhost"))
}
