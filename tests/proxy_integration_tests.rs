//! End-to-end tests: a real listener, the full filter pipeline and an
//! in-process upstream server, talked to over raw TCP.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HOST, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use ipnet::IpNet;
use rcgen::CertifiedKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

use egressgate::config::ProxySettings;
use egressgate::connection::{ConnectionLimiter, ConnectionTracker};
use egressgate::proxy::{self, ProxyEngine};
use egressgate_core::bridge::UpgradeBridge;
use egressgate_core::lookup::HostLookup;
use egressgate_core::metrics::MetricKey;
use egressgate_core::pipeline::{FilterConfiguration, FilterNames, FilterRegistry, FilterSource, SharedServices};
use egressgate_core::response::create_error_response;
use egressgate_core::route::{CommandRunner, NicResolver, ProcessOutput};
use egressgate_core::{
    AddressPolicyProvider, BridgeConfig, ClientAccessProvider, ClientAddressSource, CloudPlatform,
    DeploymentMode, EgressPolicyProvider, ForwardingProvider, GateError, GateResponse, HttpFilter,
    PlatformProvider, ProxyMetrics, ProxyRequest, Result,
};

const ALLOWED_HOST: &str = "allowed.test";
const ALLOWED_DOMAINS: &str = "allowed.test,localhost";
const IO_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Test collaborators
// ============================================================================

struct TestConfig {
    platform: CloudPlatform,
    mode: DeploymentMode,
    upgrade: bool,
    bridge: BridgeConfig,
}

impl TestConfig {
    fn new() -> Self {
        Self {
            platform: CloudPlatform::Aws,
            mode: DeploymentMode::Standalone,
            upgrade: false,
            bridge: BridgeConfig::default(),
        }
    }

    fn with_upgrade(mut self) -> Self {
        self.upgrade = true;
        self
    }

    fn with_bridge_root(mut self, root: reqwest::Certificate) -> Self {
        self.bridge.root_certificates.push(root);
        self
    }
}

impl PlatformProvider for TestConfig {
    fn cloud_platform(&self) -> &CloudPlatform {
        &self.platform
    }
}

impl EgressPolicyProvider for TestConfig {
    fn enforce_allowed_egress_domains(&self) -> bool {
        true
    }

    fn allowed_egress_domains(&self) -> Option<&str> {
        Some(ALLOWED_DOMAINS)
    }
}

impl AddressPolicyProvider for TestConfig {
    fn deployment_mode(&self) -> &DeploymentMode {
        &self.mode
    }

    fn managed_service_range(&self) -> Option<&IpNet> {
        None
    }

    fn internal_interface(&self) -> &str {
        "eth0"
    }

    fn external_interface(&self) -> &str {
        "eth1"
    }

    fn route_cache_capacity(&self) -> usize {
        16
    }
}

impl ClientAccessProvider for TestConfig {
    fn allowed_proxy_address(&self) -> Option<&str> {
        None
    }

    fn allowed_proxy_address_type(&self) -> ClientAddressSource {
        ClientAddressSource::Remote
    }
}

impl ForwardingProvider for TestConfig {
    fn upgrade_http_requests(&self) -> bool {
        self.upgrade
    }

    fn webhook_target(&self) -> Option<&str> {
        None
    }

    fn allow_api_ingress(&self) -> bool {
        false
    }

    fn bridge_config(&self) -> &BridgeConfig {
        &self.bridge
    }
}

/// Resolves the allowed test hosts to loopback, fails everything else.
struct LoopbackLookup;

#[async_trait]
impl HostLookup for LoopbackLookup {
    async fn lookup(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        if host == ALLOWED_HOST || host == "localhost" {
            Ok(vec![SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port)])
        } else {
            Err(GateError::UpstreamConnectionFailed(format!("could not resolve {host}")))
        }
    }
}

struct ExternalNic;

#[async_trait]
impl NicResolver for ExternalNic {
    async fn resolve(&self, _ip: &str) -> Result<String> {
        Ok("eth1".to_string())
    }
}

struct NoopRunner;

#[async_trait]
impl CommandRunner for NoopRunner {
    async fn run(&self, _program: &str, _args: &[&str]) -> Result<ProcessOutput> {
        Ok(ProcessOutput::default())
    }
}

/// Answers every request with 418.
struct TeapotFilter;

#[async_trait]
impl HttpFilter for TeapotFilter {
    async fn on_client_request(&mut self, _request: &mut ProxyRequest) -> Option<GateResponse> {
        Some(create_error_response(StatusCode::IM_A_TEAPOT, "Teapot"))
    }
}

// ============================================================================
// Harness
// ============================================================================

fn registry() -> FilterRegistry {
    registry_with(TestConfig::new())
}

fn registry_with(config: TestConfig) -> FilterRegistry {
    let services = SharedServices {
        metrics: Arc::new(ProxyMetrics::new()),
        bridge: Arc::new(UpgradeBridge::new(config.bridge_config()).unwrap()),
        nic_resolver: Arc::new(ExternalNic),
        command_runner: Arc::new(NoopRunner),
        host_lookup: Arc::new(LoopbackLookup),
    };
    FilterRegistry::new(&config, services)
}

fn filter_names(aws: &str) -> FilterNames {
    FilterNames {
        aws: aws.to_string(),
        cross_platform: "ClientAddressFilter".to_string(),
        ..FilterNames::default()
    }
}

struct Gateway {
    addr: SocketAddr,
    engine: Arc<ProxyEngine>,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<()>,
}

async fn start_gateway(
    registry: FilterRegistry,
    names: &FilterNames,
    settings: ProxySettings,
    max_connections: usize,
) -> Gateway {
    let configuration = FilterConfiguration::from_names(&registry, names);
    let source = FilterSource::new(registry, configuration, CloudPlatform::Aws);
    let engine = Arc::new(ProxyEngine::new(source, settings, ConnectionTracker::new()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(proxy::serve(
        listener,
        engine.clone(),
        ConnectionLimiter::new(max_connections),
        shutdown_rx,
    ));

    Gateway {
        addr,
        engine,
        shutdown,
        server,
    }
}

async fn default_gateway() -> Gateway {
    start_gateway(
        registry(),
        &filter_names("EgressDomainFilter,ProxyMetricsFilter"),
        ProxySettings::default(),
        0,
    )
    .await
}

/// Upstream echoing the method, path, Host header and body it received.
async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| async move {
                    let host = req
                        .headers()
                        .get(HOST)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let method = req.method().clone();
                    let path = req.uri().path_and_query().map(|pq| pq.to_string()).unwrap_or_default();
                    let body = req.into_body().collect().await.map(|c| c.to_bytes()).unwrap_or_default();

                    let text = format!("{method} {path} host={host} body={}", String::from_utf8_lossy(&body));
                    let mut response = Response::new(Full::new(Bytes::from(text)));
                    response
                        .headers_mut()
                        .insert("x-upstream", HeaderValue::from_static("yes"));
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// TLS upstream for `localhost` answering 201 with the headers it received.
/// Returns its port and the self-signed certificate to trust.
async fn start_tls_upstream() -> (u16, reqwest::Certificate) {
    let CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let root = reqwest::Certificate::from_der(cert.der()).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let tls = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(tls));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(stream).await else {
                    return;
                };
                let service = service_fn(|req: Request<Incoming>| async move {
                    let header = |name: &str| {
                        req.headers()
                            .get(name)
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or("<none>")
                            .to_string()
                    };
                    let text = format!(
                        "{} {} authorization={} user-agent={} x-secret={}",
                        req.method(),
                        req.uri().path(),
                        header("authorization"),
                        header("user-agent"),
                        header("x-secret"),
                    );
                    let mut response = Response::new(Full::new(Bytes::from(text)));
                    *response.status_mut() = StatusCode::CREATED;
                    response
                        .headers_mut()
                        .insert("x-upstream", HeaderValue::from_static("tls"));
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (port, root)
}

/// Listener that reports each accepted connection and closes it at once.
async fn start_counting_listener() -> (u16, mpsc::UnboundedReceiver<SocketAddr>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, peer)) = listener.accept().await {
            drop(stream);
            if tx.send(peer).is_err() {
                return;
            }
        }
    });

    (port, rx)
}

async fn send_raw(proxy: SocketAddr, request: &[u8]) -> String {
    let exchange = async {
        let mut stream = TcpStream::connect(proxy).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    };
    timeout(IO_TIMEOUT, exchange).await.expect("proxy exchange timed out")
}

/// Reads a response head byte by byte, leaving the stream at the body.
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "connection closed before end of response head");
        head.push(byte[0]);
    }
    String::from_utf8_lossy(&head).into_owned()
}

fn status_of(response: &str) -> u16 {
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("no status line in {response:?}"))
}

fn body_of(response: &str) -> &str {
    response.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

fn has_header(response: &str, name: &str, value: &str) -> bool {
    let head = response.split_once("\r\n\r\n").map_or(response, |(head, _)| head);
    head.lines().any(|line| {
        line.split_once(':')
            .is_some_and(|(n, v)| n.eq_ignore_ascii_case(name) && v.trim() == value)
    })
}

// ============================================================================
// Forwarding
// ============================================================================

#[tokio::test]
async fn test_forwards_absolute_form_get() {
    let upstream = start_upstream().await;
    let gateway = default_gateway().await;
    let port = upstream.port();

    let request = format!(
        "GET http://{ALLOWED_HOST}:{port}/hello?x=1 HTTP/1.1\r\nHost: {ALLOWED_HOST}:{port}\r\nConnection: close\r\n\r\n"
    );
    let response = send_raw(gateway.addr, request.as_bytes()).await;

    assert_eq!(status_of(&response), 200, "{response}");
    assert_eq!(body_of(&response), format!("GET /hello?x=1 host={ALLOWED_HOST}:{port} body="));
    assert!(has_header(&response, "x-upstream", "yes"));
}

#[tokio::test]
async fn test_forwards_post_body() {
    let upstream = start_upstream().await;
    let gateway = default_gateway().await;
    let port = upstream.port();

    let request = format!(
        "POST http://{ALLOWED_HOST}:{port}/submit HTTP/1.1\r\nHost: {ALLOWED_HOST}:{port}\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello"
    );
    let response = send_raw(gateway.addr, request.as_bytes()).await;

    assert_eq!(status_of(&response), 200, "{response}");
    assert!(body_of(&response).starts_with("POST /submit "));
    assert!(body_of(&response).ends_with("body=hello"));
}

#[tokio::test]
async fn test_forwarded_requests_are_recorded() {
    let upstream = start_upstream().await;
    let gateway = default_gateway().await;
    let port = upstream.port();

    let request = format!(
        "GET http://{ALLOWED_HOST}:{port}/ HTTP/1.1\r\nHost: {ALLOWED_HOST}:{port}\r\nConnection: close\r\n\r\n"
    );
    send_raw(gateway.addr, request.as_bytes()).await;

    let metrics = &gateway.engine.source().services().metrics;
    let sample = metrics.sample(&MetricKey::new(200, "GET")).expect("request recorded");
    assert_eq!(sample.count(), 1);
}

#[tokio::test]
async fn test_https_target_connects_to_vetted_address() {
    // allowed.test only resolves through the gateway's lookup, so a
    // connection can only arrive here if the vetted address was used.
    let (port, mut accepted) = start_counting_listener().await;
    let gateway = default_gateway().await;

    let request = format!(
        "GET https://{ALLOWED_HOST}:{port}/secure HTTP/1.1\r\nHost: {ALLOWED_HOST}:{port}\r\nConnection: close\r\n\r\n"
    );
    let response = send_raw(gateway.addr, request.as_bytes()).await;

    // The listener is not a TLS server, so the exchange itself fails.
    assert_eq!(status_of(&response), 502, "{response}");
    let peer = timeout(IO_TIMEOUT, accepted.recv()).await.unwrap().unwrap();
    assert!(peer.ip().is_loopback());
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let gateway = default_gateway().await;

    let request = format!(
        "GET http://{ALLOWED_HOST}:{port}/ HTTP/1.1\r\nHost: {ALLOWED_HOST}:{port}\r\nConnection: close\r\n\r\n"
    );
    let response = send_raw(gateway.addr, request.as_bytes()).await;
    assert_eq!(status_of(&response), 502, "{response}");
}

// ============================================================================
// Policy
// ============================================================================

#[tokio::test]
async fn test_forbidden_domain_is_blocked() {
    let gateway = default_gateway().await;

    let request = b"GET http://blocked.test/ HTTP/1.1\r\nHost: blocked.test\r\nConnection: close\r\n\r\n";
    let response = send_raw(gateway.addr, request).await;

    assert_eq!(status_of(&response), 403, "{response}");
    assert_eq!(body_of(&response), "Forbidden");

    let metrics = &gateway.engine.source().services().metrics;
    assert!(metrics.sample(&MetricKey::new(403, "GET")).is_some());
}

#[tokio::test]
async fn test_forbidden_connect_is_blocked() {
    let gateway = default_gateway().await;

    let request = b"CONNECT blocked.test:443 HTTP/1.1\r\nHost: blocked.test:443\r\n\r\n";
    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let head = timeout(IO_TIMEOUT, read_head(&mut stream)).await.unwrap();

    assert_eq!(status_of(&head), 403, "{head}");
}

#[tokio::test]
async fn test_liveness_check() {
    let gateway = default_gateway().await;

    let request = b"GET /liveness_check HTTP/1.1\r\nHost: proxy\r\nConnection: close\r\n\r\n";
    let response = send_raw(gateway.addr, request).await;

    assert_eq!(status_of(&response), 200, "{response}");
    assert_eq!(body_of(&response), "OK");
}

#[tokio::test]
async fn test_custom_filter_runs_in_chain() {
    let mut registry = registry();
    registry.register_custom("TeapotFilter", Arc::new(|_: &ProxyRequest| Box::new(TeapotFilter) as Box<dyn HttpFilter>));
    let gateway = start_gateway(registry, &filter_names("TeapotFilter"), ProxySettings::default(), 0).await;

    let request = format!("GET http://{ALLOWED_HOST}/ HTTP/1.1\r\nHost: {ALLOWED_HOST}\r\nConnection: close\r\n\r\n");
    let response = send_raw(gateway.addr, request.as_bytes()).await;

    assert_eq!(status_of(&response), 418, "{response}");
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let settings = ProxySettings {
        max_body_size: 16,
        ..ProxySettings::default()
    };
    let gateway = start_gateway(registry(), &filter_names("EgressDomainFilter"), settings, 0).await;

    let body = "x".repeat(64);
    let request = format!(
        "POST http://{ALLOWED_HOST}/upload HTTP/1.1\r\nHost: {ALLOWED_HOST}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let response = send_raw(gateway.addr, request.as_bytes()).await;

    assert_eq!(status_of(&response), 413, "{response}");
}

// ============================================================================
// Upgrade bridge
// ============================================================================

#[tokio::test]
async fn test_upgraded_request_goes_through_bridge() {
    let (port, root) = start_tls_upstream().await;
    let gateway = start_gateway(
        registry_with(TestConfig::new().with_upgrade().with_bridge_root(root)),
        &filter_names("EgressDomainFilter,UpgradeRequestFilter"),
        ProxySettings::default(),
        0,
    )
    .await;

    let request = format!(
        "GET http://localhost:{port}/hello HTTP/1.1\r\nHost: localhost:{port}\r\nAuthorization: Bearer token-1\r\nX-Secret: s3cr3t\r\nConnection: close\r\n\r\n"
    );
    let response = send_raw(gateway.addr, request.as_bytes()).await;

    assert_eq!(status_of(&response), 201, "{response}");
    assert!(has_header(&response, "x-upstream", "tls"));
    assert_eq!(
        body_of(&response),
        "GET /hello authorization=Bearer token-1 user-agent=Egress-Proxy x-secret=<none>"
    );
}

#[tokio::test]
async fn test_upgrade_failure_is_generic_server_error() {
    let (port, mut accepted) = start_counting_listener().await;
    let gateway = start_gateway(
        registry_with(TestConfig::new().with_upgrade()),
        &filter_names("EgressDomainFilter,UpgradeRequestFilter"),
        ProxySettings::default(),
        0,
    )
    .await;

    let request = format!("GET http://localhost:{port}/ HTTP/1.1\r\nHost: localhost:{port}\r\nConnection: close\r\n\r\n");
    let response = send_raw(gateway.addr, request.as_bytes()).await;

    assert_eq!(status_of(&response), 500, "{response}");
    assert_eq!(body_of(&response), "Server error during request forwarding");
    assert!(timeout(IO_TIMEOUT, accepted.recv()).await.unwrap().is_some());
}

// ============================================================================
// Tunnels
// ============================================================================

#[tokio::test]
async fn test_connect_tunnel_splices_streams() {
    let upstream = start_upstream().await;
    let gateway = default_gateway().await;
    let port = upstream.port();

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    let connect = format!("CONNECT {ALLOWED_HOST}:{port} HTTP/1.1\r\nHost: {ALLOWED_HOST}:{port}\r\n\r\n");
    stream.write_all(connect.as_bytes()).await.unwrap();
    let head = timeout(IO_TIMEOUT, read_head(&mut stream)).await.unwrap();
    assert_eq!(status_of(&head), 200, "{head}");

    let tunneled = b"GET /through-tunnel HTTP/1.1\r\nHost: tunneled\r\nConnection: close\r\n\r\n";
    stream.write_all(tunneled).await.unwrap();
    let mut buf = Vec::new();
    timeout(IO_TIMEOUT, stream.read_to_end(&mut buf)).await.unwrap().unwrap();
    let response = String::from_utf8_lossy(&buf);

    assert_eq!(status_of(&response), 200, "{response}");
    assert_eq!(body_of(&response), "GET /through-tunnel host=tunneled body=");

    drop(stream);
    assert!(gateway.engine.tracker().wait_for_shutdown(IO_TIMEOUT).await);
}

// ============================================================================
// Connection handling
// ============================================================================

#[tokio::test]
async fn test_connections_over_limit_are_dropped() {
    let gateway = start_gateway(registry(), &filter_names("EgressDomainFilter"), ProxySettings::default(), 1).await;

    let _held = TcpStream::connect(gateway.addr).await.unwrap();
    let mut rejected = TcpStream::connect(gateway.addr).await.unwrap();

    let mut buf = Vec::new();
    let result = timeout(IO_TIMEOUT, rejected.read_to_end(&mut buf)).await.unwrap();
    assert!(matches!(result, Ok(0) | Err(_)), "{result:?}");
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let gateway = default_gateway().await;

    gateway.shutdown.send(true).unwrap();
    timeout(IO_TIMEOUT, gateway.server).await.unwrap().unwrap();

    assert!(TcpStream::connect(gateway.addr).await.is_err());
    assert_eq!(gateway.engine.tracker().count(), 0);
}
