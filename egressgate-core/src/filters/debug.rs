//! Diagnostics served under `/proxy_debug/`.
//!
//! - `/proxy_debug/resolve_host?hostname=` resolves a host and reports which
//!   nameserver answered.
//! - `/proxy_debug/ip/route?ip=` reports the interface and source address the
//!   kernel would use to reach an address.
//! - `/proxy_debug/connectivity?hostname=&port=&timeoutSecs=` tries a raw TCP
//!   connection.
//!
//! Every answer is JSON; parameter errors are plain messages with status
//! 400. Nothing here changes policy state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::StatusCode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::filter::HttpFilter;
use crate::headers;
use crate::lookup::HostLookup;
use crate::message::ProxyRequest;
use crate::response::{GateResponse, create_json_response, create_text_response};
use crate::route::CommandRunner;
use crate::route::ip_route::{parse_device, parse_source};

static NAMESERVER_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Server:\s+([\d.]+)").ok());

const TIMEOUT_MESSAGE: &str = "TIMEOUT usually means the IP address is incorrect, the VPN is down, \
                               or the customer's firewall is blocking traffic.";

// ============================================================================
// Reports
// ============================================================================

/// How a host name was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolvedBy {
    None,
    IpHostMapping,
    Nameserver,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveHostReport {
    pub resolved_by: ResolvedBy,
    pub host_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameserver_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns_lookup_error_string: Option<String>,
}

/// Which side of the gateway a route points to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteDirection {
    Unknown,
    Inbound,
    Outbound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteFailureReason {
    None,
    ShellCommandFailed,
    UnableToParseNicInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteReport {
    pub route_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_toward: Option<RouteDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nic_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<RouteFailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_string: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityStatus {
    Unknown,
    Ok,
    Error,
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReport {
    pub hostname: String,
    pub port: i32,
    pub timeout_secs: u64,
    pub status: ConnectivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Filter
// ============================================================================

/// Collaborators used by the diagnostics.
pub struct DebugEnvironment {
    pub runner: Arc<dyn CommandRunner>,
    pub lookup: Arc<dyn HostLookup>,
    pub internal_interface: String,
    pub external_interface: String,
}

/// Answers `/proxy_debug/*` requests; never forwards anything.
pub struct ProxyDebugFilter {
    environment: Arc<DebugEnvironment>,
}

impl ProxyDebugFilter {
    pub fn new(environment: Arc<DebugEnvironment>) -> Self {
        Self { environment }
    }

    async fn resolve_host(&self, params: &QueryParams) -> GateResponse {
        let Some(hostname) = params.first("hostname") else {
            return bad_request("Host name not provided. Use hostname query parameter");
        };

        let mut report = ResolveHostReport {
            resolved_by: ResolvedBy::None,
            host_name: hostname.to_string(),
            ip_address: None,
            nameserver_used: None,
            ns_lookup_error_string: None,
        };

        match self.environment.lookup.lookup(hostname, 0).await {
            Ok(addresses) => {
                report.ip_address = addresses.first().map(|address| address.ip().to_string());
            }
            Err(_) => return create_json_response(StatusCode::OK, &report),
        }

        let output = match self.environment.runner.run("nslookup", &[hostname]).await {
            Ok(output) => output,
            Err(err) => return server_error(&err.to_string()),
        };
        info!(
            hostname = %hostname,
            exit_code = output.exit_code,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "nslookup finished"
        );

        report.ns_lookup_error_string = Some(output.stderr.clone());
        if output.success() {
            report.resolved_by = ResolvedBy::Nameserver;
            report.nameserver_used = parse_nameserver(&output.stdout).map(str::to_string);
        } else {
            report.resolved_by = ResolvedBy::IpHostMapping;
        }
        create_json_response(StatusCode::OK, &report)
    }

    async fn route(&self, params: &QueryParams) -> GateResponse {
        let Some(ip) = params.first("ip") else {
            return bad_request("IP address not provided. Use ip query parameter");
        };

        let output = match self.environment.runner.run("ip", &["route", "get", ip]).await {
            Ok(output) => output,
            Err(err) => {
                warn!(ip = %ip, error = %err, "ip route get could not be run");
                return server_error(&err.to_string());
            }
        };

        if !output.success() {
            warn!(ip = %ip, exit_code = output.exit_code, stderr = %output.stderr, "Route not found");
            let report = RouteReport {
                route_found: false,
                failure_reason: Some(RouteFailureReason::ShellCommandFailed),
                error_string: Some(format!(
                    "Shell command failed with exit code: {} and error {}",
                    output.exit_code, output.stderr
                )),
                ..RouteReport::default()
            };
            return create_json_response(StatusCode::OK, &report);
        }
        info!(ip = %ip, output = %output.stdout, "Route found");

        let report = match (parse_device(&output.stdout), parse_source(&output.stdout)) {
            (Some(nic), Some(source)) => RouteReport {
                route_found: true,
                routed_toward: Some(self.direction(nic)),
                nic: Some(nic.to_string()),
                nic_address: Some(source.to_string()),
                ..RouteReport::default()
            },
            _ => RouteReport {
                route_found: false,
                failure_reason: Some(RouteFailureReason::UnableToParseNicInfo),
                error_string: Some(format!(
                    "Could not parse NIC info from output: {}",
                    output.stdout
                )),
                ..RouteReport::default()
            },
        };
        create_json_response(StatusCode::OK, &report)
    }

    fn direction(&self, nic: &str) -> RouteDirection {
        if nic == self.environment.external_interface {
            RouteDirection::Outbound
        } else if nic == self.environment.internal_interface {
            RouteDirection::Inbound
        } else {
            RouteDirection::Unknown
        }
    }

    async fn connectivity(&self, params: &QueryParams) -> GateResponse {
        let Some(hostname) = params.first("hostname") else {
            return bad_request("Host name not provided. Use hostname query parameter");
        };
        let Some(port) = params.first("port") else {
            return bad_request("Port not provided. Use port query parameter");
        };
        let Ok(port) = port.parse::<i32>() else {
            return bad_request("port must be an integer.");
        };
        if port < 1 {
            return bad_request("port must be positive.");
        }
        let Some(timeout_secs) = params.first("timeoutSecs") else {
            return bad_request("Timeout not provided. Use timeoutSecs query parameter");
        };
        let Ok(timeout_secs) = timeout_secs.parse::<i32>() else {
            return bad_request("timeoutSecs must be an integer.");
        };
        if timeout_secs < 1 {
            return bad_request("timeoutSecs must be positive.");
        }
        let timeout_secs = u64::from(timeout_secs.unsigned_abs());

        let (status, message) = match u16::try_from(port) {
            Ok(port) => check_connectivity(hostname, port, Duration::from_secs(timeout_secs)).await,
            Err(_) => (
                ConnectivityStatus::Error,
                Some(format!("port out of range:{port}")),
            ),
        };

        let report = ConnectivityReport {
            hostname: hostname.to_string(),
            port,
            timeout_secs,
            status,
            message,
        };
        create_json_response(StatusCode::OK, &report)
    }
}

#[async_trait]
impl HttpFilter for ProxyDebugFilter {
    async fn on_client_request(&mut self, request: &mut ProxyRequest) -> Option<GateResponse> {
        let params = QueryParams::parse(request.query().as_deref());
        let path = request.path();

        let response = if path.starts_with("/proxy_debug/resolve_host") {
            self.resolve_host(&params).await
        } else if path.starts_with("/proxy_debug/ip/route") {
            self.route(&params).await
        } else if path.starts_with("/proxy_debug/connectivity") {
            self.connectivity(&params).await
        } else {
            bad_request("Invalid URI")
        };
        Some(response)
    }
}

async fn check_connectivity(
    hostname: &str,
    port: u16,
    timeout: Duration,
) -> (ConnectivityStatus, Option<String>) {
    match tokio::time::timeout(timeout, TcpStream::connect((hostname, port))).await {
        Ok(Ok(_stream)) => (ConnectivityStatus::Ok, None),
        Ok(Err(err)) => (ConnectivityStatus::Error, Some(err.to_string())),
        Err(_) => (ConnectivityStatus::Timeout, Some(TIMEOUT_MESSAGE.to_string())),
    }
}

fn parse_nameserver(output: &str) -> Option<&str> {
    NAMESERVER_PATTERN
        .as_ref()?
        .captures(output)?
        .get(1)
        .map(|m| m.as_str())
}

fn bad_request(message: &str) -> GateResponse {
    create_text_response(StatusCode::BAD_REQUEST, headers::APPLICATION_JSON, message)
}

fn server_error(message: &str) -> GateResponse {
    create_text_response(StatusCode::INTERNAL_SERVER_ERROR, headers::APPLICATION_JSON, message)
}

// ============================================================================
// Query parsing
// ============================================================================

/// Decoded query parameters; repeated names keep every value in order.
#[derive(Debug, Default)]
struct QueryParams(HashMap<String, Vec<String>>);

impl QueryParams {
    fn parse(query: Option<&str>) -> Self {
        let mut params: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            params.entry(name.into_owned()).or_default().push(value.into_owned());
        }
        Self(params)
    }

    fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name)?.first().map(String::as_str)
    }
}
