//! Request representation handed to the filters by the hosting engine.

use std::net::SocketAddr;

use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri};

/// Addresses of the client connection a request arrived on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer address of the client socket.
    pub remote: Option<SocketAddr>,
    /// Local address the client connected to.
    pub local: Option<SocketAddr>,
}

/// A fully aggregated proxy request.
///
/// `target` is the raw request target exactly as received: `host:port` for
/// CONNECT, an absolute URI for forward-proxied requests, or an origin-form
/// path for requests addressed to the gateway itself.
#[derive(Clone, Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub connection: ConnectionInfo,
}

impl ProxyRequest {
    /// Creates a bodiless request with no headers and unknown addresses.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            connection: ConnectionInfo::default(),
        }
    }

    /// Sets the connection addresses.
    pub fn with_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends a header, ignoring values that are not valid header text.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.append(name, value);
        }
        self
    }

    /// Returns true for CONNECT tunnel requests.
    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }

    /// Parses the target; `None` when it is not a valid request target.
    pub fn uri(&self) -> Option<Uri> {
        self.target.parse().ok()
    }

    /// Returns the path portion of the target, without query.
    ///
    /// Authority targets and unparsable targets yield `""`.
    pub fn path(&self) -> String {
        self.uri().map(|uri| uri.path().to_string()).unwrap_or_default()
    }

    /// Returns the raw query string of the target, if any.
    pub fn query(&self) -> Option<String> {
        self.uri()?.query().map(str::to_string)
    }
}
