//! HTTP header names and content types used by the filters.

/// Authorization header, carried across the upgrade bridge.
pub const AUTHORIZATION: &str = "authorization";

/// User-Agent header, carried across the upgrade bridge.
pub const USER_AGENT: &str = "user-agent";

/// Accept header, carried across the upgrade bridge.
pub const ACCEPT: &str = "accept";

/// Content-Type header.
pub const CONTENT_TYPE: &str = "content-type";

/// Host header.
pub const HOST: &str = "host";

/// Content-Length header.
pub const CONTENT_LENGTH: &str = "content-length";

// Hop-by-hop headers (RFC 9110 section 7.6.1, plus proxy-connection).
pub const CONNECTION: &str = "connection";
pub const KEEP_ALIVE: &str = "keep-alive";
pub const PROXY_AUTHENTICATE: &str = "proxy-authenticate";
pub const PROXY_AUTHORIZATION: &str = "proxy-authorization";
pub const PROXY_CONNECTION: &str = "proxy-connection";
pub const TE: &str = "te";
pub const TRAILERS: &str = "trailers";
pub const TRANSFER_ENCODING: &str = "transfer-encoding";
pub const UPGRADE: &str = "upgrade";

/// Plain text content type used for policy responses.
pub const TEXT_PLAIN: &str = "text/plain";

/// Plain text content type used for bridge failures.
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=UTF-8";

/// JSON content type used by the debug endpoints.
pub const APPLICATION_JSON: &str = "application/json";

/// Fallback content type for bridged bodies.
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Headers copied from the client request onto a bridged request.
/// Everything else is dropped.
pub const BRIDGED_HEADERS: &[&str] = &[AUTHORIZATION, USER_AGENT, ACCEPT];

/// Headers never forwarded by the hosting engine.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    CONNECTION,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    PROXY_CONNECTION,
    TE,
    TRAILERS,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Whether `header_name` (lower-case) is hop-by-hop.
///
/// # Example
///
/// ```
/// use egressgate_core::headers::is_hop_by_hop;
///
/// assert!(is_hop_by_hop("proxy-connection"));
/// assert!(!is_hop_by_hop("accept"));
/// ```
pub fn is_hop_by_hop(header_name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&header_name)
}
