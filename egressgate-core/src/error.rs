//! Error types for egressgate.
//!
//! Every policy engine reports failures through [`GateError`]. Filters never
//! propagate errors to the hosting engine: at the hook boundary each error is
//! turned into a terminal plain-text response with [`GateError::into_response`].

use hyper::StatusCode;
use thiserror::Error;

use crate::response::{GateResponse, create_error_response};

/// Result type alias for egressgate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Unified error type for egressgate operations.
///
/// # Example
///
/// ```
/// use egressgate_core::error::{GateError, Result};
///
/// fn require_host(host: &str) -> Result<&str> {
///     if host.is_empty() {
///         return Err(GateError::InvalidRequest("missing host".into()));
///     }
///     Ok(host)
/// }
///
/// assert!(require_host("").is_err());
/// ```
#[derive(Debug, Error)]
pub enum GateError {
    /// The request could not be interpreted (bad target, missing host...).
    #[error("Bad Request: {0}")]
    InvalidRequest(String),

    /// Destination host is not on the egress allow-list.
    #[error("Forbidden")]
    DomainNotAllowed(String),

    /// Destination address is private and may not be reached.
    #[error("Ingress Route not allowed For Private IPs: {0}")]
    PrivateAddress(String),

    /// Destination matches a guarded endpoint.
    #[error("Forbidden")]
    EndpointBlocked(String),

    /// The outbound interface for an address could not be determined.
    #[error("Could not resolve route: {0}")]
    RouteResolution(String),

    /// The client socket address is not allowed to use the proxy.
    #[error("UNAUTHORIZED")]
    ClientNotAllowed(String),

    /// The configured deployment mode is not recognised.
    #[error("Unknown proxy type: {0}")]
    UnknownProxyType(String),

    /// The configured cloud platform is not recognised.
    #[error("Invalid cloud platform: {0}")]
    InvalidCloudPlatform(String),

    /// Configuration error (missing or invalid values).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The upgrade bridge could not complete the outbound request.
    #[error("Server error during request forwarding")]
    Forwarding(String),

    /// An external command could not be run.
    #[error("Command failed: {0}")]
    Command(String),

    /// Upstream host could not be reached or resolved.
    #[error("Upstream connection failed: {0}")]
    UpstreamConnectionFailed(String),

    /// Request body too large.
    #[error("Request body too large: {size} bytes (max: {max} bytes)")]
    BodyTooLarge {
        /// Actual body size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

impl GateError {
    /// Returns the HTTP status code that should be returned to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::DomainNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::PrivateAddress(_) => StatusCode::FORBIDDEN,
            Self::EndpointBlocked(_) => StatusCode::FORBIDDEN,
            Self::RouteResolution(_) => StatusCode::UNAUTHORIZED,
            Self::ClientNotAllowed(_) => StatusCode::UNAUTHORIZED,
            Self::UnknownProxyType(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidCloudPlatform(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Forwarding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Command(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamConnectionFailed(_) => StatusCode::BAD_GATEWAY,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Returns true if this error should be logged at error level.
    ///
    /// Policy rejections are expected traffic and are logged at warn level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownProxyType(_)
                | Self::InvalidCloudPlatform(_)
                | Self::ConfigError(_)
                | Self::Forwarding(_)
                | Self::Command(_)
                | Self::UpstreamConnectionFailed(_)
        )
    }

    /// Converts the error into the plain-text response sent to the client.
    ///
    /// The body is the error's display form, which never carries more than the
    /// offending host, address or configuration value.
    pub fn into_response(self) -> GateResponse {
        create_error_response(self.status_code(), &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_error_display() {
        let err = GateError::PrivateAddress("10.0.0.1".into());
        assert_eq!(
            err.to_string(),
            "Ingress Route not allowed For Private IPs: 10.0.0.1"
        );

        let err = GateError::UnknownProxyType("MESH".into());
        assert_eq!(err.to_string(), "Unknown proxy type: MESH");

        let err = GateError::DomainNotAllowed("evil.example".into());
        assert_eq!(err.to_string(), "Forbidden");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GateError::InvalidRequest("".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GateError::DomainNotAllowed("".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GateError::RouteResolution("".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GateError::ClientNotAllowed("".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GateError::InvalidCloudPlatform("".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GateError::BodyTooLarge { size: 2, max: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_forwarding_error_hides_detail() {
        let err = GateError::Forwarding("connection refused to 10.1.2.3".into());
        assert_eq!(err.to_string(), "Server error during request forwarding");
    }

    #[test]
    fn test_is_server_error() {
        assert!(GateError::Forwarding("".into()).is_server_error());
        assert!(GateError::UnknownProxyType("".into()).is_server_error());

        assert!(!GateError::DomainNotAllowed("".into()).is_server_error());
        assert!(!GateError::PrivateAddress("".into()).is_server_error());
        assert!(!GateError::RouteResolution("".into()).is_server_error());
    }

    #[tokio::test]
    async fn test_into_response() {
        let response = GateError::RouteResolution("no device".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "Could not resolve route: no device");
    }
}
