//! Response construction helpers shared by all filters.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::headers;

/// Fully buffered response handed back to the hosting engine.
pub type GateResponse = Response<Full<Bytes>>;

/// Creates a standardized plain-text response.
///
/// Falls back to a bare 500 if the builder fails, which cannot happen with a
/// valid [`StatusCode`].
///
/// # Example
///
/// ```
/// use egressgate_core::response::create_error_response;
/// use hyper::StatusCode;
///
/// let response = create_error_response(StatusCode::FORBIDDEN, "Forbidden");
/// assert_eq!(response.status(), StatusCode::FORBIDDEN);
/// ```
pub fn create_error_response(status: StatusCode, message: &str) -> GateResponse {
    create_text_response(status, headers::TEXT_PLAIN, message)
}

/// Creates a text response with an explicit content type.
pub fn create_text_response(status: StatusCode, content_type: &str, message: &str) -> GateResponse {
    Response::builder()
        .status(status)
        .header(headers::CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from(message.to_string())))
        .unwrap_or_else(|_| fallback_response())
}

/// Serializes `payload` into an `application/json` response.
pub fn create_json_response<T: Serialize>(status: StatusCode, payload: &T) -> GateResponse {
    match serde_json::to_vec(payload) {
        Ok(body) => Response::builder()
            .status(status)
            .header(headers::CONTENT_TYPE, headers::APPLICATION_JSON)
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| fallback_response()),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize JSON response");
            fallback_response()
        }
    }
}

fn fallback_response() -> GateResponse {
    let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
