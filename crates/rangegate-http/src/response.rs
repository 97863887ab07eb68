//! Error and JSON response construction.
//!
//! Every error response carries a JSON body `{"code": "...", "message": "..."}`.
//! Range failures against a known size add `Content-Range: bytes */{size}`,
//! rate limits add `Retry-After`, and 405 responses list the allowed methods.

use http::header::{self, HeaderValue};
use http::{Response, StatusCode};
use rangegate_core::{GatewayError, RangeError};
use serde::Serialize;

use crate::body::GatewayBody;

/// Content type of JSON payloads.
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

/// Build a JSON response with `status`.
#[must_use]
pub fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<GatewayBody> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(GatewayBody::from_bytes(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

/// Convert a gateway error into an HTTP response.
#[must_use]
pub fn error_to_response(error: &GatewayError) -> Response<GatewayBody> {
    let payload = ErrorBody {
        code: error.code(),
        message: error.public_message(),
    };
    let body = serde_json::to_vec(&payload).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = Response::new(GatewayBody::from_bytes(body));
    *response.status_mut() = error.status_code();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );

    match error {
        GatewayError::Range(RangeError::NotSatisfiable { size }) => {
            if let Ok(hv) = HeaderValue::from_str(&format!("bytes */{size}")) {
                headers.insert(header::CONTENT_RANGE, hv);
            }
        }
        GatewayError::MethodNotAllowed(_) => {
            headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        _ => {}
    }
    if let Some(secs) = error.retry_after() {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }

    response
}
