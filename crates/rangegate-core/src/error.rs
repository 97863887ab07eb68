//! Gateway error taxonomy.
//!
//! [`GatewayError`] is the domain error every component returns. Each variant
//! knows the HTTP status it maps to and a short machine-readable code, so the
//! HTTP layer only has to serialize it. `AccessDenied` deliberately reports
//! the same status and code as `NotFound` so responses never reveal whether a
//! channel exists.

use std::time::Duration;

use http::StatusCode;

use crate::metadata::MetadataError;
use crate::range::RangeError;
use crate::upstream::UpstreamError;

/// Domain error for the streaming gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Credentials or settings are missing; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The HTTP method is not supported on this resource.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// No file or document exists at the reference.
    #[error("not found: {0}")]
    NotFound(String),

    /// The channel could not be joined or read.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The `Range` header cannot be served.
    #[error(transparent)]
    Range(#[from] RangeError),

    /// The resolved document reports no usable size.
    #[error("unknown file size: {0}")]
    UnknownSize(String),

    /// The resolved document has a size the gateway cannot serve.
    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),

    /// The upstream platform asked us to wait and the retry budget ran out.
    #[error("upstream rate limited, retry after {wait:?}")]
    RateLimited {
        /// How long the platform asked the caller to wait.
        wait: Duration,
    },

    /// An upstream RPC failed after all retries.
    #[error("upstream RPC error {code}: {message}")]
    UpstreamRpc {
        /// Platform error code.
        code: String,
        /// Detail text.
        message: String,
    },

    /// The upstream connection failed after all retries.
    #[error("upstream network error: {0}")]
    UpstreamNetwork(String),

    /// Document resolution exhausted its retries.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The metadata store failed.
    #[error("metadata store error: {0}")]
    Metadata(#[from] MetadataError),

    /// Anything else.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Convenience result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Fallback wait reported when a rate limit carried no duration.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3);

impl GatewayError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound(_) | Self::AccessDenied(_) => StatusCode::NOT_FOUND,
            Self::Range(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamRpc { .. } | Self::UpstreamNetwork(_) | Self::UpstreamUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Configuration(_)
            | Self::UnknownSize(_)
            | Self::Metadata(_)
            | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable reason.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::BadRequest(_) => "BadRequest",
            Self::MethodNotAllowed(_) => "MethodNotAllowed",
            Self::NotFound(_) | Self::AccessDenied(_) => "NotFound",
            Self::Range(RangeError::Unsupported) => "RangeUnsupported",
            Self::Range(RangeError::Invalid) => "InvalidRange",
            Self::Range(RangeError::NotSatisfiable { .. }) => "RangeNotSatisfiable",
            Self::UnknownSize(_) => "UnknownSize",
            Self::UnsupportedMedia(_) => "UnsupportedMedia",
            Self::RateLimited { .. } => "RateLimited",
            Self::UpstreamRpc { .. } => "UpstreamRPCError",
            Self::UpstreamNetwork(_) => "UpstreamNetworkError",
            Self::UpstreamUnavailable(_) => "UpstreamUnavailable",
            Self::Metadata(_) | Self::Unexpected(_) => "UnexpectedError",
        }
    }

    /// Message safe to show to HTTP clients.
    ///
    /// Access failures are reported with the not-found wording, and internal
    /// failures do not leak their details.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(_) | Self::AccessDenied(_) => {
                "file not found or not accessible".to_owned()
            }
            Self::RateLimited { wait } => {
                format!("upstream rate limit, wait {}s", wait.as_secs().max(1))
            }
            Self::Configuration(_) | Self::Metadata(_) | Self::Unexpected(_) => {
                "unexpected error".to_owned()
            }
            other => other.to_string(),
        }
    }

    /// Seconds clients should wait before retrying, for 429 responses.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { wait } => Some(wait.as_secs().max(1)),
            _ => None,
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::RateLimited { wait } => Self::RateLimited {
                wait: wait.unwrap_or(DEFAULT_RATE_LIMIT_WAIT),
            },
            UpstreamError::Rpc { code, message } => Self::UpstreamRpc { code, message },
            UpstreamError::Network(e) => Self::UpstreamNetwork(e.to_string()),
            UpstreamError::NotFound(what) => Self::NotFound(what),
            UpstreamError::Forbidden(what) => Self::AccessDenied(what),
            UpstreamError::Unauthorized => Self::UpstreamRpc {
                code: "AUTH_KEY_UNREGISTERED".to_owned(),
                message: "upstream session is not authorized".to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_hide_access_denied_behind_not_found() {
        let denied = GatewayError::AccessDenied("channel secret".to_owned());
        let missing = GatewayError::NotFound("file 42".to_owned());
        assert_eq!(denied.status_code(), missing.status_code());
        assert_eq!(denied.code(), missing.code());
        assert_eq!(denied.public_message(), missing.public_message());
        assert!(!denied.public_message().contains("secret"));
    }

    #[test]
    fn test_should_map_range_errors_to_416() {
        for err in [
            RangeError::Unsupported,
            RangeError::Invalid,
            RangeError::NotSatisfiable { size: 10 },
        ] {
            assert_eq!(
                GatewayError::from(err).status_code(),
                StatusCode::RANGE_NOT_SATISFIABLE
            );
        }
    }

    #[test]
    fn test_should_map_upstream_errors() {
        let err = GatewayError::from(UpstreamError::RateLimited { wait: None });
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.retry_after(), Some(3));

        let err = GatewayError::from(UpstreamError::rpc("INTERNAL", "boom"));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = GatewayError::from(UpstreamError::network("reset"));
        assert_eq!(err.code(), "UpstreamNetworkError");

        let err = GatewayError::from(UpstreamError::Forbidden("chan".to_owned()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_should_not_leak_internal_details() {
        let err = GatewayError::Unexpected("db password wrong".to_owned());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "unexpected error");
    }
}
