//! Request routing for the gateway endpoints.
//!
//! [`GatewayRouter`] maps the request method and path to a [`Route`]:
//!
//! | Path | Route |
//! |------|-------|
//! | `/stream/by-msg/{seq}?chat={channel}` | [`Route::StreamByMessage`] |
//! | `/stream/{fileRef}` | [`Route::Stream`] |
//! | `/download/{fileRef}` | [`Route::Download`] |
//!
//! Only `GET` and `HEAD` are accepted. Unknown paths are 404 regardless of
//! method; known paths with other methods are 405.

use std::fmt;

use http::Method;
use percent_encoding::percent_decode_str;
use rangegate_core::{GatewayError, LogicalFileRef};

/// An identified gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Inline stream of a catalog file.
    Stream {
        /// Catalog id as sent by the client.
        file_id: String,
    },
    /// Inline stream of a message's document.
    StreamByMessage {
        /// Channel reference from the `chat` query parameter.
        channel: String,
        /// Message sequence number.
        seq: i64,
    },
    /// Attachment download of a catalog file.
    Download {
        /// Catalog id as sent by the client.
        file_id: String,
    },
}

impl Route {
    /// The logical file this route addresses.
    #[must_use]
    pub fn file_ref(&self) -> LogicalFileRef {
        match self {
            Self::Stream { file_id } | Self::Download { file_id } => {
                LogicalFileRef::FileId(file_id.clone())
            }
            Self::StreamByMessage { channel, seq } => LogicalFileRef::Message {
                channel: channel.clone(),
                seq: *seq,
            },
        }
    }

    /// Whether the response is an attachment download.
    #[must_use]
    pub fn is_download(&self) -> bool {
        matches!(self, Self::Download { .. })
    }

    /// Short label for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::StreamByMessage { .. } => "stream_by_msg",
            Self::Download { .. } => "download",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream { file_id } => write!(f, "stream {file_id}"),
            Self::StreamByMessage { channel, seq } => write!(f, "stream {channel}/{seq}"),
            Self::Download { file_id } => write!(f, "download {file_id}"),
        }
    }
}

/// The result of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingContext {
    /// The identified endpoint.
    pub route: Route,
    /// `true` for `HEAD` requests.
    pub head_only: bool,
}

/// Stateless router for the gateway endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayRouter;

impl GatewayRouter {
    /// Resolve a method and URI to a routing context.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotFound`] for unknown paths
    /// - [`GatewayError::MethodNotAllowed`] for methods other than GET and HEAD
    /// - [`GatewayError::BadRequest`] for a malformed sequence number, a
    ///   missing `chat` parameter, or an empty file reference
    pub fn resolve(&self, method: &Method, uri: &http::Uri) -> Result<RoutingContext, GatewayError> {
        let path = uri.path();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        let route = match segments.as_slice() {
            ["stream", "by-msg", seq] => {
                let seq = parse_seq(seq)?;
                let channel = query_param(uri.query(), "chat")
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        GatewayError::BadRequest("missing chat query parameter".to_owned())
                    })?;
                Route::StreamByMessage { channel, seq }
            }
            ["stream", file_id] => Route::Stream {
                file_id: decode_segment(file_id)?,
            },
            ["download", file_id] => Route::Download {
                file_id: decode_segment(file_id)?,
            },
            _ => return Err(GatewayError::NotFound(format!("no route for {path}"))),
        };

        let head_only = match *method {
            Method::GET => false,
            Method::HEAD => true,
            _ => return Err(GatewayError::MethodNotAllowed(method.to_string())),
        };

        Ok(RoutingContext { route, head_only })
    }
}

fn decode_segment(raw: &str) -> Result<String, GatewayError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| GatewayError::BadRequest("file reference is not valid UTF-8".to_owned()))?;
    let decoded = decoded.trim();
    if decoded.is_empty() {
        return Err(GatewayError::BadRequest("empty file reference".to_owned()));
    }
    Ok(decoded.to_owned())
}

fn parse_seq(raw: &str) -> Result<i64, GatewayError> {
    raw.parse::<i64>()
        .ok()
        .filter(|seq| *seq > 0)
        .ok_or_else(|| GatewayError::BadRequest(format!("invalid message sequence: {raw}")))
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
