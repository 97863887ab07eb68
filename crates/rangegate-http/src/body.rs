//! Response body types supporting buffered, streaming and empty modes.
//!
//! [`GatewayBody`] is the HTTP response body used by the gateway service:
//!
//! - **Buffered**: JSON error bodies, health and metrics payloads.
//! - **Streaming**: file bytes pulled lazily from the fetch pipeline.
//! - **Empty**: HEAD responses.
//!
//! A streaming body that fails mid-way surfaces an I/O error to hyper, which
//! aborts the connection. The status line has already been sent at that
//! point, so the client observes a short body.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Frame, SizeHint};
use http_body_util::Full;
use rangegate_core::ByteStream;

/// Gateway response body.
#[derive(Default)]
pub enum GatewayBody {
    /// Small in-memory payload.
    Buffered(Full<Bytes>),
    /// Lazily produced file bytes.
    Streaming {
        /// Source of body bytes.
        stream: ByteStream,
        /// Promised body length.
        len: u64,
    },
    /// No body.
    #[default]
    Empty,
}

impl fmt::Debug for GatewayBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(full) => f.debug_tuple("Buffered").field(full).finish(),
            Self::Streaming { len, .. } => f.debug_struct("Streaming").field("len", len).finish(),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl GatewayBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create a streaming body promising `len` bytes.
    #[must_use]
    pub fn streaming(stream: ByteStream, len: u64) -> Self {
        Self::Streaming { stream, len }
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl http_body::Body for GatewayBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming { stream, .. } => match stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                Poll::Ready(Some(Err(err))) => {
                    Poll::Ready(Some(Err(std::io::Error::other(err.to_string()))))
                }
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming { .. } => false,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming { len, .. } => SizeHint::with_exact(*len),
            Self::Empty => SizeHint::with_exact(0),
        }
    }
}
