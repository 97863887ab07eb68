//! Range-aware response assembly.
//!
//! [`StreamGateway`] runs one request through the pipeline:
//!
//! ```text
//! resolve document -> compute range -> fetch + guard -> streaming body
//! ```
//!
//! Failures before the first body byte become error responses. Once the
//! status line is out, a failure is logged and the body is aborted.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Response, StatusCode};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rangegate_core::filename::download_filename;
use rangegate_core::resolver::DEFAULT_MIME;
use rangegate_core::{
    ByteRange, ByteStream, ChunkFetcher, DocumentResolver, GatewayError, GatewayMetrics,
    GatewayResult, RangeGuard, ResolvedFile, UsageLog, compute_range,
};
use tracing::{debug, error, info, warn};

use crate::body::GatewayBody;
use crate::router::RoutingContext;

/// Header carrying a caller id, trusted only when debug headers are allowed.
pub const DEBUG_USER_HEADER: &str = "x-debug-user-id";

/// Resolves, slices and streams documents.
#[derive(Clone)]
pub struct StreamGateway {
    resolver: DocumentResolver,
    fetcher: ChunkFetcher,
    metrics: GatewayMetrics,
    usage: Arc<dyn UsageLog>,
    allow_debug_headers: bool,
}

impl std::fmt::Debug for StreamGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGateway")
            .field("resolver", &self.resolver)
            .field("fetcher", &self.fetcher)
            .field("allow_debug_headers", &self.allow_debug_headers)
            .finish_non_exhaustive()
    }
}

impl StreamGateway {
    /// Assemble a gateway from its parts.
    #[must_use]
    pub fn new(
        resolver: DocumentResolver,
        fetcher: ChunkFetcher,
        metrics: GatewayMetrics,
        usage: Arc<dyn UsageLog>,
        allow_debug_headers: bool,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            metrics,
            usage,
            allow_debug_headers,
        }
    }

    /// Metrics shared with the fetch pipeline.
    #[must_use]
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Serve a routed request.
    ///
    /// # Errors
    ///
    /// Returns resolution and range errors; nothing after the response head
    /// is produced can fail here.
    pub async fn serve(
        &self,
        ctx: &RoutingContext,
        headers: &HeaderMap,
        request_id: &str,
    ) -> GatewayResult<Response<GatewayBody>> {
        let resolved = self.resolver.resolve(&ctx.route.file_ref()).await?;
        self.log_play(&resolved, headers);

        let size = resolved.size();
        let mime = resolved.mime().to_owned();
        let download = ctx.route.is_download();

        if ctx.head_only {
            debug!(request_id, route = ctx.route.name(), size, "answering HEAD");
            let mut response = Response::new(GatewayBody::empty());
            *response.status_mut() = StatusCode::OK;
            Self::apply_headers(response.headers_mut(), &resolved, size, None, download);
            return Ok(response);
        }

        let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
        let request = compute_range(range_header, size)?;
        let range = request.range;

        if download {
            self.metrics.download_started(&mime);
        } else {
            self.metrics.stream_started(request.partial, &mime);
        }
        info!(
            request_id,
            route = ctx.route.name(),
            channel = %resolved.channel,
            seq = resolved.seq,
            range = %range,
            size,
            partial = request.partial,
            "stream started"
        );

        let fetched = self.fetcher.fetch(&resolved.handle, range);
        let tracked = TrackedStream::new(
            RangeGuard::new(fetched, range),
            range,
            self.metrics.clone(),
            request_id,
            &resolved,
        );

        let mut response = Response::new(GatewayBody::streaming(Box::pin(tracked), range.len()));
        *response.status_mut() = if request.partial {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };
        let content_range = request.partial.then_some(range);
        Self::apply_headers(response.headers_mut(), &resolved, size, content_range, download);
        Ok(response)
    }

    fn apply_headers(
        headers: &mut HeaderMap,
        resolved: &ResolvedFile,
        size: u64,
        content_range: Option<ByteRange>,
        download: bool,
    ) {
        let length = content_range.map_or(size, |r| r.len());
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        if let Some(range) = content_range {
            if let Ok(hv) = HeaderValue::from_str(&range.content_range(size)) {
                headers.insert(header::CONTENT_RANGE, hv);
            }
        }
        let content_type = resolved
            .mime()
            .parse::<mime::Mime>()
            .ok()
            .and_then(|m| HeaderValue::from_str(m.as_ref()).ok())
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_MIME));
        headers.insert(header::CONTENT_TYPE, content_type);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-transform"));
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

        if download {
            let record = resolved.record.as_ref();
            let name = download_filename(
                record.and_then(|r| r.title.as_deref()),
                record.map_or(&[][..], |r| r.contributors.as_slice()),
                resolved.handle.mime_type.as_deref(),
            );
            if let Ok(hv) = HeaderValue::from_str(&content_disposition(&name)) {
                headers.insert(header::CONTENT_DISPOSITION, hv);
            }
        }
    }

    fn caller_id(&self, headers: &HeaderMap) -> Option<i64> {
        if !self.allow_debug_headers {
            return None;
        }
        headers
            .get(DEBUG_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
    }

    fn log_play(&self, resolved: &ResolvedFile, headers: &HeaderMap) {
        let (Some(file_id), Some(caller_id)) = (resolved.file_id(), self.caller_id(headers)) else {
            return;
        };
        let usage = Arc::clone(&self.usage);
        tokio::spawn(async move {
            if let Err(err) = usage.record_play(caller_id, file_id).await {
                warn!(caller_id, %file_id, error = %err, "failed to record play");
            }
        });
    }
}

/// `Content-Disposition` value with an ASCII fallback and a UTF-8 name.
#[must_use]
pub fn content_disposition(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let encoded = utf8_percent_encode(name, NON_ALPHANUMERIC);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}

/// Counts delivered bytes and reports how the body ended.
struct TrackedStream {
    inner: RangeGuard<ByteStream>,
    expected: u64,
    sent: u64,
    finished: bool,
    failed: bool,
    metrics: GatewayMetrics,
    request_id: String,
    channel: String,
    seq: i64,
}

impl TrackedStream {
    fn new(
        inner: RangeGuard<ByteStream>,
        range: ByteRange,
        metrics: GatewayMetrics,
        request_id: &str,
        resolved: &ResolvedFile,
    ) -> Self {
        Self {
            inner,
            expected: range.len(),
            sent: 0,
            finished: false,
            failed: false,
            metrics,
            request_id: request_id.to_owned(),
            channel: resolved.channel.clone(),
            seq: resolved.seq,
        }
    }
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = std::task::ready!(Pin::new(&mut this.inner).poll_next(cx));
        match &item {
            Some(Ok(chunk)) => this.sent += chunk.len() as u64,
            Some(Err(err)) => {
                this.failed = true;
                error!(
                    request_id = %this.request_id,
                    channel = %this.channel,
                    seq = this.seq,
                    sent = this.sent,
                    expected = this.expected,
                    error = %err,
                    "stream failed mid-body, aborting connection"
                );
            }
            None => this.finished = true,
        }
        Poll::Ready(item)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.metrics.add_bytes_streamed(self.sent);
        if self.failed {
            return;
        }
        if self.finished && self.sent < self.expected {
            warn!(
                request_id = %self.request_id,
                channel = %self.channel,
                seq = self.seq,
                sent = self.sent,
                expected = self.expected,
                "upstream ended early, body is short"
            );
        } else if self.finished {
            info!(request_id = %self.request_id, sent = self.sent, "stream completed");
        } else {
            info!(
                request_id = %self.request_id,
                sent = self.sent,
                expected = self.expected,
                "client disconnected"
            );
        }
    }
}
