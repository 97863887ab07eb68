//! Chunked fetch engine.
//!
//! [`ChunkFetcher::fetch`] turns a document handle and an inclusive byte range
//! into a lazy stream of byte slices. Upstream reads are aligned to
//! [`CHUNK_SIZE`]: the first request starts at `start - start % CHUNK_SIZE`,
//! each following request continues where the previous response ended. The
//! first slice drops the leading bytes before `start`, the last one is cut at
//! `end`. An empty upstream response ends the stream early (short read).
//!
//! The stream is pull-based: every poll issues at most one upstream call, so
//! dropping the stream stops all further RPCs. Each call goes through the
//! [`RetryPolicy`]; retries happen before any byte of that chunk is yielded.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::range::ByteRange;
use crate::resolver::RemoteDocumentHandle;
use crate::retry::RetryPolicy;
use crate::session::SessionManager;
use crate::upstream::{MAX_CHUNK_LIMIT, clamp_chunk_limit};

/// Alignment and request size of upstream reads.
pub const CHUNK_SIZE: u32 = MAX_CHUNK_LIMIT;

/// Boxed stream of body bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// Produces exact byte ranges from aligned upstream chunk reads.
#[derive(Debug, Clone)]
pub struct ChunkFetcher {
    session: Arc<SessionManager>,
    retry: RetryPolicy,
    metrics: GatewayMetrics,
    chunk_size: u32,
}

impl ChunkFetcher {
    /// Create a fetcher reading [`CHUNK_SIZE`] bytes per call.
    #[must_use]
    pub fn new(session: Arc<SessionManager>, retry: RetryPolicy, metrics: GatewayMetrics) -> Self {
        Self {
            session,
            retry,
            metrics,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the chunk size. Values outside `1..=CHUNK_SIZE` are clamped to
    /// [`CHUNK_SIZE`].
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = clamp_chunk_limit(i64::from(chunk_size));
        self
    }

    /// Stream the bytes `range.start..=range.end` of the document.
    ///
    /// Nothing happens until the stream is polled.
    pub fn fetch(&self, handle: &RemoteDocumentHandle, range: ByteRange) -> ByteStream {
        let session = Arc::clone(&self.session);
        let retry = self.retry.clone();
        let metrics = self.metrics.clone();
        let chunk_size = u64::from(self.chunk_size);
        let limit = self.chunk_size;
        let location = handle.location();

        Box::pin(async_stream::try_stream! {
            let ready = session.ensure_ready().await?;
            let transport = ready.transport();
            let location = &location;

            let base = range.start - range.start % chunk_size;
            let mut skip = range.start - base;
            let mut remaining = range.len();
            let mut offset = base;

            while remaining > 0 {
                let chunk = retry
                    .run("get_file_chunk", &session, &metrics, move || {
                        transport.get_file_chunk(location, offset, limit)
                    })
                    .await
                    .map_err(GatewayError::from)?;

                if chunk.is_empty() {
                    debug!(offset, remaining, "upstream reached end of file before range end");
                    break;
                }

                let returned = chunk.len() as u64;
                offset += returned;

                let mut slice = chunk;
                if skip > 0 {
                    if skip >= returned {
                        skip -= returned;
                        continue;
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    let head = skip as usize;
                    slice = slice.slice(head..);
                    skip = 0;
                }
                if slice.len() as u64 > remaining {
                    #[allow(clippy::cast_possible_truncation)]
                    slice.truncate(remaining as usize);
                }
                remaining -= slice.len() as u64;

                yield slice;
            }
        })
    }
}
