//! Byte budget in front of the response body.
//!
//! [`RangeGuard`] wraps any stream of byte slices and guarantees the consumer
//! never sees more than the promised number of bytes, independent of how the
//! producer computes its own bounds. Empty slices are skipped in both modes.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

use crate::range::ByteRange;

pin_project! {
    /// Stream adapter enforcing an optional byte budget.
    #[derive(Debug)]
    #[must_use = "streams do nothing unless polled"]
    pub struct RangeGuard<S> {
        #[pin]
        inner: S,
        remaining: Option<u64>,
        done: bool,
    }
}

impl<S> RangeGuard<S> {
    /// Cap `inner` at `range.len()` bytes.
    pub fn new(inner: S, range: ByteRange) -> Self {
        Self {
            inner,
            remaining: Some(range.len()),
            done: false,
        }
    }

    /// Pass `inner` through unchanged apart from dropping empty slices.
    pub fn unbounded(inner: S) -> Self {
        Self {
            inner,
            remaining: None,
            done: false,
        }
    }
}

impl<S, E> Stream for RangeGuard<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if *this.done || *this.remaining == Some(0) {
                *this.done = true;
                return Poll::Ready(None);
            }

            let mut chunk = match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                None => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
            };
            if chunk.is_empty() {
                continue;
            }

            if let Some(remaining) = this.remaining.as_mut() {
                let len = chunk.len() as u64;
                if len > *remaining {
                    #[allow(clippy::cast_possible_truncation)]
                    chunk.truncate(*remaining as usize);
                }
                *remaining -= chunk.len() as u64;
            }
            return Poll::Ready(Some(Ok(chunk)));
        }
    }
}
