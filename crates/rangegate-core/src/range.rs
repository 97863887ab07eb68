//! HTTP `Range` header handling.
//!
//! [`compute_range`] turns an optional `Range` header and the declared size of
//! a remote document into the inclusive byte range the response promises.
//! Only a single contiguous `bytes=` range is supported.

use std::fmt;

/// The only range unit understood by the gateway.
const BYTES_UNIT: &str = "bytes=";

/// An inclusive byte range `start..=end` within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a range, returning `None` when `start > end`.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of bytes covered by the range (`end - start + 1`).
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header of a 206 response.
    #[must_use]
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Result of evaluating a `Range` header against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    /// The bytes that will be sent.
    pub range: ByteRange,
    /// `true` when the client sent a usable `Range` header (206), `false` for
    /// a full-body response (200).
    pub partial: bool,
}

/// Reasons a `Range` header cannot be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// More than one range was requested.
    #[error("multiple ranges are not supported")]
    Unsupported,
    /// The header is malformed or describes an empty range.
    #[error("invalid range")]
    Invalid,
    /// The range starts at or beyond the end of the file.
    #[error("range not satisfiable for a file of {size} bytes")]
    NotSatisfiable {
        /// Declared size of the file.
        size: u64,
    },
}

/// Evaluate an HTTP `Range` header against `total_size`.
///
/// Supported forms:
/// - no header, or a unit other than `bytes` -- the whole file, not partial
/// - `bytes=A-B` -- explicit range, `B` clamped to the last byte
/// - `bytes=A-` -- from `A` to the end
/// - `bytes=-N` -- the last `N` bytes (the whole file when `N` exceeds it)
///
/// An explicit range that covers the entire file is still reported as
/// partial; only the absence of a header yields a 200.
///
/// # Errors
///
/// - [`RangeError::Unsupported`] for multi-range headers
/// - [`RangeError::Invalid`] for malformed numbers, `N <= 0` suffixes, or
///   `start > end`
/// - [`RangeError::NotSatisfiable`] when `start >= total_size` (including any
///   request against an empty file)
///
/// # Examples
///
/// ```
/// use rangegate_core::range::compute_range;
///
/// let req = compute_range(Some("bytes=0-1023"), 2_000_000).unwrap();
/// assert_eq!((req.range.start, req.range.end, req.partial), (0, 1023, true));
///
/// let full = compute_range(None, 10).unwrap();
/// assert_eq!((full.range.start, full.range.end, full.partial), (0, 9, false));
/// ```
pub fn compute_range(header: Option<&str>, total_size: u64) -> Result<RangeRequest, RangeError> {
    if total_size == 0 {
        return Err(RangeError::NotSatisfiable { size: 0 });
    }
    let last = total_size - 1;

    let Some(spec) = header.and_then(|h| h.strip_prefix(BYTES_UNIT)) else {
        return Ok(RangeRequest {
            range: ByteRange {
                start: 0,
                end: last,
            },
            partial: false,
        });
    };

    let spec = spec.trim();
    if spec.contains(',') {
        return Err(RangeError::Unsupported);
    }

    let (start_s, end_s) = spec.split_once('-').unwrap_or((spec, ""));
    let start_s = start_s.trim();
    let end_s = end_s.trim();

    let (start, end) = if start_s.is_empty() {
        // bytes=-N
        let suffix: i64 = end_s.parse().map_err(|_| RangeError::Invalid)?;
        if suffix <= 0 {
            return Err(RangeError::Invalid);
        }
        let suffix = suffix.unsigned_abs();
        (total_size.saturating_sub(suffix), last)
    } else {
        let start: u64 = start_s.parse().map_err(|_| RangeError::Invalid)?;
        let end = if end_s.is_empty() {
            last
        } else {
            end_s.parse().map_err(|_| RangeError::Invalid)?
        };
        (start, end)
    };

    if start >= total_size {
        return Err(RangeError::NotSatisfiable { size: total_size });
    }
    let end = end.min(last);
    let range = ByteRange::new(start, end).ok_or(RangeError::Invalid)?;

    Ok(RangeRequest {
        range,
        partial: true,
    })
}
