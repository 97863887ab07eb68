//! Logical file reference to remote document.
//!
//! [`DocumentResolver::resolve`] finds the channel and message that carry a
//! file, makes sure the session may read the channel, and fetches the live
//! document descriptor. Handles are resolved per request and never cached,
//! because file references expire.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::metadata::{FileRecord, MetadataStore};
use crate::metrics::GatewayMetrics;
use crate::retry::RetryPolicy;
use crate::session::{SessionHandle, SessionManager};
use crate::upstream::{FileLocation, RemoteDocument, UpstreamError};

/// MIME type used when neither the platform nor the catalog knows one.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// What the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalFileRef {
    /// A catalog id (a UUID in text form).
    FileId(String),
    /// A message in a channel, addressed directly.
    Message {
        /// Channel reference, normalized by the resolver.
        channel: String,
        /// Message sequence number.
        seq: i64,
    },
}

impl fmt::Display for LogicalFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileId(id) => write!(f, "file {id}"),
            Self::Message { channel, seq } => write!(f, "message {channel}/{seq}"),
        }
    }
}

/// Everything needed to fetch a document's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocumentHandle {
    /// Platform document id.
    pub document_id: i64,
    /// Access credential paired with the id.
    pub access_hash: i64,
    /// Opaque, possibly expiring reference.
    pub file_reference: Bytes,
    /// Size in bytes.
    pub declared_size: u64,
    /// MIME type, if known.
    pub mime_type: Option<String>,
}

impl RemoteDocumentHandle {
    /// Addressing data for chunk fetches.
    #[must_use]
    pub fn location(&self) -> FileLocation {
        FileLocation {
            id: self.document_id,
            access_hash: self.access_hash,
            file_reference: self.file_reference.clone(),
        }
    }
}

impl From<RemoteDocument> for RemoteDocumentHandle {
    fn from(doc: RemoteDocument) -> Self {
        Self {
            document_id: doc.id,
            access_hash: doc.access_hash,
            file_reference: doc.file_reference,
            declared_size: doc.size,
            mime_type: doc.mime_type,
        }
    }
}

/// A resolved document plus the catalog record it came from, if any.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Live document handle with catalog fallbacks applied.
    pub handle: RemoteDocumentHandle,
    /// Catalog record for file-id references.
    pub record: Option<FileRecord>,
    /// Normalized channel.
    pub channel: String,
    /// Message sequence number.
    pub seq: i64,
}

impl ResolvedFile {
    /// Total size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.handle.declared_size
    }

    /// MIME type, defaulting to `application/octet-stream`.
    #[must_use]
    pub fn mime(&self) -> &str {
        self.handle.mime_type.as_deref().unwrap_or(DEFAULT_MIME)
    }

    /// Catalog id, for file-id references.
    #[must_use]
    pub fn file_id(&self) -> Option<Uuid> {
        self.record.as_ref().map(|r| r.id)
    }
}

/// Normalize a channel reference: trim, drop a leading `@`, lower-case.
///
/// # Errors
///
/// Returns [`GatewayError::BadRequest`] when nothing is left.
pub fn normalize_channel(raw: &str) -> GatewayResult<String> {
    let channel = raw.trim().trim_start_matches('@').trim().to_lowercase();
    if channel.is_empty() {
        return Err(GatewayError::BadRequest("channel reference is empty".to_owned()));
    }
    Ok(channel)
}

/// Resolves logical references against the catalog and the live platform.
#[derive(Clone)]
pub struct DocumentResolver {
    session: Arc<SessionManager>,
    metadata: Arc<dyn MetadataStore>,
    retry: RetryPolicy,
    metrics: GatewayMetrics,
}

impl fmt::Debug for DocumentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentResolver")
            .field("session", &self.session)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl DocumentResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        session: Arc<SessionManager>,
        metadata: Arc<dyn MetadataStore>,
        retry: RetryPolicy,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            session,
            metadata,
            retry,
            metrics,
        }
    }

    /// Resolve `reference` to a live document.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::BadRequest`] for an empty channel
    /// - [`GatewayError::NotFound`] for unknown ids, missing messages, or
    ///   messages without a document
    /// - [`GatewayError::AccessDenied`] when the channel cannot be joined or read
    /// - [`GatewayError::UnknownSize`] / [`GatewayError::UnsupportedMedia`] for
    ///   documents without a usable size
    /// - [`GatewayError::RateLimited`] or [`GatewayError::UpstreamUnavailable`]
    ///   once retries are exhausted
    #[instrument(skip_all, fields(reference = %reference))]
    pub async fn resolve(&self, reference: &LogicalFileRef) -> GatewayResult<ResolvedFile> {
        let (channel, seq, record) = match reference {
            LogicalFileRef::FileId(raw) => {
                let record = self.lookup(raw).await?;
                (normalize_channel(&record.channel)?, record.sequence, Some(record))
            }
            LogicalFileRef::Message { channel, seq } => (normalize_channel(channel)?, *seq, None),
        };

        let ready = self.session.ensure_ready().await?;
        if ready.identity().requires_join() {
            self.join(&ready, &channel).await?;
        }

        let transport = ready.transport();
        let channel_ref = channel.as_str();
        let document = self
            .retry
            .run("get_document", &self.session, &self.metrics, move || {
                transport.get_document(channel_ref, seq)
            })
            .await
            .map_err(|err| lookup_error(err, &channel))?
            .ok_or_else(|| GatewayError::NotFound(format!("no document at {channel}/{seq}")))?;

        let mut handle = RemoteDocumentHandle::from(document);
        if let Some(record) = &record {
            if handle.declared_size == 0 {
                handle.declared_size = record.declared_size;
            }
            if handle.mime_type.is_none() {
                handle.mime_type.clone_from(&record.mime);
            }
        }

        if handle.declared_size == 0 {
            let what = format!("{channel}/{seq}");
            return Err(if record.is_some() {
                GatewayError::UnknownSize(what)
            } else {
                GatewayError::UnsupportedMedia(what)
            });
        }

        debug!(
            %channel,
            seq,
            size = handle.declared_size,
            mime = handle.mime_type.as_deref().unwrap_or(DEFAULT_MIME),
            "document resolved"
        );
        Ok(ResolvedFile {
            handle,
            record,
            channel,
            seq,
        })
    }

    async fn lookup(&self, raw: &str) -> GatewayResult<FileRecord> {
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| GatewayError::NotFound(format!("file {raw}")))?;
        self.metadata
            .get_file(&id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("file {id}")))
    }

    async fn join(&self, ready: &SessionHandle, channel: &str) -> GatewayResult<()> {
        let transport = ready.transport();
        self.retry
            .run("join_channel", &self.session, &self.metrics, move || {
                transport.join_channel(channel)
            })
            .await
            .map_err(|err| match err {
                UpstreamError::NotFound(_) | UpstreamError::Forbidden(_) => {
                    GatewayError::AccessDenied(format!("cannot join {channel}"))
                }
                other => exhausted(other, channel),
            })
    }
}

fn lookup_error(err: UpstreamError, channel: &str) -> GatewayError {
    match err {
        UpstreamError::Forbidden(_) => GatewayError::AccessDenied(format!("cannot read {channel}")),
        UpstreamError::NotFound(what) => GatewayError::NotFound(what),
        other => exhausted(other, channel),
    }
}

fn exhausted(err: UpstreamError, channel: &str) -> GatewayError {
    match err {
        UpstreamError::RateLimited { .. } => GatewayError::from(err),
        other => GatewayError::UpstreamUnavailable(format!("{channel}: {other}")),
    }
}
