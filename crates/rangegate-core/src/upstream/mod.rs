//! The remote chunked-file platform, seen through a narrow RPC trait.
//!
//! [`UpstreamTransport`] is the boundary between the gateway and the
//! messaging platform that actually stores the files. The gateway never
//! speaks the platform protocol directly; it only needs:
//!
//! - session RPCs: connect, is-authorized, service sign-in, who-am-i
//! - "resolve document by channel + sequence number"
//! - "join channel"
//! - "fetch file chunk by location + offset + limit"
//!
//! Two transports ship with the crate: [`memory::MemoryUpstream`], an
//! in-process emulator with fault injection, and
//! [`directory::DirectoryUpstream`], which serves files from a local
//! directory tree.

pub mod directory;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Hard per-call ceiling of the "get file chunk" RPC.
pub const MAX_CHUNK_LIMIT: u32 = 512 * 1024;

/// The account the session is signed in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Platform account id.
    pub id: i64,
    /// `true` for service (bot) accounts.
    pub is_service: bool,
}

/// A document attached to a channel message, as reported live by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    /// Platform document id.
    pub id: i64,
    /// Access credential paired with the id.
    pub access_hash: i64,
    /// Opaque, possibly expiring reference required by chunk fetches.
    pub file_reference: Bytes,
    /// Size in bytes; zero when the platform does not know it.
    pub size: u64,
    /// MIME type, when the platform reports one.
    pub mime_type: Option<String>,
}

/// Addressing data for a chunk fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    /// Platform document id.
    pub id: i64,
    /// Access credential paired with the id.
    pub access_hash: i64,
    /// Opaque file reference.
    pub file_reference: Bytes,
}

/// Errors reported by an [`UpstreamTransport`].
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The platform asked the caller to wait before retrying.
    #[error("rate limited by upstream (wait {wait:?})")]
    RateLimited {
        /// Server-specified wait, if any.
        wait: Option<Duration>,
    },

    /// The platform rejected the call with an RPC error.
    #[error("upstream RPC error {code}: {message}")]
    Rpc {
        /// Platform error code, e.g. `FILE_REFERENCE_EXPIRED`.
        code: String,
        /// Human-readable detail.
        message: String,
    },

    /// The connection failed or timed out.
    #[error("upstream network error: {0}")]
    Network(#[from] std::io::Error),

    /// The channel, message, or document does not exist.
    #[error("upstream resource not found: {0}")]
    NotFound(String),

    /// The session may not access the resource.
    #[error("upstream access forbidden: {0}")]
    Forbidden(String),

    /// The session is not signed in.
    #[error("upstream session is not authorized")]
    Unauthorized,
}

impl UpstreamError {
    /// Build an RPC error from a code and message.
    #[must_use]
    pub fn rpc(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rpc {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a network error from a message.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            message.into(),
        ))
    }
}

/// RPC surface of the remote platform.
///
/// Implementations must support concurrent in-flight calls once the session is
/// authorized; the gateway serializes only connect and authorize.
#[async_trait]
pub trait UpstreamTransport: Send + Sync + 'static {
    /// Establish (or re-establish) the transport connection.
    async fn connect(&self) -> Result<(), UpstreamError>;

    /// Whether the transport currently reports itself connected.
    fn is_connected(&self) -> bool;

    /// Whether the connection carries a valid signed-in session.
    async fn is_authorized(&self) -> Result<bool, UpstreamError>;

    /// Sign in with a service (bot) token.
    async fn sign_in_service(&self, token: &str) -> Result<(), UpstreamError>;

    /// Return the account the session is signed in as.
    async fn whoami(&self) -> Result<Principal, UpstreamError>;

    /// Close the connection.
    async fn disconnect(&self);

    /// Resolve the document attached to message `seq` in `channel`.
    ///
    /// Returns `Ok(None)` when the message exists but carries no document.
    async fn get_document(
        &self,
        channel: &str,
        seq: i64,
    ) -> Result<Option<RemoteDocument>, UpstreamError>;

    /// Join `channel`. Joining a channel that is already joined succeeds.
    async fn join_channel(&self, channel: &str) -> Result<(), UpstreamError>;

    /// Fetch up to `limit` bytes of a file starting at `offset`.
    ///
    /// An empty result means `offset` is at or past the end of the file.
    async fn get_file_chunk(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, UpstreamError>;
}

/// Clamp a requested chunk limit to the RPC ceiling.
///
/// Non-positive or oversized limits become [`MAX_CHUNK_LIMIT`]; a limit is
/// never raised above what was asked for otherwise.
#[must_use]
pub fn clamp_chunk_limit(limit: i64) -> u32 {
    if limit <= 0 || limit > i64::from(MAX_CHUNK_LIMIT) {
        MAX_CHUNK_LIMIT
    } else {
        u32::try_from(limit).unwrap_or(MAX_CHUNK_LIMIT)
    }
}
