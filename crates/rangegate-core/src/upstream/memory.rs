//! In-process platform emulator.
//!
//! [`MemoryUpstream`] keeps channels, messages, and document bytes in memory
//! and implements [`UpstreamTransport`] over them. Tests use it to script the
//! failures the gateway must absorb: rate limits, RPC errors, dropped
//! connections, forbidden channels and stale file references. Every chunk
//! request is recorded so alignment and retry behavior can be asserted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    FileLocation, MAX_CHUNK_LIMIT, Principal, RemoteDocument, UpstreamError, UpstreamTransport,
};

/// Operations that can have faults injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamOp {
    /// [`UpstreamTransport::get_document`].
    GetDocument,
    /// [`UpstreamTransport::join_channel`].
    JoinChannel,
    /// [`UpstreamTransport::get_file_chunk`].
    GetFileChunk,
}

/// A scripted failure, consumed by the next call of the matching operation.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer with a rate-limit error carrying this wait.
    RateLimited(Option<Duration>),
    /// Answer with an RPC error carrying this code.
    Rpc(&'static str),
    /// Drop the connection and answer with a network error.
    Disconnect,
}

impl Fault {
    fn into_error(self, connected: &AtomicBool) -> UpstreamError {
        match self {
            Self::RateLimited(wait) => UpstreamError::RateLimited { wait },
            Self::Rpc(code) => UpstreamError::rpc(code, "injected fault"),
            Self::Disconnect => {
                connected.store(false, Ordering::SeqCst);
                UpstreamError::network("connection dropped")
            }
        }
    }
}

/// One recorded chunk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCall {
    /// Document id.
    pub document_id: i64,
    /// Requested offset.
    pub offset: u64,
    /// Requested limit.
    pub limit: u32,
}

#[derive(Debug)]
struct StoredDocument {
    id: i64,
    access_hash: i64,
    file_reference: Bytes,
    mime_type: Option<String>,
    declared_size: Option<u64>,
    data: Bytes,
}

#[derive(Debug, Default)]
struct Channel {
    forbidden: bool,
    joined: bool,
    /// `None` marks a message without a document.
    messages: HashMap<i64, Option<i64>>,
}

#[derive(Debug, Default)]
struct State {
    user_session: bool,
    service_token: Option<String>,
    service_signed_in: bool,
    channels: HashMap<String, Channel>,
    documents: HashMap<i64, StoredDocument>,
    faults: HashMap<UpstreamOp, VecDeque<Fault>>,
    chunk_calls: Vec<ChunkCall>,
    joins: Vec<String>,
    next_id: i64,
}

/// In-memory implementation of [`UpstreamTransport`].
#[derive(Debug, Default)]
pub struct MemoryUpstream {
    state: Mutex<State>,
    connected: AtomicBool,
    connects: AtomicUsize,
}

impl MemoryUpstream {
    /// A platform where a persisted user session is already authorized.
    #[must_use]
    pub fn with_user_session() -> Self {
        let upstream = Self::default();
        upstream.state.lock().user_session = true;
        upstream
    }

    /// A platform with no user session that accepts `token` for service sign-in.
    #[must_use]
    pub fn with_service_token(token: impl Into<String>) -> Self {
        let upstream = Self::default();
        upstream.state.lock().service_token = Some(token.into());
        upstream
    }

    /// A platform that accepts no credentials at all.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::default()
    }

    /// Attach `data` as a document to message `seq` of `channel`, creating
    /// the channel when needed. Returns the document id.
    pub fn add_document(
        &self,
        channel: &str,
        seq: i64,
        data: impl Into<Bytes>,
        mime_type: Option<&str>,
    ) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = 1000 + state.next_id;
        state.documents.insert(
            id,
            StoredDocument {
                id,
                access_hash: id.wrapping_mul(7919),
                file_reference: Bytes::from(format!("ref-{id}-0")),
                mime_type: mime_type.map(ToOwned::to_owned),
                declared_size: None,
                data: data.into(),
            },
        );
        state
            .channels
            .entry(channel.to_owned())
            .or_default()
            .messages
            .insert(seq, Some(id));
        id
    }

    /// Add a message that carries no document.
    pub fn add_plain_message(&self, channel: &str, seq: i64) {
        self.state
            .lock()
            .channels
            .entry(channel.to_owned())
            .or_default()
            .messages
            .insert(seq, None);
    }

    /// Make `channel` refuse joins and document lookups.
    pub fn forbid_channel(&self, channel: &str) {
        self.state
            .lock()
            .channels
            .entry(channel.to_owned())
            .or_default()
            .forbidden = true;
    }

    /// Report `size` for the document instead of its real length.
    pub fn override_declared_size(&self, document_id: i64, size: u64) {
        if let Some(doc) = self.state.lock().documents.get_mut(&document_id) {
            doc.declared_size = Some(size);
        }
    }

    /// Rotate the file reference, invalidating handles resolved earlier.
    pub fn expire_file_reference(&self, document_id: i64) {
        if let Some(doc) = self.state.lock().documents.get_mut(&document_id) {
            let generation = doc.file_reference.len();
            doc.file_reference = Bytes::from(format!("ref-{}-{generation}", doc.id));
        }
    }

    /// Queue a fault for the next call of `op`.
    pub fn inject_fault(&self, op: UpstreamOp, fault: Fault) {
        self.state
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    /// All chunk requests received so far, in order.
    #[must_use]
    pub fn chunk_calls(&self) -> Vec<ChunkCall> {
        self.state.lock().chunk_calls.clone()
    }

    /// Channels joined so far, in order (repeats included).
    #[must_use]
    pub fn joins(&self) -> Vec<String> {
        self.state.lock().joins.clone()
    }

    /// Number of successful `connect` calls.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn take_fault(&self, op: UpstreamOp) -> Option<UpstreamError> {
        let fault = self.state.lock().faults.get_mut(&op)?.pop_front()?;
        Some(fault.into_error(&self.connected))
    }

    fn require_connected(&self) -> Result<(), UpstreamError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(UpstreamError::network("not connected"))
        }
    }
}

#[async_trait]
impl UpstreamTransport for MemoryUpstream {
    async fn connect(&self) -> Result<(), UpstreamError> {
        self.connected.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool, UpstreamError> {
        self.require_connected()?;
        let state = self.state.lock();
        Ok(state.user_session || state.service_signed_in)
    }

    async fn sign_in_service(&self, token: &str) -> Result<(), UpstreamError> {
        self.require_connected()?;
        let mut state = self.state.lock();
        if state.service_token.as_deref() == Some(token) {
            state.service_signed_in = true;
            Ok(())
        } else {
            Err(UpstreamError::rpc("ACCESS_TOKEN_INVALID", "unknown service token"))
        }
    }

    async fn whoami(&self) -> Result<Principal, UpstreamError> {
        self.require_connected()?;
        let state = self.state.lock();
        match (state.user_session, state.service_signed_in) {
            (true, _) => Ok(Principal {
                id: 1,
                is_service: false,
            }),
            (false, true) => Ok(Principal {
                id: 2,
                is_service: true,
            }),
            (false, false) => Err(UpstreamError::Unauthorized),
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn get_document(
        &self,
        channel: &str,
        seq: i64,
    ) -> Result<Option<RemoteDocument>, UpstreamError> {
        self.require_connected()?;
        if let Some(err) = self.take_fault(UpstreamOp::GetDocument) {
            return Err(err);
        }

        let state = self.state.lock();
        let chan = state
            .channels
            .get(channel)
            .ok_or_else(|| UpstreamError::NotFound(format!("channel {channel}")))?;
        if chan.forbidden {
            return Err(UpstreamError::Forbidden(format!("channel {channel}")));
        }
        let Some(entry) = chan.messages.get(&seq) else {
            return Ok(None);
        };
        let Some(doc) = entry.and_then(|id| state.documents.get(&id)) else {
            return Ok(None);
        };

        Ok(Some(RemoteDocument {
            id: doc.id,
            access_hash: doc.access_hash,
            file_reference: doc.file_reference.clone(),
            size: doc.declared_size.unwrap_or(doc.data.len() as u64),
            mime_type: doc.mime_type.clone(),
        }))
    }

    async fn join_channel(&self, channel: &str) -> Result<(), UpstreamError> {
        self.require_connected()?;
        if let Some(err) = self.take_fault(UpstreamOp::JoinChannel) {
            return Err(err);
        }

        let mut state = self.state.lock();
        state.joins.push(channel.to_owned());
        let chan = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| UpstreamError::NotFound(format!("channel {channel}")))?;
        if chan.forbidden {
            return Err(UpstreamError::Forbidden(format!("channel {channel}")));
        }
        chan.joined = true;
        Ok(())
    }

    async fn get_file_chunk(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, UpstreamError> {
        self.require_connected()?;
        self.state.lock().chunk_calls.push(ChunkCall {
            document_id: location.id,
            offset,
            limit,
        });
        if let Some(err) = self.take_fault(UpstreamOp::GetFileChunk) {
            return Err(err);
        }

        let state = self.state.lock();
        let doc = state
            .documents
            .get(&location.id)
            .filter(|doc| doc.access_hash == location.access_hash)
            .ok_or_else(|| UpstreamError::rpc("FILE_ID_INVALID", "unknown document"))?;
        if doc.file_reference != location.file_reference {
            return Err(UpstreamError::rpc(
                "FILE_REFERENCE_EXPIRED",
                "file reference has expired",
            ));
        }

        let len = doc.data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let limit = u64::from(limit.min(MAX_CHUNK_LIMIT));
        let end = (offset + limit).min(len);
        #[allow(clippy::cast_possible_truncation)]
        Ok(doc.data.slice(offset as usize..end as usize))
    }
}
