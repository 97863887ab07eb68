//! Local directory transport.
//!
//! [`DirectoryUpstream`] serves `<root>/<channel>/<seq>.<ext>` files as
//! channel documents, so the gateway can run without a remote platform. A
//! channel directory containing a `.forbidden` marker file refuses access.
//!
//! The user identity is available when the configured session file exists and
//! is non-empty; any non-empty service token signs in as the service identity.
//! File references are derived from the file's modification time, so editing
//! a file invalidates handles resolved before the edit.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::{
    FileLocation, MAX_CHUNK_LIMIT, Principal, RemoteDocument, UpstreamError, UpstreamTransport,
};

const FORBIDDEN_MARKER: &str = ".forbidden";
const ACCESS_SALT: i64 = 0x5f3c_a11e;

/// Serves documents from a local directory tree.
#[derive(Debug)]
pub struct DirectoryUpstream {
    root: PathBuf,
    session_file: Option<PathBuf>,
    service_signed_in: AtomicBool,
    connected: AtomicBool,
    ids: DashMap<PathBuf, i64>,
    paths: DashMap<i64, PathBuf>,
    next_id: AtomicI64,
}

impl DirectoryUpstream {
    /// Serve files below `root`, treating `session_file` as the persisted user
    /// session.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, session_file: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            session_file,
            service_signed_in: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            ids: DashMap::new(),
            paths: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn require_connected(&self) -> Result<(), UpstreamError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(UpstreamError::network("not connected"))
        }
    }

    async fn user_session_valid(&self) -> bool {
        match &self.session_file {
            Some(path) => tokio::fs::metadata(path)
                .await
                .is_ok_and(|meta| meta.is_file() && meta.len() > 0),
            None => false,
        }
    }

    async fn channel_dir(&self, channel: &str) -> Result<PathBuf, UpstreamError> {
        if channel.is_empty()
            || channel.starts_with('.')
            || channel.contains(['/', '\\'])
            || channel.contains("..")
        {
            return Err(UpstreamError::NotFound(format!("channel {channel}")));
        }
        let dir = self.root.join(channel);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(UpstreamError::NotFound(format!("channel {channel}"))),
        }
        if tokio::fs::try_exists(dir.join(FORBIDDEN_MARKER))
            .await
            .unwrap_or(false)
        {
            return Err(UpstreamError::Forbidden(format!("channel {channel}")));
        }
        Ok(dir)
    }

    async fn find_message(dir: &Path, seq: i64) -> Result<Option<PathBuf>, UpstreamError> {
        let wanted = seq.to_string();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let stem_matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem == wanted);
            if stem_matches && entry.file_type().await?.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    fn document_id(&self, path: &Path) -> i64 {
        if let Some(id) = self.ids.get(path) {
            return *id;
        }
        let id = *self
            .ids
            .entry(path.to_path_buf())
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::SeqCst));
        self.paths.entry(id).or_insert_with(|| path.to_path_buf());
        id
    }

    async fn file_reference(path: &Path) -> Result<(Bytes, u64), UpstreamError> {
        let meta = tokio::fs::metadata(path).await?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        Ok((Bytes::from(modified.to_be_bytes().to_vec()), meta.len()))
    }
}

/// Guess a MIME type from a file extension.
#[must_use]
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => return None,
    };
    Some(mime)
}

#[async_trait]
impl UpstreamTransport for DirectoryUpstream {
    async fn connect(&self) -> Result<(), UpstreamError> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(UpstreamError::network(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!(root = %self.root.display(), "directory upstream connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool, UpstreamError> {
        self.require_connected()?;
        Ok(self.user_session_valid().await || self.service_signed_in.load(Ordering::SeqCst))
    }

    async fn sign_in_service(&self, token: &str) -> Result<(), UpstreamError> {
        self.require_connected()?;
        if token.trim().is_empty() {
            return Err(UpstreamError::rpc("ACCESS_TOKEN_INVALID", "empty service token"));
        }
        self.service_signed_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn whoami(&self) -> Result<Principal, UpstreamError> {
        self.require_connected()?;
        if self.user_session_valid().await {
            Ok(Principal {
                id: 1,
                is_service: false,
            })
        } else if self.service_signed_in.load(Ordering::SeqCst) {
            Ok(Principal {
                id: 2,
                is_service: true,
            })
        } else {
            Err(UpstreamError::Unauthorized)
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
        let dir = self.channel_dir(channel).await?;
        let Some(path) = Self::find_message(&dir, seq).await? else {
            return Ok(None);
        };

        let id = self.document_id(&path);
        let (file_reference, size) = Self::file_reference(&path).await?;
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .map(ToOwned::to_owned);

        Ok(Some(RemoteDocument {
            id,
            access_hash: id ^ ACCESS_SALT,
            file_reference,
            size,
            mime_type,
        }))
    }

    async fn join_channel(&self, channel: &str) -> Result<(), UpstreamError> {
        self.require_connected()?;
        self.channel_dir(channel).await.map(|_| ())
    }

    async fn get_file_chunk(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, UpstreamError> {
        self.require_connected()?;
        let path = self
            .paths
            .get(&location.id)
            .filter(|_| location.access_hash == location.id ^ ACCESS_SALT)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| UpstreamError::rpc("FILE_ID_INVALID", "unknown document"))?;

        let (current, size) = Self::file_reference(&path).await?;
        if current != location.file_reference {
            return Err(UpstreamError::rpc(
                "FILE_REFERENCE_EXPIRED",
                "file changed since it was resolved",
            ));
        }
        if offset >= size {
            return Ok(Bytes::new());
        }

        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let limit = u64::from(limit.min(MAX_CHUNK_LIMIT));
        #[allow(clippy::cast_possible_truncation)]
        let mut buf = Vec::with_capacity(limit.min(size - offset) as usize);
        file.take(limit).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
