//! Core data plane for RangeGate, the range-aware streaming gateway.
//!
//! This crate turns a logical file reference into an exact, lazily produced
//! byte stream backed by a remote chunked-file RPC API. It provides:
//!
//! - **Session** ([`session`]): the process-wide upstream session, connected
//!   and authorized once, reconnected on demand.
//! - **Resolution** ([`resolver`]): logical file reference to remote document
//!   handle, with retry and access checks.
//! - **Range math** ([`range`]): HTTP `Range` header to inclusive byte range.
//! - **Fetching** ([`fetch`]): aligned chunk requests trimmed into the exact
//!   requested bytes, retried per chunk.
//! - **Guarding** ([`guard`]): an independent byte budget in front of the body.
//!
//! # Architecture
//!
//! ```text
//! LogicalFileRef
//!   -> DocumentResolver (MetadataStore + SessionManager)
//!     -> compute_range (Range header, declared size)
//!       -> ChunkFetcher (UpstreamTransport::get_file_chunk, RetryPolicy)
//!         -> RangeGuard
//!           -> HTTP body
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod filename;
pub mod guard;
pub mod metadata;
pub mod metrics;
pub mod range;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod upstream;
pub mod usage;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use fetch::{ByteStream, CHUNK_SIZE, ChunkFetcher};
pub use guard::RangeGuard;
pub use metadata::{FileRecord, JsonCatalog, MetadataError, MetadataStore};
pub use metrics::GatewayMetrics;
pub use range::{ByteRange, RangeError, RangeRequest, compute_range};
pub use resolver::{DocumentResolver, LogicalFileRef, RemoteDocumentHandle, ResolvedFile};
pub use retry::RetryPolicy;
pub use session::{Identity, SessionHandle, SessionManager, SessionState};
pub use upstream::{UpstreamError, UpstreamTransport};
pub use usage::{MemoryUsageLog, TracingUsageLog, UsageLog};
