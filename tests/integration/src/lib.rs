//! End-to-end tests for the RangeGate HTTP gateway.
//!
//! Each test boots the real hyper service on `127.0.0.1:0` in front of an
//! in-process [`MemoryUpstream`] and drives it with `reqwest`, so the full
//! path from socket to upstream chunk call is exercised without a remote
//! platform.

use std::net::SocketAddr;
use std::sync::{Arc, Once};

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use rangegate_core::metadata::{FileRecord, JsonCatalog};
use rangegate_core::upstream::memory::MemoryUpstream;
use rangegate_core::{GatewayConfig, MemoryUsageLog};
use rangegate_http::GatewayHttpService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Size of the reference file used by most tests.
pub const FILE_SIZE: usize = 2_000_000;

/// Service token the gateway is configured with.
pub const SERVICE_TOKEN: &str = "svc-token";

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Deterministic file content with a period that does not divide the chunk size.
#[must_use]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A running gateway plus handles to its fakes.
#[derive(Debug)]
pub struct TestGateway {
    /// Bound address.
    pub addr: SocketAddr,
    /// The emulated platform behind the gateway.
    pub upstream: Arc<MemoryUpstream>,
    /// Plays recorded by the gateway.
    pub usage: Arc<MemoryUsageLog>,
    /// Catalog id of the reference file (`music/42`, `audio/mpeg`).
    pub file_id: Uuid,
    /// Bytes of the reference file.
    pub data: Vec<u8>,
    client: reqwest::Client,
    server: JoinHandle<()>,
}

impl TestGateway {
    /// Start a gateway with the reference file and default settings.
    pub async fn start() -> Self {
        Self::start_with(MemoryUpstream::with_user_session(), false).await
    }

    /// Start a gateway over `upstream`, seeding the reference file into it.
    pub async fn start_with(upstream: MemoryUpstream, allow_debug_headers: bool) -> Self {
        init_tracing();

        let upstream = Arc::new(upstream);
        let data = pattern(FILE_SIZE);
        upstream.add_document("music", 42, data.clone(), Some("audio/mpeg"));

        let file_id = Uuid::new_v4();
        let catalog = JsonCatalog::from_records([FileRecord {
            id: file_id,
            channel: "@Music".to_owned(),
            sequence: 42,
            title: Some("Night Drive".to_owned()),
            contributors: vec!["Alpha".to_owned(), "Beta".to_owned()],
            mime: None,
            declared_size: 0,
        }]);

        let config = GatewayConfig::builder()
            .upstream_session("session".to_owned())
            .upstream_service_token(SERVICE_TOKEN.to_owned())
            .retry_base_delay_ms(1)
            .rate_limit_default_wait_secs(0)
            .allow_debug_headers(allow_debug_headers)
            .build();
        let usage = Arc::new(MemoryUsageLog::default());
        let service = GatewayHttpService::from_config(
            &config,
            upstream.clone(),
            Arc::new(catalog),
            usage.clone(),
        )
        .expect("service");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let http = HttpConnBuilder::new(TokioExecutor::new());
            while let Ok((stream, _)) = listener.accept().await {
                let conn = http
                    .serve_connection(TokioIo::new(stream), service.clone())
                    .into_owned();
                tokio::spawn(async move {
                    let _ = conn.await;
                });
            }
        });

        Self {
            addr,
            upstream,
            usage,
            file_id,
            data,
            client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .expect("client"),
            server,
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// `/stream/{file_id}` for the reference file.
    #[must_use]
    pub fn stream_path(&self) -> String {
        format!("/stream/{}", self.file_id)
    }

    /// GET `path`, optionally with a `Range` header.
    pub async fn get(&self, path: &str, range: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(range) = range {
            req = req.header("Range", range);
        }
        req.send().await.expect("request")
    }

    /// HEAD `path`.
    pub async fn head(&self, path: &str) -> reqwest::Response {
        self.client
            .head(self.url(path))
            .send()
            .await
            .expect("request")
    }

    /// The shared HTTP client.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Header value as a string, if present.
#[must_use]
pub fn header<'a>(resp: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

mod test_access;
mod test_download;
mod test_fetch;
mod test_range;
