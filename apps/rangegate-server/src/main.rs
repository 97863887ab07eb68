//! RangeGate Server - range-aware HTTP streaming gateway.
//!
//! Serves documents stored on a chunked-file platform as seekable HTTP
//! resources. This binary wires the gateway over a [`DirectoryUpstream`]
//! rooted at `UPSTREAM_ROOT`.
//!
//! # Usage
//!
//! ```text
//! UPSTREAM_SERVICE_TOKEN=dev GATEWAY_LISTEN=0.0.0.0:8080 rangegate-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:8080` | Bind address |
//! | `UPSTREAM_ROOT` | `./media` | Directory served as channels |
//! | `UPSTREAM_SESSION` | *(unset)* | Persisted user session file |
//! | `UPSTREAM_SERVICE_TOKEN` | *(unset)* | Service sign-in token |
//! | `CATALOG_PATH` | *(unset)* | JSON file catalog |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use rangegate_core::upstream::directory::DirectoryUpstream;
use rangegate_core::{GatewayConfig, GatewayError, JsonCatalog, MetadataStore, TracingUsageLog};
use rangegate_http::GatewayHttpService;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Load the file catalog, or an empty one when no path is configured.
async fn load_catalog(config: &GatewayConfig) -> Result<Arc<dyn MetadataStore>> {
    let Some(path) = &config.catalog_path else {
        info!("no catalog configured, only message references will resolve");
        return Ok(Arc::new(JsonCatalog::default()));
    };
    let catalog = JsonCatalog::load(path)
        .await
        .with_context(|| format!("failed to load catalog from {path}"))?;
    Ok(Arc::new(catalog))
}

/// Connect and authorize the upstream session before accepting traffic.
///
/// Missing credentials are fatal; transient failures are retried lazily by
/// the first request.
async fn warm_up(service: &GatewayHttpService) -> Result<()> {
    match service.session().ensure_ready().await {
        Ok(handle) => {
            info!(identity = ?handle.identity(), "upstream session ready");
            Ok(())
        }
        Err(err @ GatewayError::Configuration(_)) => {
            Err(err).context("upstream session cannot be authorized")
        }
        Err(err) => {
            warn!(error = %err, "upstream not reachable yet, will retry on demand");
            Ok(())
        }
    }
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: GatewayHttpService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    service.session().shutdown().await;
    info!("all connections drained, upstream session closed");

    Ok(())
}

/// Request the health endpoint of a running gateway.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|a| a == "--health-check") {
        let config = GatewayConfig::from_env();
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = GatewayConfig::from_env();

    init_tracing(&config.log_level)?;
    config.validate().context("invalid configuration")?;

    info!(
        gateway_listen = %config.gateway_listen,
        upstream_root = %config.upstream_root,
        catalog = ?config.catalog_path,
        retry_attempts = config.retry_attempts,
        version = VERSION,
        "starting RangeGate",
    );

    let transport = Arc::new(DirectoryUpstream::new(
        &config.upstream_root,
        config.upstream_session.as_ref().map(PathBuf::from),
    ));
    let catalog = load_catalog(&config).await?;
    let service =
        GatewayHttpService::from_config(&config, transport, catalog, Arc::new(TracingUsageLog))
            .context("failed to build gateway")?;

    warm_up(&service).await?;

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_use_empty_catalog_without_path() {
        let config = GatewayConfig::default();
        assert!(load_catalog(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_should_fail_on_missing_catalog_file() {
        let config = GatewayConfig::builder()
            .catalog_path("/nonexistent/rangegate/catalog.json".to_owned())
            .build();
        assert!(load_catalog(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_should_fail_warm_up_without_credentials() {
        let config = GatewayConfig::default();
        let transport = Arc::new(DirectoryUpstream::new(std::env::temp_dir(), None));
        let service = GatewayHttpService::from_config(
            &config,
            transport,
            Arc::new(JsonCatalog::default()),
            Arc::new(TracingUsageLog),
        )
        .expect("service");
        assert!(warm_up(&service).await.is_err());
    }
}
