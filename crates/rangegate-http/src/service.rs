//! The gateway HTTP service implementing hyper's `Service` trait.
//!
//! [`GatewayHttpService`] handles, in order:
//!
//! 1. Health check interception (`GET /health`, `GET /_health`)
//! 2. Prometheus scrape (`GET /metrics`)
//! 3. Routing via [`GatewayRouter`]
//! 4. Range-aware streaming via [`StreamGateway`]
//! 5. Common response headers (`x-request-id`, `Server`)
//! 6. Error response formatting
//!
//! Request bodies are never read.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::header::HeaderValue;
use hyper::body::Incoming;
use hyper::service::Service;
use rangegate_core::{
    ChunkFetcher, DocumentResolver, GatewayConfig, GatewayError, GatewayMetrics, GatewayResult,
    MetadataStore, SessionManager, UpstreamTransport, UsageLog,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::body::GatewayBody;
use crate::handler::StreamGateway;
use crate::response::{error_to_response, json_response};
use crate::router::GatewayRouter;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Value of the `Server` header.
const SERVER_NAME: &str = "RangeGate";

/// The gateway service handed to hyper's connection builder.
#[derive(Debug, Clone)]
pub struct GatewayHttpService {
    gateway: Arc<StreamGateway>,
    session: Arc<SessionManager>,
    router: GatewayRouter,
}

impl GatewayHttpService {
    /// Create a service over a gateway and the session it reads from.
    #[must_use]
    pub fn new(gateway: StreamGateway, session: Arc<SessionManager>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            session,
            router: GatewayRouter,
        }
    }

    /// Wire the full pipeline for `config` over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unexpected`] when the metrics registry cannot
    /// be built.
    pub fn from_config(
        config: &GatewayConfig,
        transport: Arc<dyn UpstreamTransport>,
        catalog: Arc<dyn MetadataStore>,
        usage: Arc<dyn UsageLog>,
    ) -> GatewayResult<Self> {
        let metrics = GatewayMetrics::new()
            .map_err(|e| GatewayError::Unexpected(format!("metrics registry: {e}")))?;
        let session = Arc::new(SessionManager::new(
            transport,
            config.upstream_service_token.clone(),
        ));
        let retry = config.retry_policy();
        let resolver =
            DocumentResolver::new(Arc::clone(&session), catalog, retry.clone(), metrics.clone());
        let fetcher = ChunkFetcher::new(Arc::clone(&session), retry, metrics.clone());
        let gateway = StreamGateway::new(
            resolver,
            fetcher,
            metrics,
            usage,
            config.allow_debug_headers,
        );
        Ok(Self::new(gateway, session))
    }

    /// The upstream session shared by every request.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Run one request through the pipeline.
    ///
    /// Generic over the request body so it can be driven without a socket.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<GatewayBody> {
        let request_id = Uuid::new_v4().to_string();
        let (parts, _) = req.into_parts();
        let response =
            process_request(&parts, &self.gateway, &self.session, self.router, &request_id).await;
        add_common_headers(response, &request_id)
    }
}

impl Service<http::Request<Incoming>> for GatewayHttpService {
    type Response = http::Response<GatewayBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

async fn process_request(
    req: &http::request::Parts,
    gateway: &StreamGateway,
    session: &SessionManager,
    router: GatewayRouter,
    request_id: &str,
) -> http::Response<GatewayBody> {
    let method = &req.method;
    let uri = &req.uri;
    debug!(%method, %uri, request_id, "processing request");

    if is_health_check(method, uri.path()) {
        return health_check_response(session);
    }
    if is_metrics_endpoint(method, uri.path()) {
        return metrics_response(gateway);
    }

    let ctx = match router.resolve(method, uri) {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%method, %uri, error = %err, request_id, "failed to route request");
            return error_to_response(&err);
        }
    };
    info!(route = %ctx.route, head = ctx.head_only, request_id, "routed request");

    match gateway.serve(&ctx, &req.headers, request_id).await {
        Ok(response) => response,
        Err(err) => {
            if err.status_code().is_server_error() {
                warn!(route = %ctx.route, error = %err, request_id, "request failed");
            } else {
                debug!(route = %ctx.route, error = %err, request_id, "request rejected");
            }
            error_to_response(&err)
        }
    }
}

fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && (path == "/health" || path == "/_health")
}

fn health_check_response(session: &SessionManager) -> http::Response<GatewayBody> {
    json_response(
        http::StatusCode::OK,
        &serde_json::json!({
            "status": "running",
            "service": "rangegate",
            "session": session.state().as_str(),
        }),
    )
}

fn is_metrics_endpoint(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && path == "/metrics"
}

fn metrics_response(gateway: &StreamGateway) -> http::Response<GatewayBody> {
    match gateway.metrics().encode() {
        Ok(text) => {
            let mut response = http::Response::new(GatewayBody::from_string(text));
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            response
        }
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            json_response(
                http::StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"code": "InternalError", "message": "metrics unavailable"}),
            )
        }
    }
}

fn add_common_headers(
    mut response: http::Response<GatewayBody>,
    request_id: &str,
) -> http::Response<GatewayBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, hv);
    }
    headers.insert(http::header::SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use rangegate_core::TracingUsageLog;
    use rangegate_core::metadata::JsonCatalog;
    use rangegate_core::upstream::memory::MemoryUpstream;

    use super::*;

    fn service() -> GatewayHttpService {
        let upstream = Arc::new(MemoryUpstream::with_user_session());
        upstream.add_document("radio", 7, vec![9u8; 5000], Some("audio/ogg"));

        let config = GatewayConfig::builder()
            .upstream_session("session".to_owned())
            .retry_base_delay_ms(1)
            .build();
        GatewayHttpService::from_config(
            &config,
            upstream,
            Arc::new(JsonCatalog::default()),
            Arc::new(TracingUsageLog),
        )
        .expect("service")
    }

    fn request(method: http::Method, uri: &str) -> http::Request<()> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .expect("valid request")
    }

    #[test]
    fn test_should_detect_health_check_paths() {
        assert!(is_health_check(&http::Method::GET, "/health"));
        assert!(is_health_check(&http::Method::GET, "/_health"));
        assert!(!is_health_check(&http::Method::POST, "/health"));
        assert!(!is_health_check(&http::Method::GET, "/stream/x"));
    }

    #[test]
    fn test_should_add_common_headers() {
        let resp = add_common_headers(http::Response::new(GatewayBody::empty()), "req-1");
        assert_eq!(
            resp.headers().get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()),
            Some("req-1")
        );
        assert_eq!(
            resp.headers().get("Server").and_then(|v| v.to_str().ok()),
            Some(SERVER_NAME)
        );
    }

    #[tokio::test]
    async fn test_should_report_session_state_on_health() {
        let svc = service();
        let resp = svc.handle(request(http::Method::GET, "/health")).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["status"], "running");
        assert_eq!(json["session"], "uninitialized");
    }

    #[tokio::test]
    async fn test_should_stream_message_document() {
        let svc = service();
        let mut req = request(http::Method::GET, "/stream/by-msg/7?chat=radio");
        req.headers_mut()
            .insert(http::header::RANGE, HeaderValue::from_static("bytes=-100"));

        let resp = svc.handle(req).await;
        assert_eq!(resp.status(), http::StatusCode::PARTIAL_CONTENT);
        assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(
            resp.headers()
                .get(http::header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok()),
            Some("bytes 4900-4999/5000")
        );
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        assert_eq!(bytes.len(), 100);
    }

    #[tokio::test]
    async fn test_should_render_routing_errors_as_json() {
        let svc = service();
        let resp = svc.handle(request(http::Method::POST, "/stream/abc")).await;
        assert_eq!(resp.status(), http::StatusCode::METHOD_NOT_ALLOWED);

        let resp = svc.handle(request(http::Method::GET, "/nowhere")).await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
        assert!(resp.headers().contains_key("Server"));
    }

    #[tokio::test]
    async fn test_should_return_not_found_for_missing_message() {
        let svc = service();
        let resp = svc
            .handle(request(http::Method::GET, "/stream/by-msg/8?chat=radio"))
            .await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_serve_metrics_after_streaming() {
        let svc = service();
        let resp = svc
            .handle(request(http::Method::GET, "/stream/by-msg/7?chat=radio"))
            .await;
        let _ = resp.into_body().collect().await.expect("body");

        let resp = svc.handle(request(http::Method::GET, "/metrics")).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(text.contains("5000"));
    }
}
