//! Prometheus metrics for the gateway.
//!
//! [`GatewayMetrics`] owns its own [`Registry`] so that several gateways (for
//! example in tests) can live in one process without clashing. The HTTP layer
//! exposes [`GatewayMetrics::encode`] on `GET /metrics`.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters describing streaming activity and upstream health.
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    stream_starts: IntCounterVec,
    download_starts: IntCounterVec,
    bytes_streamed: IntCounter,
    upstream_rate_limits: IntCounterVec,
    upstream_rpc_errors: IntCounterVec,
}

impl GatewayMetrics {
    /// Create and register all gateway metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let stream_starts = IntCounterVec::new(
            Opts::new(
                "rangegate_stream_start_total",
                "Streams started, by partial flag and MIME type",
            ),
            &["partial", "mime"],
        )?;
        let download_starts = IntCounterVec::new(
            Opts::new(
                "rangegate_download_start_total",
                "Downloads started, by MIME type",
            ),
            &["mime"],
        )?;
        let bytes_streamed = IntCounter::new(
            "rangegate_stream_bytes_total",
            "Bytes delivered to HTTP clients",
        )?;
        let upstream_rate_limits = IntCounterVec::new(
            Opts::new(
                "rangegate_upstream_rate_limits_total",
                "Rate-limit answers received from upstream, by RPC",
            ),
            &["op"],
        )?;
        let upstream_rpc_errors = IntCounterVec::new(
            Opts::new(
                "rangegate_upstream_rpc_errors_total",
                "Transient upstream RPC or network failures, by RPC",
            ),
            &["op"],
        )?;

        registry.register(Box::new(stream_starts.clone()))?;
        registry.register(Box::new(download_starts.clone()))?;
        registry.register(Box::new(bytes_streamed.clone()))?;
        registry.register(Box::new(upstream_rate_limits.clone()))?;
        registry.register(Box::new(upstream_rpc_errors.clone()))?;

        Ok(Self {
            registry,
            stream_starts,
            download_starts,
            bytes_streamed,
            upstream_rate_limits,
            upstream_rpc_errors,
        })
    }

    /// Record the start of an inline stream.
    pub fn stream_started(&self, partial: bool, mime: &str) {
        self.stream_starts
            .with_label_values(&[if partial { "true" } else { "false" }, mime])
            .inc();
    }

    /// Record the start of a download.
    pub fn download_started(&self, mime: &str) {
        self.download_starts.with_label_values(&[mime]).inc();
    }

    /// Add delivered body bytes.
    pub fn add_bytes_streamed(&self, bytes: u64) {
        self.bytes_streamed.inc_by(bytes);
    }

    /// Record an upstream rate-limit answer for `op`.
    pub fn upstream_rate_limited(&self, op: &str) {
        self.upstream_rate_limits.with_label_values(&[op]).inc();
    }

    /// Record a transient upstream failure for `op`.
    pub fn upstream_rpc_error(&self, op: &str) {
        self.upstream_rpc_errors.with_label_values(&[op]).inc();
    }

    /// Total bytes delivered so far.
    #[must_use]
    pub fn bytes_streamed(&self) -> u64 {
        self.bytes_streamed.get()
    }

    /// Rate-limit answers seen for `op` so far.
    #[must_use]
    pub fn rate_limits_for(&self, op: &str) -> u64 {
        self.upstream_rate_limits.with_label_values(&[op]).get()
    }

    /// Transient failures seen for `op` so far.
    #[must_use]
    pub fn rpc_errors_for(&self, op: &str) -> u64 {
        self.upstream_rpc_errors.with_label_values(&[op]).get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
