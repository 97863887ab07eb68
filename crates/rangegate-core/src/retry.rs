//! Bounded retry for upstream RPCs.
//!
//! Every upstream failure is classified into a [`RetryDecision`]:
//!
//! - `RateLimited(wait)`: sleep exactly `wait`, then try again. Rate limits do
//!   not grow the backoff.
//! - `Transient`: RPC or network failure. Re-establish the connection if it
//!   dropped, back off `base * 2^(n-1)` for the n-th transient failure, retry.
//! - `Fatal`: not found, forbidden, unauthorized. Returned immediately.
//!
//! Both retryable kinds consume attempts. No sleep follows the last attempt;
//! the last error is returned as-is.

use std::future::Future;
use std::io;
use std::time::Duration;

use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use crate::metrics::GatewayMetrics;
use crate::session::SessionManager;
use crate::upstream::UpstreamError;

/// How a failed upstream call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then retry.
    RateLimited(Duration),
    /// Back off and retry.
    Transient,
    /// Give up immediately.
    Fatal,
}

/// Retry limits and delays shared by the resolver and the fetch engine.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RetryPolicy {
    /// Attempts per operation, including the first.
    #[builder(default = 3)]
    pub max_attempts: u32,

    /// Backoff after the first transient failure; doubles afterwards.
    #[builder(default = Duration::from_millis(500))]
    pub base_delay: Duration,

    /// Wait used for rate limits that carry no duration.
    #[builder(default = Duration::from_secs(3))]
    pub default_rate_limit_wait: Duration,

    /// Per-call timeout; a timed-out call counts as a transient failure.
    #[builder(default)]
    pub rpc_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Classify an upstream error.
    #[must_use]
    pub fn classify(&self, err: &UpstreamError) -> RetryDecision {
        match err {
            UpstreamError::RateLimited { wait } => {
                RetryDecision::RateLimited(wait.unwrap_or(self.default_rate_limit_wait))
            }
            UpstreamError::Rpc { .. } | UpstreamError::Network(_) => RetryDecision::Transient,
            UpstreamError::NotFound(_)
            | UpstreamError::Forbidden(_)
            | UpstreamError::Unauthorized => RetryDecision::Fatal,
        }
    }

    /// Backoff after the `failures`-th transient failure (1-based).
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `call` until it succeeds, fails fatally, or the attempts run out.
    ///
    /// `op` labels metrics and log events. Between transient failures the
    /// session is asked to reconnect if the transport dropped.
    ///
    /// # Errors
    ///
    /// Returns the fatal error, or the last error once attempts are exhausted.
    pub async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        session: &SessionManager,
        metrics: &GatewayMetrics,
        mut call: F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut transient_failures = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match self.rpc_timeout {
                Some(limit) => tokio::time::timeout(limit, call())
                    .await
                    .unwrap_or_else(|_| {
                        Err(UpstreamError::Network(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("{op} timed out after {limit:?}"),
                        )))
                    }),
                None => call().await,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.classify(&err) {
                RetryDecision::Fatal => return Err(err),
                RetryDecision::RateLimited(wait) => {
                    metrics.upstream_rate_limited(op);
                    if attempt >= attempts {
                        return Err(err);
                    }
                    warn!(op, attempt, wait_secs = wait.as_secs_f64(), "upstream rate limit, waiting");
                    tokio::time::sleep(wait).await;
                }
                RetryDecision::Transient => {
                    metrics.upstream_rpc_error(op);
                    transient_failures += 1;
                    if attempt >= attempts {
                        return Err(err);
                    }
                    let delay = self.backoff(transient_failures);
                    warn!(op, attempt, error = %err, delay_ms = delay.as_millis() as u64, "upstream call failed, retrying");
                    if let Err(reconnect_err) = session.reconnect().await {
                        debug!(op, error = %reconnect_err, "reconnect before retry failed");
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
