//! Fire-and-forget play logging.
//!
//! The gateway reports "caller X started file Y" to a [`UsageLog`] on a
//! detached task. Failures are logged and never affect the response.

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

/// Sink for play events.
#[async_trait]
pub trait UsageLog: Send + Sync + 'static {
    /// Record that `caller_id` started playing `file_id`.
    async fn record_play(&self, caller_id: i64, file_id: Uuid) -> Result<(), String>;
}

/// Records plays as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUsageLog;

#[async_trait]
impl UsageLog for TracingUsageLog {
    async fn record_play(&self, caller_id: i64, file_id: Uuid) -> Result<(), String> {
        tracing::info!(target: "rangegate::usage", caller_id, %file_id, "play");
        Ok(())
    }
}

/// Keeps plays in memory; useful for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryUsageLog {
    plays: Mutex<Vec<(i64, Uuid)>>,
}

impl MemoryUsageLog {
    /// All plays recorded so far, in order.
    #[must_use]
    pub fn plays(&self) -> Vec<(i64, Uuid)> {
        self.plays.lock().clone()
    }
}

#[async_trait]
impl UsageLog for MemoryUsageLog {
    async fn record_play(&self, caller_id: i64, file_id: Uuid) -> Result<(), String> {
        self.plays.lock().push((caller_id, file_id));
        Ok(())
    }
}
