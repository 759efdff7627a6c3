use std::time::Duration;

use tracing::{info, warn};

/// A request the engine gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedRequest {
    pub name: String,
    pub attempts: u32,
    /// The last error seen for this request.
    pub reason: String,
}

/// Outcome of one [`run_batch`](crate::CreationEngine::run_batch).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub requested: usize,
    pub created: usize,
    pub abandoned: Vec<AbandonedRequest>,
    /// Create calls issued, retries included.
    pub attempts: u64,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty() && self.created == self.requested
    }

    pub fn log_summary(&self) {
        info!(
            requested = self.requested,
            created = self.created,
            abandoned = self.abandoned.len(),
            attempts = self.attempts,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Batch finished"
        );
        for item in &self.abandoned {
            warn!(name = %item.name, attempts = item.attempts, reason = %item.reason, "Pod abandoned");
        }
    }
}
