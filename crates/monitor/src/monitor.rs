//! Periodic scheduling-latency sampler.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::SchedulingCache;
use crate::error::MonitorError;
use crate::sink::ReportSink;
use crate::stats::SchedulingStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between reports. The first report comes one interval after start.
    pub interval: Duration,
    /// How long to wait for the cache's initial list.
    pub sync_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            sync_timeout: Duration::from_secs(60),
        }
    }
}

/// Samples a [`SchedulingCache`] on a fixed tick and reports stats.
pub struct LatencyMonitor {
    cache: Arc<SchedulingCache>,
    sink: Arc<dyn ReportSink>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl LatencyMonitor {
    pub fn new(cache: Arc<SchedulingCache>, sink: Arc<dyn ReportSink>, config: MonitorConfig) -> Self {
        Self {
            cache,
            sink,
            config,
            state: Mutex::new(MonitorState::Idle),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: MonitorState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Wait for the cache to sync, then report every interval until
    /// `cancel` fires. Cancellation never emits a partial report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), MonitorError> {
        let synced = tokio::select! {
            _ = cancel.cancelled() => {
                self.set_state(MonitorState::Stopped);
                return Ok(());
            }
            result = self.cache.wait_for_sync(self.config.sync_timeout) => result,
        };
        if let Err(e) = synced {
            self.set_state(MonitorState::Stopped);
            return Err(MonitorError::Sync(e));
        }

        self.set_state(MonitorState::Running);
        info!(
            scope = %self.cache.scope(),
            interval = ?self.config.interval,
            "Latency monitor running"
        );

        let result = self.tick_loop(&cancel).await;
        self.set_state(MonitorState::Stopped);
        match &result {
            Ok(()) => info!("Latency monitor stopped"),
            Err(e) => warn!(error = %e, "Latency monitor failed"),
        }
        result
    }

    async fn tick_loop(&self, cancel: &CancellationToken) -> Result<(), MonitorError> {
        let interval = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    let records = self.cache.list().map_err(MonitorError::List)?;
                    let stats = SchedulingStats::compute(&records);
                    debug!(records = records.len(), "Sampled scheduling cache");
                    self.sink.emit(&stats).await;
                }
            }
        }
    }
}
