//! Destinations for periodic scheduling reports.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::stats::SchedulingStats;

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn emit(&self, stats: &SchedulingStats);
}

/// Logs each report as one `info` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ReportSink for TracingSink {
    async fn emit(&self, stats: &SchedulingStats) {
        info!(
            total = stats.total,
            scheduled = stats.scheduled,
            unscheduled = stats.unscheduled,
            max_ms = stats.max_latency.as_millis() as u64,
            avg_ms = stats.mean_latency.as_millis() as u64,
            "{stats}"
        );
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<SchedulingStats>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<SchedulingStats> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn emit(&self, stats: &SchedulingStats) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*stats);
    }
}
