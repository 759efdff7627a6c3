use std::fmt;
use std::time::Duration;

use schedbench_core::PlacementRecord;

/// Scheduling latency figures for one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulingStats {
    pub total: usize,
    pub scheduled: usize,
    pub unscheduled: usize,
    pub max_latency: Duration,
    /// Summed latency divided by *all* records, scheduled or not.
    pub mean_latency: Duration,
    /// Pods per second, taking the slowest placement as the window.
    pub throughput: f64,
}

impl SchedulingStats {
    pub fn compute(records: &[PlacementRecord]) -> Self {
        let total = records.len();
        let mut scheduled = 0usize;
        let mut sum = Duration::ZERO;
        let mut max_latency = Duration::ZERO;

        for latency in records.iter().filter_map(PlacementRecord::scheduling_latency) {
            scheduled += 1;
            sum = sum.saturating_add(latency);
            max_latency = max_latency.max(latency);
        }

        let mean_latency = if total > 0 {
            Duration::from_nanos((sum.as_nanos() / total as u128) as u64)
        } else {
            Duration::ZERO
        };

        let throughput = if max_latency > Duration::ZERO {
            total as f64 / max_latency.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total,
            scheduled,
            unscheduled: total - scheduled,
            max_latency,
            mean_latency,
            throughput,
        }
    }
}

impl fmt::Display for SchedulingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "All: {}, Scheduled: {}, Unscheduled: {}, Max: {:?}, Avg: {:?}, Pods scheduler per second: {:.2}",
            self.total,
            self.scheduled,
            self.unscheduled,
            self.max_latency,
            self.mean_latency,
            self.throughput
        )
    }
}
