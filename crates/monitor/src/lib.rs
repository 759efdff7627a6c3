//! Scheduling latency side of the benchmark.
//!
//! [`SchedulingCache`] mirrors pods through a list-then-watch reflector;
//! [`LatencyMonitor`] samples it on a fixed tick and hands
//! [`SchedulingStats`] to a [`ReportSink`].

pub mod cache;
pub mod error;
pub mod monitor;
pub mod sink;
pub mod stats;

pub use cache::{CacheState, SchedulingCache};
pub use error::{CacheError, MonitorError};
pub use monitor::{LatencyMonitor, MonitorConfig, MonitorState};
pub use sink::{CollectingSink, ReportSink, TracingSink};
pub use stats::SchedulingStats;
