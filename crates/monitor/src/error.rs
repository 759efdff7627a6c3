use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache did not sync within {0:?}")]
    SyncTimeout(Duration),

    #[error("cache reflector has stopped")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("initial cache sync failed: {0}")]
    Sync(#[source] CacheError),

    #[error("failed to read cache: {0}")]
    List(#[source] CacheError),
}
