use std::path::PathBuf;

use thiserror::Error;

use crate::report::BatchReport;

/// Failures loading a pod template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode template {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("template {0} has no metadata.name")]
    MissingName(PathBuf),
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error(
        "{} of {} pods abandoned after {} attempts",
        .report.abandoned.len(),
        .report.requested,
        .report.attempts
    )]
    Incomplete { report: Box<BatchReport> },

    #[error("work queue closed before the batch finished")]
    QueueClosed,
}

impl CreateError {
    /// The partial report carried by [`CreateError::Incomplete`].
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            CreateError::Incomplete { report } => Some(report),
            _ => None,
        }
    }
}
