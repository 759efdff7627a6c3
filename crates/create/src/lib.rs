//! Pod creation side of the benchmark.
//!
//! [`build_batch`] expands a template into uniquely named requests and
//! [`CreationEngine`] submits them through a bounded worker pool.

pub mod engine;
pub mod error;
pub mod factory;
pub mod report;
pub mod retry;
pub mod template;

pub use engine::{CreationEngine, EngineConfig};
pub use error::{CreateError, TemplateError};
pub use factory::{build_batch, parse_request_name, CreateRequest, WorkBatch};
pub use report::{AbandonedRequest, BatchReport};
pub use retry::RetryPolicy;
pub use template::{load_template, parse_template};
