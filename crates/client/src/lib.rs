//! Control plane access for the scheduler benchmark.
//!
//! [`ControlPlane`] is the seam the engines talk to. [`KubeClient`] speaks
//! the Kubernetes REST API; [`InMemoryControlPlane`] is a scriptable
//! stand-in used by tests.

pub mod error;
pub mod kube;
pub mod kubeconfig;
pub mod memory;
pub mod rate_limit;
pub mod traits;
pub mod watch;

pub use error::{ClientError, Status};
pub use kube::KubeClient;
pub use kubeconfig::{Auth, ConnectionInfo, Kubeconfig};
pub use memory::InMemoryControlPlane;
pub use rate_limit::RateLimiter;
pub use traits::{ControlPlane, WatchEvent, WatchStream};
