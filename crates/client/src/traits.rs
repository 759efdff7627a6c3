//! The control plane seam and its watch event types.

use async_trait::async_trait;
use futures::stream::BoxStream;

use schedbench_core::{NamespaceScope, Pod, PodList};

use crate::error::ClientError;

/// One change delivered by a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Pod),
    Modified(Pod),
    Deleted(Pod),
    /// Progress marker carrying only a resource version.
    Bookmark { resource_version: String },
}

impl WatchEvent {
    /// Resource version the event brings the watcher up to, if known.
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            WatchEvent::Added(pod) | WatchEvent::Modified(pod) | WatchEvent::Deleted(pod) => {
                pod.metadata.resource_version.as_deref()
            }
            WatchEvent::Bookmark { resource_version } => Some(resource_version),
        }
    }
}

/// Stream of watch events; ends when the server closes the watch.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, ClientError>>;

/// Operations the benchmark needs from a cluster control plane.
///
/// Implementations must be shareable across worker tasks.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a pod in `namespace`, returning the object as stored.
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClientError>;

    /// List every pod in `scope`, with the list's resource version.
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<PodList, ClientError>;

    /// Watch pods in `scope` for changes after `resource_version`.
    ///
    /// Fails with [`ClientError::Gone`] when the version is no longer
    /// available and the caller must list again.
    async fn watch_pods(
        &self,
        scope: &NamespaceScope,
        resource_version: &str,
    ) -> Result<WatchStream, ClientError>;
}
