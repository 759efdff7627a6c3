//! Watch-backed local mirror of pod placement state.
//!
//! A single reflector task lists pods, marks the cache synced, then follows
//! a watch from the list's resource version. A watch that ends is resumed
//! from the last seen version; `410 Gone` forces a relist; other errors back
//! off before relisting. Readers get copies, never a half-applied update.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use schedbench_client::{ClientError, ControlPlane, WatchEvent};
use schedbench_core::{NamespaceScope, ObjectKey, PlacementRecord};

use crate::error::CacheError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Lifecycle of the reflector as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    NotSynced,
    Synced,
    Stopped,
}

type Store = Arc<RwLock<BTreeMap<ObjectKey, PlacementRecord>>>;

/// Local mirror of pods in one namespace or all of them.
///
/// Dropping the cache stops its reflector.
pub struct SchedulingCache {
    scope: NamespaceScope,
    store: Store,
    state: watch::Receiver<CacheState>,
    cancel: CancellationToken,
}

impl SchedulingCache {
    /// Spawn the reflector. Must be called inside a tokio runtime.
    pub fn start(client: Arc<dyn ControlPlane>, scope: NamespaceScope) -> Self {
        let store: Store = Arc::new(RwLock::new(BTreeMap::new()));
        let (state_tx, state_rx) = watch::channel(CacheState::NotSynced);
        let cancel = CancellationToken::new();

        let reflector = Reflector {
            client,
            scope: scope.clone(),
            store: Arc::clone(&store),
            state: state_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(reflector.run());

        Self {
            scope,
            store,
            state: state_rx,
            cancel,
        }
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub fn state(&self) -> CacheState {
        if self.cancel.is_cancelled() {
            return CacheState::Stopped;
        }
        *self.state.borrow()
    }

    pub fn is_synced(&self) -> bool {
        self.state() == CacheState::Synced
    }

    /// Wait for the first successful list.
    ///
    /// A stopped cache fails with [`CacheError::Stopped`] even if it had
    /// synced before the stop.
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<(), CacheError> {
        if self.cancel.is_cancelled() {
            return Err(CacheError::Stopped);
        }
        let mut state = self.state.clone();
        let settled = tokio::time::timeout(timeout, async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(CacheError::Stopped),
                result = state.wait_for(|s| *s != CacheState::NotSynced) => match result {
                    Ok(s) if *s == CacheState::Synced => Ok(()),
                    _ => Err(CacheError::Stopped),
                },
            }
        })
        .await;

        match settled {
            Ok(result) => result,
            Err(_) => Err(CacheError::SyncTimeout(timeout)),
        }
    }

    /// Copy of every record currently cached.
    pub fn list(&self) -> Result<Vec<PlacementRecord>, CacheError> {
        if self.state() == CacheState::Stopped {
            return Err(CacheError::Stopped);
        }
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        Ok(store.values().cloned().collect())
    }

    pub fn get(&self, key: &ObjectKey) -> Option<PlacementRecord> {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        store.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the reflector. Later reads fail with [`CacheError::Stopped`].
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SchedulingCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Reflector ─────────────────────────────────────────────────

/// Why a watch session ended.
enum WatchEnd {
    Cancelled,
    /// Stream closed normally; resume from the last version.
    Closed,
    Relist,
    Failed(ClientError),
}

struct Reflector {
    client: Arc<dyn ControlPlane>,
    scope: NamespaceScope,
    store: Store,
    state: watch::Sender<CacheState>,
    cancel: CancellationToken,
}

impl Reflector {
    async fn run(self) {
        info!(scope = %self.scope, "Scheduling cache reflector started");
        let mut backoff = INITIAL_BACKOFF;

        'relist: loop {
            let listed = tokio::select! {
                _ = self.cancel.cancelled() => break 'relist,
                result = self.relist() => result,
            };
            let mut resource_version = match listed {
                Ok(rv) => {
                    backoff = INITIAL_BACKOFF;
                    rv
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "Pod list failed");
                    if !self.pause(&mut backoff).await {
                        break 'relist;
                    }
                    continue 'relist;
                }
            };

            loop {
                match self.watch_from(&mut resource_version).await {
                    WatchEnd::Cancelled => break 'relist,
                    WatchEnd::Closed => {
                        debug!(resource_version = %resource_version, "Watch closed, resuming");
                    }
                    WatchEnd::Relist => {
                        info!(resource_version = %resource_version, "Watch expired, relisting");
                        continue 'relist;
                    }
                    WatchEnd::Failed(e) => {
                        warn!(error = %e, retry_in = ?backoff, "Pod watch failed");
                        if !self.pause(&mut backoff).await {
                            break 'relist;
                        }
                        continue 'relist;
                    }
                }
            }
        }

        self.state.send_replace(CacheState::Stopped);
        info!(scope = %self.scope, "Scheduling cache reflector stopped");
    }

    /// Replace the store with a fresh list. Returns the list's version.
    async fn relist(&self) -> Result<String, ClientError> {
        let list = self.client.list_pods(&self.scope).await?;
        let records: BTreeMap<_, _> = list
            .items
            .iter()
            .map(|pod| (pod.key(), PlacementRecord::from_pod(pod)))
            .collect();
        let count = records.len();
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = records;

        self.state.send_if_modified(|state| {
            if *state == CacheState::NotSynced {
                *state = CacheState::Synced;
                true
            } else {
                false
            }
        });

        let resource_version = list
            .metadata
            .resource_version
            .filter(|rv| !rv.is_empty())
            .unwrap_or_else(|| "0".to_string());
        debug!(pods = count, resource_version = %resource_version, "Pods listed");
        Ok(resource_version)
    }

    /// Follow one watch session, advancing `resource_version` as events arrive.
    async fn watch_from(&self, resource_version: &mut String) -> WatchEnd {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return WatchEnd::Cancelled,
            result = self.client.watch_pods(&self.scope, resource_version.as_str()) => result,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) if e.is_gone() => return WatchEnd::Relist,
            Err(e) => return WatchEnd::Failed(e),
        };

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return WatchEnd::Cancelled,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    if let Some(rv) = event.resource_version() {
                        if !rv.is_empty() {
                            *resource_version = rv.to_string();
                        }
                    }
                    self.apply(event);
                }
                Some(Err(e)) if e.is_gone() => return WatchEnd::Relist,
                Some(Err(e)) => return WatchEnd::Failed(e),
                None => return WatchEnd::Closed,
            }
        }
    }

    fn apply(&self, event: WatchEvent) {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        match event {
            WatchEvent::Added(pod) | WatchEvent::Modified(pod) => {
                store.insert(pod.key(), PlacementRecord::from_pod(&pod));
            }
            WatchEvent::Deleted(pod) => {
                store.remove(&pod.key());
            }
            WatchEvent::Bookmark { .. } => {}
        }
    }

    /// Sleep for the current backoff and grow it. False if cancelled.
    async fn pause(&self, backoff: &mut Duration) -> bool {
        let delay = *backoff;
        *backoff = (*backoff * 2).min(MAX_BACKOFF);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
