//! In-memory [`ControlPlane`] with scriptable failures.
//!
//! Keeps pods in a map, assigns monotonically increasing resource versions
//! and fans changes out to watchers over a broadcast channel. Tests drive
//! the "scheduler" side explicitly with [`InMemoryControlPlane::mark_scheduled`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;

use schedbench_core::{
    ListMeta, NamespaceScope, ObjectKey, Pod, PodCondition, PodList, PodStatus, POD_SCHEDULED,
};

use crate::error::ClientError;
use crate::traits::{ControlPlane, WatchEvent, WatchStream};

const EVENT_BUFFER: usize = 4096;

/// Scripted create failure for one pod name.
#[derive(Debug, Clone)]
enum Failure {
    /// Reject the next `n` attempts.
    Times(u32),
    /// Reject every attempt.
    Always,
    /// Reject every attempt with a client error such as `422 Invalid`.
    Status { code: u16, reason: String },
    /// Store the pod but report an error, `n` times.
    AfterCommit(u32),
}

impl Failure {
    fn exhausted(&self) -> bool {
        matches!(self, Failure::Times(0) | Failure::AfterCommit(0))
    }
}

enum Injected {
    None,
    Reject,
    RejectWith(ClientError),
    LoseResponse,
}

struct State {
    pods: BTreeMap<ObjectKey, Pod>,
    revision: u64,
    /// Events after `compacted`, replayed to new watchers.
    history: Vec<(u64, WatchEvent)>,
    /// Oldest resource version a watch may start from.
    compacted: u64,
    failures: HashMap<String, Failure>,
    list_failures: u32,
    events: broadcast::Sender<(u64, WatchEvent)>,
}

impl State {
    /// Apply a change: bump the revision, stamp it on the pod and publish.
    fn commit(&mut self, make_event: impl FnOnce(Pod) -> WatchEvent, mut pod: Pod) -> Pod {
        self.revision += 1;
        pod.metadata.resource_version = Some(self.revision.to_string());
        let event = make_event(pod.clone());
        self.history.push((self.revision, event.clone()));
        // No receivers is fine.
        let _ = self.events.send((self.revision, event));
        pod
    }
}

fn event_pod(event: &WatchEvent) -> Option<&Pod> {
    match event {
        WatchEvent::Added(pod) | WatchEvent::Modified(pod) | WatchEvent::Deleted(pod) => Some(pod),
        WatchEvent::Bookmark { .. } => None,
    }
}

fn in_scope(scope: &NamespaceScope, event: &WatchEvent) -> bool {
    event_pod(event).map_or(true, |pod| scope.contains(pod.namespace()))
}

fn injected_error(name: &str) -> ClientError {
    ClientError::Api {
        code: 500,
        reason: "InternalError".into(),
        message: format!("injected failure creating {name}"),
    }
}

/// Control plane that lives entirely in process memory.
pub struct InMemoryControlPlane {
    state: Mutex<State>,
    create_latency: Mutex<Duration>,
    create_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(State {
                pods: BTreeMap::new(),
                revision: 0,
                history: Vec::new(),
                compacted: 0,
                failures: HashMap::new(),
                list_failures: 0,
                events,
            }),
            create_latency: Mutex::new(Duration::ZERO),
            create_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Scripting ─────────────────────────────────────────────

    /// Reject the next `times` create attempts for `name`.
    pub fn fail_next(&self, name: &str, times: u32) {
        self.script(name, times, Failure::Times(times));
    }

    /// Reject every create attempt for `name`.
    pub fn fail_always(&self, name: &str) {
        self.lock().failures.insert(name.to_string(), Failure::Always);
    }

    /// Reject every create of `name` with a non-retryable API status.
    pub fn fail_with_status(&self, name: &str, code: u16, reason: &str) {
        self.lock().failures.insert(
            name.to_string(),
            Failure::Status {
                code,
                reason: reason.to_string(),
            },
        );
    }

    /// Store the next `times` creates of `name` but answer with an error,
    /// as when a response is lost after the server committed.
    pub fn fail_after_commit(&self, name: &str, times: u32) {
        self.script(name, times, Failure::AfterCommit(times));
    }

    /// Install a counted failure; zero clears any script for `name`.
    fn script(&self, name: &str, times: u32, failure: Failure) {
        let mut state = self.lock();
        if times == 0 {
            state.failures.remove(name);
        } else {
            state.failures.insert(name.to_string(), failure);
        }
    }

    /// Fail the next `times` list calls.
    pub fn fail_lists(&self, times: u32) {
        self.lock().list_failures = times;
    }

    /// Delay every create call by `latency`.
    pub fn set_create_latency(&self, latency: Duration) {
        *self.create_latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Forget history so watches from older versions fail with `Gone`.
    pub fn compact(&self) {
        let mut state = self.lock();
        state.compacted = state.revision;
        state.history.clear();
    }

    /// End every open watch stream.
    pub fn close_watches(&self) {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        self.lock().events = events;
    }

    // ── Mutations outside the create path ─────────────────────

    /// Insert or replace a pod as if another client wrote it.
    pub fn insert(&self, mut pod: Pod) -> Pod {
        let mut state = self.lock();
        let key = pod.key();
        pod.metadata.namespace = Some(key.namespace.clone());
        if pod.metadata.creation_timestamp.is_none() {
            pod.metadata.creation_timestamp = Some(Utc::now());
        }
        let exists = state.pods.contains_key(&key);
        let make: fn(Pod) -> WatchEvent = if exists {
            WatchEvent::Modified
        } else {
            WatchEvent::Added
        };
        let stored = state.commit(make, pod);
        state.pods.insert(key, stored.clone());
        stored
    }

    /// Set the pod's `PodScheduled` condition to `True` at `at`.
    /// Returns false if the pod does not exist.
    pub fn mark_scheduled(&self, key: &ObjectKey, at: DateTime<Utc>) -> bool {
        self.set_scheduled_condition(key, "True", at)
    }

    /// Set the pod's `PodScheduled` condition to `status` at `at`.
    pub fn set_scheduled_condition(&self, key: &ObjectKey, status: &str, at: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        let Some(mut pod) = state.pods.get(key).cloned() else {
            return false;
        };
        let pod_status = pod.status.get_or_insert_with(PodStatus::default);
        pod_status.conditions.retain(|c| c.condition_type != POD_SCHEDULED);
        pod_status.conditions.push(PodCondition {
            condition_type: POD_SCHEDULED.to_string(),
            status: status.to_string(),
            last_transition_time: Some(at),
            reason: None,
            message: None,
        });
        let stored = state.commit(WatchEvent::Modified, pod);
        state.pods.insert(key.clone(), stored);
        true
    }

    /// Delete a pod. Returns false if it did not exist.
    pub fn delete(&self, key: &ObjectKey) -> bool {
        let mut state = self.lock();
        match state.pods.remove(key) {
            Some(pod) => {
                state.commit(WatchEvent::Deleted, pod);
                true
            }
            None => false,
        }
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn get(&self, key: &ObjectKey) -> Option<Pod> {
        self.lock().pods.get(key).cloned()
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.lock().pods.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total create calls received, failed ones included.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Highest number of create calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn commit_create(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClientError> {
        let mut state = self.lock();
        let name = pod.name().to_string();

        let injected = match state.failures.get_mut(&name) {
            None => Injected::None,
            Some(Failure::Always) => Injected::Reject,
            Some(Failure::Status { code, reason }) => Injected::RejectWith(ClientError::Api {
                code: *code,
                reason: reason.clone(),
                message: format!("pods {name:?} rejected: {reason}"),
            }),
            Some(Failure::Times(n)) => {
                *n = n.saturating_sub(1);
                Injected::Reject
            }
            Some(Failure::AfterCommit(n)) => {
                *n = n.saturating_sub(1);
                Injected::LoseResponse
            }
        };
        state.failures.retain(|_, f| !f.exhausted());

        match injected {
            Injected::Reject => return Err(injected_error(&name)),
            Injected::RejectWith(err) => return Err(err),
            Injected::None | Injected::LoseResponse => {}
        }

        let key = ObjectKey::new(namespace, name.as_str());
        if state.pods.contains_key(&key) {
            return Err(ClientError::AlreadyExists(format!("pods {name:?} already exists")));
        }

        let mut stored = pod.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.uid = Some(format!("uid-{}", state.revision + 1));
        stored.metadata.creation_timestamp = Some(Utc::now());
        stored.status = Some(PodStatus {
            phase: Some("Pending".into()),
            ..Default::default()
        });
        let stored = state.commit(WatchEvent::Added, stored);
        state.pods.insert(key, stored.clone());

        if matches!(injected, Injected::LoseResponse) {
            return Err(injected_error(&name));
        }
        Ok(stored)
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.create_latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = self.commit_create(namespace, pod);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_pods(&self, scope: &NamespaceScope) -> Result<PodList, ClientError> {
        let mut state = self.lock();
        if state.list_failures > 0 {
            state.list_failures -= 1;
            return Err(ClientError::Api {
                code: 500,
                reason: "InternalError".into(),
                message: "injected list failure".into(),
            });
        }
        let items = state
            .pods
            .values()
            .filter(|pod| scope.contains(pod.namespace()))
            .cloned()
            .collect();
        Ok(PodList {
            metadata: ListMeta {
                resource_version: Some(state.revision.to_string()),
            },
            items,
        })
    }

    async fn watch_pods(
        &self,
        scope: &NamespaceScope,
        resource_version: &str,
    ) -> Result<WatchStream, ClientError> {
        let from: u64 = resource_version.parse().map_err(|_| {
            ClientError::Decode(format!("invalid resource version {resource_version:?}"))
        })?;

        let state = self.lock();
        if from < state.compacted {
            return Err(ClientError::Gone(format!(
                "resource version {from} is older than {}",
                state.compacted
            )));
        }

        let replay: Vec<Result<WatchEvent, ClientError>> = state
            .history
            .iter()
            .filter(|(rev, event)| *rev > from && in_scope(scope, event))
            .map(|(_, event)| Ok(event.clone()))
            .collect();
        let receiver = state.events.subscribe();
        drop(state);

        let scope = scope.clone();
        let live = stream::unfold(Some(receiver), move |receiver| {
            let scope = scope.clone();
            async move {
                let mut receiver = receiver?;
                loop {
                    match receiver.recv().await {
                        Ok((_, event)) if in_scope(&scope, &event) => {
                            return Some((Ok(event), Some(receiver)));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            let err = ClientError::Gone(format!("watcher lagged by {missed} events"));
                            return Some((Err(err), None));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream::iter(replay).chain(live).boxed())
    }
}
