//! Reflector behaviour against the in-memory control plane.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use schedbench_client::InMemoryControlPlane;
use schedbench_core::{NamespaceScope, ObjectKey, Pod};
use schedbench_monitor::{CacheError, CacheState, SchedulingCache};

const SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll `check` until it holds, letting the reflector run in between.
async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}

fn start(cp: &Arc<InMemoryControlPlane>, scope: NamespaceScope) -> SchedulingCache {
    SchedulingCache::start(cp.clone(), scope)
}

#[tokio::test(start_paused = true)]
async fn initial_list_populates_and_syncs() {
    let cp = Arc::new(InMemoryControlPlane::new());
    cp.insert(Pod::named("bench", "a"));
    cp.insert(Pod::named("bench", "b"));

    let cache = start(&cp, NamespaceScope::All);
    assert_eq!(cache.state(), CacheState::NotSynced);
    cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();

    assert!(cache.is_synced());
    let records = cache.list().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_scheduled()));
}

#[tokio::test(start_paused = true)]
async fn applies_add_modify_delete() {
    let cp = Arc::new(InMemoryControlPlane::new());
    let cache = start(&cp, NamespaceScope::All);
    cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();
    assert!(cache.is_empty());

    let key = ObjectKey::new("bench", "a");
    cp.insert(Pod::named("bench", "a"));
    eventually("pod added", || cache.len() == 1).await;

    cp.mark_scheduled(&key, Utc::now());
    eventually("pod scheduled", || {
        cache.get(&key).is_some_and(|r| r.is_scheduled())
    })
    .await;

    cp.delete(&key);
    eventually("pod deleted", || cache.is_empty()).await;
}

#[tokio::test(start_paused = true)]
async fn namespace_scope_excludes_other_namespaces() {
    let cp = Arc::new(InMemoryControlPlane::new());
    cp.insert(Pod::named("other", "x"));
    let cache = start(&cp, NamespaceScope::Namespace("bench".into()));
    cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();

    cp.insert(Pod::named("other", "y"));
    cp.insert(Pod::named("bench", "z"));
    eventually("bench pod added", || cache.len() == 1).await;

    let records = cache.list().unwrap();
    assert_eq!(records[0].key, ObjectKey::new("bench", "z"));
}

#[tokio::test(start_paused = true)]
async fn resumes_after_watch_closes() {
    let cp = Arc::new(InMemoryControlPlane::new());
    let cache = start(&cp, NamespaceScope::All);
    cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();

    cp.insert(Pod::named("bench", "a"));
    eventually("first pod", || cache.len() == 1).await;

    cp.close_watches();
    cp.insert(Pod::named("bench", "b"));
    eventually("pod added after reconnect", || cache.len() == 2).await;
}

#[tokio::test(start_paused = true)]
async fn relists_after_gone() {
    let cp = Arc::new(InMemoryControlPlane::new());
    let cache = start(&cp, NamespaceScope::All);
    cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();

    cp.insert(Pod::named("bench", "a"));
    eventually("first pod", || cache.len() == 1).await;

    // The reflector cannot run between these calls: its watch ends, the
    // missed event is compacted away, and resuming must fail with Gone.
    cp.close_watches();
    cp.insert(Pod::named("bench", "b"));
    cp.compact();

    eventually("relist picks up missed pod", || cache.len() == 2).await;
    assert!(cache.get(&ObjectKey::new("bench", "b")).is_some());
}

#[tokio::test(start_paused = true)]
async fn retries_failed_lists() {
    let cp = Arc::new(InMemoryControlPlane::new());
    cp.insert(Pod::named("bench", "a"));
    cp.fail_lists(3);

    let cache = start(&cp, NamespaceScope::All);
    cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sync_times_out_when_lists_keep_failing() {
    let cp = Arc::new(InMemoryControlPlane::new());
    cp.fail_lists(u32::MAX);

    let cache = start(&cp, NamespaceScope::All);
    let err = cache.wait_for_sync(Duration::from_secs(2)).await.unwrap_err();
    assert_eq!(err, CacheError::SyncTimeout(Duration::from_secs(2)));
    assert!(!cache.is_synced());
}

#[tokio::test(start_paused = true)]
async fn stopped_cache_rejects_reads() {
    let cp = Arc::new(InMemoryControlPlane::new());
    let cache = start(&cp, NamespaceScope::All);
    cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();

    cache.stop();
    assert_eq!(cache.state(), CacheState::Stopped);
    assert_eq!(cache.list().unwrap_err(), CacheError::Stopped);
    assert_eq!(
        cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap_err(),
        CacheError::Stopped
    );
}

#[tokio::test(start_paused = true)]
async fn synced_cache_reports_stopped_after_stop() {
    let cp = Arc::new(InMemoryControlPlane::new());
    cp.insert(Pod::named("bench", "a"));

    for _ in 0..200 {
        let cache = start(&cp, NamespaceScope::All);
        cache.wait_for_sync(SYNC_TIMEOUT).await.unwrap();
        cache.stop();
        assert_eq!(
            cache.wait_for_sync(SYNC_TIMEOUT).await,
            Err(CacheError::Stopped)
        );
    }
}
