use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use catalog_core::{AppError, AppResult};

use crate::test_support::FakeKeyedStore;

use super::{CachePolicy, ReadThroughCache};

const TTL: Duration = Duration::from_secs(60);

fn fast_policy() -> CachePolicy {
    CachePolicy {
        lock_lease: Duration::from_millis(40),
        retry_backoff: Duration::from_millis(10),
    }
}

async fn counted_fetch(calls: &AtomicUsize, value: &str) -> AppResult<String> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(value.to_owned())
}

#[test]
fn attempts_cover_the_whole_lease() {
    assert_eq!(CachePolicy::default().max_attempts(), 51);
    assert_eq!(fast_policy().max_attempts(), 5);
}

#[tokio::test]
async fn miss_fetches_once_and_populates_the_entry() {
    let store = Arc::new(FakeKeyedStore::default());
    let cache = ReadThroughCache::new(store.clone(), fast_policy());
    let calls = AtomicUsize::new(0);

    let first = cache
        .cached("product:1", TTL, || counted_fetch(&calls, "lamp"))
        .await;
    let second = cache
        .cached("product:1", TTL, || counted_fetch(&calls, "other"))
        .await;

    assert_eq!(first.ok(), Some("lamp".to_owned()));
    assert_eq!(second.ok(), Some("lamp".to_owned()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.entry("product:1"), Some("\"lamp\"".to_owned()));
    assert_eq!(store.entry("product:1:lock"), None);
}

#[tokio::test]
async fn origin_failure_is_not_cached_and_releases_the_lock() {
    let store = Arc::new(FakeKeyedStore::default());
    let cache = ReadThroughCache::new(store.clone(), fast_policy());

    let result = cache
        .cached::<String, _, _>("product:2", TTL, || async {
            Err(AppError::NotFound("product '2' does not exist".to_owned()))
        })
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(store.entry("product:2"), None);
    assert_eq!(store.entry("product:2:lock"), None);
}

#[tokio::test]
async fn unavailable_store_goes_to_origin_every_time() {
    let store = Arc::new(FakeKeyedStore::default());
    store.set_available(false);
    let cache = ReadThroughCache::new(store.clone(), fast_policy());
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .cached("product:3", TTL, || counted_fetch(&calls, "desk"))
            .await;
        assert_eq!(value.ok(), Some("desk".to_owned()));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn undecodable_entry_is_discarded_and_refetched() {
    let store = Arc::new(FakeKeyedStore::default());
    store.insert("product:4", "{not json");
    let cache = ReadThroughCache::new(store.clone(), fast_policy());
    let calls = AtomicUsize::new(0);

    let value = cache
        .cached("product:4", TTL, || counted_fetch(&calls, "chair"))
        .await;

    assert_eq!(value.ok(), Some("chair".to_owned()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.entry("product:4"), Some("\"chair\"".to_owned()));
}

#[tokio::test]
async fn stuck_lock_holder_leads_to_bypass_after_the_lease() {
    let store = Arc::new(FakeKeyedStore::default());
    store.insert("product:5:lock", "someone-else");
    let cache = ReadThroughCache::new(store.clone(), fast_policy());
    let calls = AtomicUsize::new(0);

    let value = cache
        .cached("product:5", TTL, || counted_fetch(&calls, "shelf"))
        .await;

    assert_eq!(value.ok(), Some("shelf".to_owned()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.entry("product:5"), None);
    assert_eq!(
        store.entry("product:5:lock"),
        Some("someone-else".to_owned())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_a_single_fetch() {
    let store = Arc::new(FakeKeyedStore::default());
    let cache = ReadThroughCache::new(
        store,
        CachePolicy {
            lock_lease: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(5),
        },
    );
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let calls = calls.clone();
        tasks.spawn(async move {
            cache
                .cached("product:6", TTL, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, AppError>("sofa".to_owned())
                })
                .await
        });
    }

    let mut values = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        assert!(joined.is_ok());
        values.push(joined.unwrap_or_else(|_| unreachable!()).ok());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(values.len(), 16);
    assert!(values.iter().all(|value| value.as_deref() == Some("sofa")));
}

#[tokio::test]
async fn pattern_invalidation_keeps_population_locks() {
    let store = Arc::new(FakeKeyedStore::default());
    store.insert("products:list:a", "[]");
    store.insert("products:search:b", "[]");
    store.insert("products:list:c:lock", "token");
    let cache = ReadThroughCache::new(store.clone(), fast_policy());

    let removed = cache.invalidate_pattern("products:*").await;

    assert_eq!(removed, 2);
    assert_eq!(store.entry("products:list:a"), None);
    assert_eq!(store.entry("products:list:c:lock"), Some("token".to_owned()));
}

#[tokio::test]
async fn lock_winner_reuses_an_entry_populated_after_its_miss() {
    let store = Arc::new(FakeKeyedStore::default());
    store.populate_before_next_lock("product:9", "\"walnut shelf\"");
    let cache = ReadThroughCache::new(store.clone(), fast_policy());
    let calls = AtomicUsize::new(0);

    let value = cache
        .cached("product:9", TTL, || counted_fetch(&calls, "refetched"))
        .await;

    assert_eq!(value.ok(), Some("walnut shelf".to_owned()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.entry("product:9:lock"), None);
}
