//! Integration test: LRU-bounded peer caches.

use fwdcache_integration_tests::{Pool, fetch, from_cache};

const CAPACITY: u64 = 16 * 1024;

/// A peer's cache stays within its byte budget; the least recently used
/// responses are evicted and fetched again from the origin.
#[tokio::test]
async fn test_cache_respects_budget() {
    let pool = Pool::with_capacity(1, CAPACITY).await;
    let peer = &pool.peer(0).peer;
    let cache = &pool.peer(0).cache;

    let paths: Vec<String> = (0..32).map(|i| format!("/blob/{}", 2048 + i)).collect();
    for path in &paths {
        let resp = fetch(peer, &pool.origin.url(path)).await;
        assert!(!from_cache(&resp));
        assert!(cache.used_bytes() <= CAPACITY, "over budget after {path}");
    }
    assert!(cache.len() < paths.len());

    // Most recent survives.
    let last = paths.last().unwrap();
    let resp = fetch(peer, &pool.origin.url(last)).await;
    assert!(from_cache(&resp));
    assert_eq!(pool.origin.hits(last), 1);

    // Oldest was evicted.
    let first = &paths[0];
    let resp = fetch(peer, &pool.origin.url(first)).await;
    assert!(!from_cache(&resp));
    assert_eq!(pool.origin.hits(first), 2);
}

/// A response larger than the whole budget is still cached on its own.
#[tokio::test]
async fn test_oversized_response_is_kept_alone() {
    let pool = Pool::with_capacity(1, 1024).await;
    let peer = &pool.peer(0).peer;
    let cache = &pool.peer(0).cache;

    fetch(peer, &pool.origin.url("/blob/100")).await;
    fetch(peer, &pool.origin.url("/blob/4096")).await;
    assert_eq!(cache.len(), 1);

    let resp = fetch(peer, &pool.origin.url("/blob/4096")).await;
    assert!(from_cache(&resp));
    assert_eq!(resp.body().len(), 4096);
}
