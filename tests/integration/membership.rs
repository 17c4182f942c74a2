//! Integration test: membership changes.
//!
//! 3 peers. Removing a peer only moves the resources it owned; the others
//! stay with their owner and keep being served from its cache.

use std::collections::HashMap;

use fwdcache_integration_tests::{Pool, fetch, from_cache};

const RESOURCES: usize = 90;

fn blob_paths() -> Vec<String> {
    (0..RESOURCES).map(|i| format!("/blob/{}", 1000 + i)).collect()
}

#[tokio::test]
async fn test_remove_and_restore_peer() {
    let pool = Pool::new(3).await;
    let client = pool.client();
    let paths = blob_paths();

    let mut owners = HashMap::new();
    for path in &paths {
        let url = pool.origin.url(path);
        let resp = fetch(&client, &url).await;
        assert!(!from_cache(&resp));
        owners.insert(path.clone(), client.owner(&url).unwrap());
    }

    // Drop peer 2 from everybody's view of the pool.
    let removed = pool.peer(2).url.clone();
    let survivors: Vec<String> = pool.urls().into_iter().filter(|u| *u != removed).collect();
    pool.set_pool(&survivors);
    client.set_pool(survivors.iter().cloned());

    let mut moved = 0;
    for path in &paths {
        let url = pool.origin.url(path);
        let before = &owners[path];
        let after = client.owner(&url).unwrap();

        let resp = fetch(&client, &url).await;
        if *before == removed {
            moved += 1;
            assert_ne!(after, removed);
            assert!(!from_cache(&resp), "{path} moved but was a hit");
            assert_eq!(pool.origin.hits(path), 2, "{path}");
        } else {
            assert_eq!(after, *before, "{path} changed owner");
            assert!(from_cache(&resp), "{path} kept its owner but missed");
            assert_eq!(pool.origin.hits(path), 1, "{path}");
        }
    }
    assert!(moved > 0 && moved < RESOURCES, "moved {moved} of {RESOURCES}");

    // Restoring the pool hands the resources back to peer 2, whose cache
    // still holds them.
    pool.set_pool(&pool.urls());
    client.set_pool(pool.urls());
    for path in &paths {
        let url = pool.origin.url(path);
        assert_eq!(client.owner(&url).unwrap(), owners[path]);
        let resp = fetch(&client, &url).await;
        assert!(from_cache(&resp), "{path}");
    }
}

/// Routing during membership changes never fails while every member is up.
#[tokio::test]
async fn test_requests_during_membership_churn() {
    let pool = std::sync::Arc::new(Pool::new(3).await);
    let all = pool.urls();

    let churn = {
        let pool = std::sync::Arc::clone(&pool);
        let all = all.clone();
        tokio::spawn(async move {
            for round in 0..50 {
                let members = if round % 2 == 0 { &all[..2] } else { &all[..] };
                pool.set_pool(members);
                tokio::task::yield_now().await;
            }
            pool.set_pool(&all);
        })
    };

    for i in 0..60 {
        let url = pool.origin.url(&format!("/blob/{}", 2000 + i));
        let resp = fetch(&pool.peer(i % 2).peer, &url).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
    }
    churn.await.unwrap();
}
