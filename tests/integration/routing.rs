//! Integration test: routing across a pool.
//!
//! 3 peers. Every resource has one owner, whichever peer (or outside client)
//! a request enters through.

use fwdcache_integration_tests::{Pool, fetch, from_cache, get_request, test_data};
use fwdcache_net::{Transport, TransportError};
use http::StatusCode;

/// Peers and outside clients agree on the owner of every resource.
#[tokio::test]
async fn test_owner_agreement() {
    let pool = Pool::new(3).await;
    let client = pool.client();

    for i in 0..100 {
        let url = pool.origin.url(&format!("/blob/{i}"));
        let expected = client.owner(&url).unwrap();
        for p in 0..pool.len() {
            assert_eq!(pool.peer(p).peer.owner(&url).unwrap(), expected);
        }
    }
}

/// A resource fetched through every peer is fetched from the origin once and
/// cached only by its owner.
#[tokio::test]
async fn test_single_owner_caches_resource() {
    let pool = Pool::new(3).await;

    for i in 0..20 {
        let path = format!("/blob/{}", 100 + i);
        let url = pool.origin.url(&path);

        for p in 0..pool.len() {
            let resp = fetch(&pool.peer(p).peer, &url).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(resp.body().as_ref(), test_data(100 + i, (100 + i) as u64));
            assert_eq!(from_cache(&resp), p > 0, "{url} via peer {p}");
        }

        assert_eq!(pool.origin.hits(&path), 1, "{url}");
        assert_eq!(pool.holders(&url), vec![pool.owner_index(&url)], "{url}");
    }
}

/// An outside client spreads resources over every peer.
#[tokio::test]
async fn test_client_spreads_load() {
    let pool = Pool::new(3).await;
    let client = pool.client();

    for i in 0..60 {
        let url = pool.origin.url(&format!("/blob/{i}"));
        let resp = fetch(&client, &url).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!from_cache(&resp));
    }

    for p in 0..pool.len() {
        let cached = pool.peer(p).cache.len();
        assert!(cached > 0, "peer {p} owns nothing");
    }
    let total: usize = (0..pool.len()).map(|p| pool.peer(p).cache.len()).sum();
    assert_eq!(total, 60);
    assert_eq!(pool.origin.total_hits(), 60);
}

/// Origin statuses pass through a forwarding peer unchanged.
#[tokio::test]
async fn test_forwarded_not_found() {
    let pool = Pool::new(3).await;
    let url = pool.origin.url("/no-found");
    let owner = pool.owner_index(&url);
    let entry = (owner + 1) % pool.len();

    let resp = fetch(&pool.peer(entry).peer, &url).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.body().as_ref(), b"not found");
}

/// A pool member that is down fails the requests it owns; the router does
/// not retry elsewhere.
#[tokio::test]
async fn test_unreachable_owner_fails() {
    let pool = Pool::new(2).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut members = pool.urls();
    members.push(dead.clone());
    pool.set_pool(&members);

    let client = pool.client();
    client.set_pool(members.iter().cloned());

    let url = (0..1000)
        .map(|i| pool.origin.url(&format!("/blob/{i}")))
        .find(|url| client.owner(url).as_deref() == Some(dead.as_str()))
        .expect("some resource is owned by the dead peer");

    let err = client
        .round_trip(&get_request(&url))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Client(_)), "{err}");
    assert_eq!(pool.origin.total_hits(), 0);
}
