//! Integration test: boundary proxy over real sockets.
//!
//! Requests go straight to one peer's `/proxy?q=` endpoint, the way another
//! peer would send them.

use fwdcache_integration_tests::{ASSET, Pool, fetch, from_cache, get_request};
use fwdcache_net::{HttpTransport, Transport};
use http::StatusCode;

/// A cacheable asset is fetched once; the second request is a cache hit.
#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let pool = Pool::new(1).await;
    let http = HttpTransport::new().unwrap();
    let target = pool.origin.url("/asset.js?buster=123");
    let url = pool.boundary_url(0, &target);

    let first = fetch(&http, &url).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.body().as_ref(), ASSET.as_bytes());
    assert!(!from_cache(&first));

    let second = fetch(&http, &url).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.body().as_ref(), ASSET.as_bytes());
    assert!(from_cache(&second));

    assert_eq!(pool.origin.hits("/asset.js?buster=123"), 1);
}

/// Origin 404s without caching headers reach the caller and are not cached.
#[tokio::test]
async fn test_not_found_is_not_cached() {
    let pool = Pool::new(1).await;
    let http = HttpTransport::new().unwrap();
    let url = pool.boundary_url(0, &pool.origin.url("/no-found"));

    for _ in 0..2 {
        let resp = fetch(&http, &url).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body().as_ref(), b"not found");
        assert!(!from_cache(&resp));
    }
    assert_eq!(pool.origin.hits("/no-found"), 2);
}

/// Responses without freshness information or validators are never served
/// from the cache.
#[tokio::test]
async fn test_uncacheable_response_goes_to_origin() {
    let pool = Pool::new(1).await;
    let http = HttpTransport::new().unwrap();
    let url = pool.boundary_url(0, &pool.origin.url("/nocache"));

    for _ in 0..3 {
        let resp = fetch(&http, &url).await;
        assert_eq!(resp.body().as_ref(), b"fresh");
        assert!(!from_cache(&resp));
    }
    assert_eq!(pool.origin.hits("/nocache"), 3);
}

/// Request headers reach the origin, and a response varying on them is only
/// reused for matching requests.
#[tokio::test]
async fn test_user_agent_forwarded_and_varied() {
    let pool = Pool::new(1).await;
    let http = HttpTransport::new().unwrap();
    let url = pool.boundary_url(0, &pool.origin.url("/agent"));

    let request = |agent: &str| {
        let mut req = get_request(&url);
        req.headers_mut()
            .insert(http::header::USER_AGENT, agent.parse().unwrap());
        req
    };

    let resp = http.round_trip(&request("tester/1.0")).await.unwrap();
    assert_eq!(resp.body().as_ref(), b"tester/1.0");
    assert!(!from_cache(&resp));

    let resp = http.round_trip(&request("tester/1.0")).await.unwrap();
    assert_eq!(resp.body().as_ref(), b"tester/1.0");
    assert!(from_cache(&resp));

    let resp = http.round_trip(&request("other/2.0")).await.unwrap();
    assert_eq!(resp.body().as_ref(), b"other/2.0");
    assert!(!from_cache(&resp));

    assert_eq!(pool.origin.hits("/agent"), 2);
}

/// Malformed boundary requests are refused with 502 and never reach the
/// origin.
#[tokio::test]
async fn test_bad_requests_are_bad_gateway() {
    let pool = Pool::new(1).await;
    let http = HttpTransport::new().unwrap();
    let base = &pool.peer(0).url;

    let bad = [
        format!("{base}/proxy"),
        format!("{base}/proxy?q="),
        format!("{base}/proxy?q=%31%"),
        format!("{base}/proxy?q=%25"),
        format!("{base}/proxy?url=http%3A%2F%2Fexample.com%2F"),
        format!("{base}/elsewhere?q=http%3A%2F%2Fexample.com%2F"),
    ];
    for url in &bad {
        let resp = fetch(&http, url).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY, "{url}");
        assert!(resp.body().is_empty(), "{url}");
    }
    assert_eq!(pool.origin.total_hits(), 0);
}

/// An unreachable origin is reported as 502.
#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let pool = Pool::new(1).await;
    let http = HttpTransport::new().unwrap();

    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}/gone", listener.local_addr().unwrap());
    drop(listener);

    let resp = fetch(&http, &pool.boundary_url(0, &dead)).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
