//! Shared test harness for fwdcache integration tests.
//!
//! Provides [`Origin`], an HTTP origin server that counts the requests it
//! serves, and [`Pool`], N peers serving their boundary proxy on ephemeral
//! ports of the loopback interface, every one aware of every other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use axum::extract::{Path, Request as AxumRequest, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::get;
use bytes::Bytes;
use fwdcache_net::{HttpTransport, Transport};
use fwdcache_peer::{DEFAULT_PATH, Peer, Router, RouterConfig};
use fwdcache_store::{ByteCache, LruStore, MemoryStore};
use http::{Request, Response};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::net::TcpListener;
use url::Url;

/// Body of `/asset.js`.
pub const ASSET: &str = "console.log('fwdcache');";

// =========================================================================
// Origin
// =========================================================================

type Hits = Arc<Mutex<HashMap<String, usize>>>;

/// Origin server. Routes:
///
/// - `/asset.js`: fresh for an hour, with `Last-Modified`.
/// - `/agent`: echoes `User-Agent`, fresh for an hour, varies on it.
/// - `/blob/{size}`: `size` pseudo-random bytes, fresh for an hour.
/// - `/nocache`: no caching headers at all.
/// - anything else: `404 not found`.
pub struct Origin {
    base: String,
    hits: Hits,
}

impl Origin {
    pub async fn spawn() -> Self {
        let hits: Hits = Arc::default();
        let app = axum::Router::new()
            .route("/asset.js", get(asset))
            .route("/agent", get(agent))
            .route("/blob/{size}", get(blob))
            .route("/nocache", get(|| async { "fresh" }))
            .fallback(|| async { (StatusCode::NOT_FOUND, "not found") })
            .layer(middleware::from_fn_with_state(Arc::clone(&hits), count));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("origin server failed");
        });

        Self { base, hits }
    }

    /// Absolute URL of `path_and_query` on this origin.
    pub fn url(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.base)
    }

    /// Requests served for `path_and_query`.
    pub fn hits(&self, path_and_query: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .get(path_and_query)
            .copied()
            .unwrap_or(0)
    }

    /// Requests served in total.
    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

async fn count(State(hits): State<Hits>, req: AxumRequest, next: Next) -> AxumResponse {
    let key = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    *hits.lock().unwrap().entry(key).or_default() += 1;
    next.run(req).await
}

async fn asset() -> impl IntoResponse {
    let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    (
        [
            (header::CACHE_CONTROL, "max-age=3600".to_string()),
            (header::LAST_MODIFIED, httpdate::fmt_http_date(modified)),
            (header::CONTENT_TYPE, "application/javascript".to_string()),
        ],
        ASSET,
    )
}

async fn agent(headers: HeaderMap) -> impl IntoResponse {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    (
        [
            (header::CACHE_CONTROL, "max-age=3600"),
            (header::VARY, "User-Agent"),
        ],
        agent,
    )
}

async fn blob(Path(size): Path<usize>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "max-age=3600")],
        test_data(size, size as u64),
    )
}

// =========================================================================
// Pool
// =========================================================================

/// One running peer of a [`Pool`].
pub struct PoolPeer {
    pub url: String,
    pub peer: Peer,
    pub cache: Arc<LruStore>,
}

/// N peers in one pool, plus the origin they fetch from.
pub struct Pool {
    pub origin: Origin,
    peers: Vec<PoolPeer>,
}

impl Pool {
    /// Spawn `n` peers with unbounded caches.
    pub async fn new(n: usize) -> Self {
        Self::with_capacity(n, u64::MAX).await
    }

    /// Spawn `n` peers whose caches hold at most `capacity` bytes each.
    pub async fn with_capacity(n: usize, capacity: u64) -> Self {
        let origin = Origin::spawn().await;

        let mut listeners = Vec::with_capacity(n);
        for _ in 0..n {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            listeners.push((url, listener));
        }
        let urls: Vec<String> = listeners.iter().map(|(url, _)| url.clone()).collect();

        let mut peers = Vec::with_capacity(n);
        for (url, listener) in listeners {
            let cache = Arc::new(LruStore::new(Arc::new(MemoryStore::new()), capacity));
            let peer = Peer::builder(url.clone())
                .cache(Arc::clone(&cache) as Arc<dyn ByteCache>)
                .pool(urls.clone())
                .build()
                .unwrap();

            let app = peer.handler();
            tokio::spawn(async move {
                axum::serve(listener, app).await.expect("peer server failed");
            });

            peers.push(PoolPeer { url, peer, cache });
        }

        Self { origin, peers }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peer(&self, i: usize) -> &PoolPeer {
        &self.peers[i]
    }

    /// Base URLs of all peers.
    pub fn urls(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.url.clone()).collect()
    }

    /// Replace the membership of every peer.
    pub fn set_pool(&self, urls: &[String]) {
        for p in &self.peers {
            p.peer.set_pool(urls.iter().cloned());
        }
    }

    /// A router sending requests into the pool without being part of it.
    pub fn client(&self) -> Router {
        let router = Router::new(RouterConfig::default(), Arc::new(HttpTransport::new().unwrap()));
        router.set_pool(self.urls());
        router
    }

    /// Index of the peer owning `url`.
    pub fn owner_index(&self, url: &str) -> usize {
        let owner = self.peers[0].peer.owner(url).unwrap();
        self.peers.iter().position(|p| p.url == owner).unwrap()
    }

    /// Indexes of the peers holding a cached response for `GET url`.
    pub fn holders(&self, url: &str) -> Vec<usize> {
        let key = Url::parse(url).unwrap().to_string();
        self.peers
            .iter()
            .enumerate()
            .filter(|(_, p)| p.cache.keys().contains(&key))
            .map(|(i, _)| i)
            .collect()
    }

    /// Boundary URL of peer `i` for `target`.
    pub fn boundary_url(&self, i: usize, target: &str) -> String {
        let base = format!("{}{DEFAULT_PATH}", self.peers[i].url);
        Url::parse_with_params(&base, &[("q", target)])
            .unwrap()
            .to_string()
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// A `GET url` request with an empty body.
pub fn get_request(url: &str) -> Request<Bytes> {
    Request::get(url).body(Bytes::new()).unwrap()
}

/// Send `GET url` through `transport`.
pub async fn fetch<T: Transport + ?Sized>(transport: &T, url: &str) -> Response<Bytes> {
    transport.round_trip(&get_request(url)).await.unwrap()
}

/// Whether `resp` was served from a cache.
pub fn from_cache(resp: &Response<Bytes>) -> bool {
    resp.headers()
        .get(fwdcache_net::X_FROM_CACHE)
        .is_some_and(|v| v == "1")
}

/// Deterministic pseudo-random payload.
pub fn test_data(size: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; size];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}
