//! A pool member: router and boundary proxy under one identity.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use fwdcache_net::{BufferPool, HttpTransport, Transport, TransportError};
use fwdcache_ring::HashFn;
use fwdcache_store::{ByteCache, MemoryStore};
use http::{Request, Response};
use tracing::info;

use crate::boundary::BoundaryProxy;
use crate::config::RouterConfig;
use crate::router::Router;

/// A peer of the pool.
///
/// It serves the boundary proxy for the resources it owns
/// ([`handler`](Self::handler)) and is itself a [`Transport`]: requests
/// sent through it go to their owner, and those it owns are answered by
/// its own cache without a network hop.
pub struct Peer {
    router: Router,
    boundary: Arc<BoundaryProxy>,
}

impl Peer {
    /// Start building a peer whose identity in the pool is `self_url`.
    pub fn builder(self_url: impl Into<String>) -> PeerBuilder {
        PeerBuilder {
            self_url: self_url.into(),
            config: RouterConfig::default(),
            origin_transport: None,
            peer_transport: None,
            cache: None,
            buffers: None,
            pool: Vec::new(),
            router: None,
        }
    }

    /// Identity of this peer.
    pub fn self_url(&self) -> &str {
        self.router.self_url().unwrap_or_default()
    }

    /// Replace the pool. The pool should include this peer.
    pub fn set_pool<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.router.set_pool(peers);
    }

    /// Peer owning `url`, or `None` when the pool is empty.
    pub fn owner(&self, url: &str) -> Option<String> {
        self.router.owner(url)
    }

    pub fn peers(&self) -> Vec<String> {
        self.router.peers()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Axum router serving this peer's boundary proxy.
    pub fn handler(&self) -> axum::Router {
        Arc::clone(&self.boundary).into_router()
    }

    /// Serve the boundary proxy on the given TCP address.
    pub async fn serve(&self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr, peer = self.self_url(), "boundary proxy listening");
        axum::serve(listener, self.handler()).await
    }

    /// Serve the boundary proxy until `shutdown` completes, then wait for
    /// in-flight requests to finish.
    pub async fn serve_with_shutdown(
        &self,
        addr: &str,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr, peer = self.self_url(), "boundary proxy listening");
        axum::serve(listener, self.handler())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[async_trait::async_trait]
impl Transport for Peer {
    async fn round_trip(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        self.router.round_trip(req).await
    }
}

/// Builder for [`Peer`].
///
/// Both transports default to one shared [`HttpTransport`] and the cache
/// defaults to an unbounded [`MemoryStore`]. A prebuilt [`Router`] can
/// stand in for the routing configuration and peer transport.
pub struct PeerBuilder {
    self_url: String,
    config: RouterConfig,
    origin_transport: Option<Arc<dyn Transport>>,
    peer_transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn ByteCache>>,
    buffers: Option<BufferPool>,
    pool: Vec<String>,
    router: Option<Router>,
}

impl PeerBuilder {
    /// Replace the whole routing configuration.
    pub fn router_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Path of the boundary proxy. Defaults to `/proxy`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Virtual nodes per peer. Defaults to 50.
    pub fn replicas(mut self, replicas: usize) -> Self {
        self.config.replicas = replicas;
        self
    }

    /// Ring hash function. Defaults to CRC32.
    pub fn hash_fn(mut self, hash_fn: HashFn) -> Self {
        self.config.hash_fn = hash_fn;
        self
    }

    /// Transport used by the boundary proxy to reach origins.
    pub fn origin_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.origin_transport = Some(transport);
        self
    }

    /// Transport used to forward requests to other peers.
    pub fn peer_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.peer_transport = Some(transport);
        self
    }

    /// Store holding cached responses.
    pub fn cache(mut self, cache: Arc<dyn ByteCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Pool buffers used to drain bodies. Off by default.
    pub fn buffer_pool(mut self, pool: BufferPool) -> Self {
        self.buffers = Some(pool);
        self
    }

    /// Route outgoing requests through a prebuilt router.
    ///
    /// The router's configuration and transport replace
    /// [`router_config`](Self::router_config) and
    /// [`peer_transport`](Self::peer_transport); the peer attaches its own
    /// identity to it. The router keeps its pool unless [`pool`](Self::pool)
    /// is also given.
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Initial pool members.
    pub fn pool<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pool = peers.into_iter().map(Into::into).collect();
        self
    }

    /// Build the peer. Fails only if a default HTTP client cannot be created.
    pub fn build(self) -> Result<Peer, TransportError> {
        let buffers = self.buffers.clone();
        let default_http = || -> Result<Arc<dyn Transport>, TransportError> {
            let mut transport = HttpTransport::new()?;
            if let Some(pool) = &buffers {
                transport = transport.with_buffer_pool(pool.clone());
            }
            Ok(Arc::new(transport))
        };

        // Without overrides one HTTP client serves both directions.
        let shared_default = self.origin_transport.is_none();
        let origin = match self.origin_transport {
            Some(origin) => origin,
            None => default_http()?,
        };
        let router = match self.router {
            Some(router) => router,
            None => {
                let forward = match self.peer_transport {
                    Some(forward) => forward,
                    None if shared_default => Arc::clone(&origin),
                    None => default_http()?,
                };
                Router::new(self.config, forward)
            }
        };
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn ByteCache>);

        let mut boundary = BoundaryProxy::new(router.config().path.clone(), origin, cache);
        if let Some(pool) = self.buffers {
            boundary = boundary.with_buffer_pool(pool);
        }
        let boundary = Arc::new(boundary);

        let router = router.with_local(self.self_url, boundary.transport());
        if !self.pool.is_empty() {
            router.set_pool(self.pool);
        }

        Ok(Peer { router, boundary })
    }
}
