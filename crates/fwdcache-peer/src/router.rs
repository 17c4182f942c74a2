//! Consistent-hash request router.

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use fwdcache_net::{Transport, TransportError, clone_request};
use fwdcache_ring::Ring;
use http::header::HOST;
use http::{HeaderValue, Request, Response, Uri};
use tracing::{debug, info};
use url::Url;

use crate::config::RouterConfig;

/// The transport requests owned by this process are short-circuited to.
struct LocalPeer {
    identity: String,
    transport: Arc<dyn Transport>,
}

/// Routes each request to the peer owning its URL.
///
/// The whole absolute URL is the ring key, so resources of one host are
/// spread over the pool. A request owned by a remote peer is cloned and its
/// target rewritten to `{peer}{path}?q={url}` before going out through the
/// configured transport. A router that knows its own identity
/// ([`with_local`](Self::with_local)) dispatches requests it owns straight
/// to the local transport with no network hop.
///
/// There is no retry and no failover: errors from the owner are returned
/// as they are.
pub struct Router {
    config: RouterConfig,
    transport: Arc<dyn Transport>,
    ring: RwLock<Ring>,
    local: Option<LocalPeer>,
}

impl Router {
    /// Create a router with an empty pool that forwards through `transport`.
    pub fn new(config: RouterConfig, transport: Arc<dyn Transport>) -> Self {
        let ring = Ring::new(config.replicas, config.hash_fn.clone());
        Self {
            config,
            transport,
            ring: RwLock::new(ring),
            local: None,
        }
    }

    /// Make the router peer-aware: requests owned by `identity` go to
    /// `transport` instead of the network.
    pub fn with_local(mut self, identity: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.local = Some(LocalPeer {
            identity: identity.into(),
            transport,
        });
        self
    }

    /// Replace the pool. Each peer is the base URL of a boundary proxy, for
    /// example `http://10.0.1.1:3000`.
    ///
    /// A fresh ring is built outside the lock and swapped in whole, so a
    /// concurrent routing decision sees either the old or the new pool.
    pub fn set_pool<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ring = Ring::with_peers(self.config.replicas, self.config.hash_fn.clone(), peers);
        info!(peers = ring.peer_count(), "pool updated");
        *self.ring.write().expect("ring lock poisoned") = ring;
    }

    /// Peer owning `url`, or `None` when the pool is empty.
    ///
    /// `url` is normalized the way a request URI is, so this agrees with
    /// the routing of a request for the same URL.
    pub fn owner(&self, url: &str) -> Option<String> {
        let key = ring_key(url);
        self.ring
            .read()
            .expect("ring lock poisoned")
            .get(&key)
            .map(str::to_string)
    }

    /// Current pool members.
    pub fn peers(&self) -> Vec<String> {
        self.ring.read().expect("ring lock poisoned").peers().to_vec()
    }

    /// Identity of this process, if the router is peer-aware.
    pub fn self_url(&self) -> Option<&str> {
        self.local.as_ref().map(|l| l.identity.as_str())
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// URL of the boundary proxy on `peer` for `resource`.
    pub fn boundary_url(&self, peer: &str, resource: &str) -> Result<Url, TransportError> {
        let invalid = |reason: String| TransportError::InvalidPeer {
            peer: peer.to_string(),
            reason,
        };

        let mut url = Url::parse(peer).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(invalid("not a base url".to_string()));
        }

        let q: String = form_urlencoded::byte_serialize(resource.as_bytes()).collect();
        url.set_path(&self.config.path);
        url.set_query(Some(&format!("q={q}")));
        Ok(url)
    }

    async fn forward(
        &self,
        peer: &str,
        resource: &str,
        req: &Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let target = self.boundary_url(peer, resource)?;

        let uri: Uri = target
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| TransportError::InvalidRequest(e.to_string()))?;
        let host = match (target.host_str(), target.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        let host = HeaderValue::from_str(&host)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut cloned = clone_request(req);
        *cloned.uri_mut() = uri;
        cloned.headers_mut().insert(HOST, host);

        debug!(peer, resource, "forwarding request");
        self.transport.round_trip(&cloned).await
    }
}

/// Ring key of a resource: its URL in the form `http::Uri` prints it.
///
/// An authority-only URL gains its `/` path. Strings that are not a valid
/// URI are hashed as they are.
fn ring_key(url: &str) -> String {
    url.parse::<Uri>()
        .map(|uri| uri.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait::async_trait]
impl Transport for Router {
    async fn round_trip(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let resource = req.uri().to_string();
        let owner = self.owner(&resource).ok_or(TransportError::NoPeers)?;

        if let Some(local) = &self.local
            && local.identity == owner
        {
            debug!(resource, "serving locally");
            return local.transport.round_trip(req).await;
        }

        self.forward(&owner, &resource, req).await
    }
}
