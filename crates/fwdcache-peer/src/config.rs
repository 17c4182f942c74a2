//! Routing configuration shared by every member of a pool.

use std::fmt;

use fwdcache_ring::{DEFAULT_REPLICAS, HashFn, crc32};

/// Default path the boundary proxy is served on.
pub const DEFAULT_PATH: &str = "/proxy";

/// Settings that decide where a request is routed.
///
/// All peers and clients of a pool must agree on these, otherwise they
/// disagree on resource ownership.
#[derive(Clone)]
pub struct RouterConfig {
    /// Path of the boundary proxy on every peer.
    pub path: String,
    /// Virtual nodes per peer on the hash ring.
    pub replicas: usize,
    /// Hash function of the ring.
    pub hash_fn: HashFn,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            hash_fn: crc32(),
        }
    }
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("path", &self.path)
            .field("replicas", &self.replicas)
            .finish_non_exhaustive()
    }
}
