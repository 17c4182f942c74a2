//! Consistent hashing ring implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// Default number of ring positions per peer.
pub const DEFAULT_REPLICAS: usize = 50;

/// Hash function used to place peers and keys on the ring.
///
/// Every peer of a pool must use the same function, otherwise two peers
/// disagree on who owns a resource.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// The default hash function: IEEE CRC32.
pub fn crc32() -> HashFn {
    Arc::new(crc32fast::hash)
}

/// Consistent hashing ring for deterministic resource placement.
///
/// Each peer is mapped to `replicas` positions on a `u32` ring. Lookup walks
/// clockwise from the key's position to the first peer position.
#[derive(Clone)]
pub struct Ring {
    /// Virtual node positions: ring position -> peer identity.
    vnodes: BTreeMap<u32, String>,
    /// Distinct peers, in the order they were added.
    peers: Vec<String>,
    /// Number of positions per peer.
    replicas: usize,
    hash_fn: HashFn,
}

impl Ring {
    /// Create a new empty ring.
    pub fn new(replicas: usize, hash_fn: HashFn) -> Self {
        Self {
            vnodes: BTreeMap::new(),
            peers: Vec::new(),
            replicas,
            hash_fn,
        }
    }

    /// Build a ring holding exactly `peers`.
    pub fn with_peers<I, S>(replicas: usize, hash_fn: HashFn, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = Self::new(replicas, hash_fn);
        ring.add(peers);
        ring
    }

    /// Add peers to the ring.
    ///
    /// A peer already on the ring is skipped. When two positions collide the
    /// peer added last wins the position.
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            let peer = peer.into();
            if self.peers.contains(&peer) {
                continue;
            }

            for i in 0..self.replicas {
                let pos = (self.hash_fn)(format!("{i}{peer}").as_bytes());
                self.vnodes.insert(pos, peer.clone());
            }

            debug!(%peer, replicas = self.replicas, "added peer to ring");
            self.peers.push(peer);
        }
    }

    /// Return the peer owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.vnodes.is_empty() {
            return None;
        }

        let pos = (self.hash_fn)(key.as_bytes());

        // First position >= pos, wrapping to the smallest position.
        self.vnodes
            .range(pos..)
            .next()
            .or_else(|| self.vnodes.iter().next())
            .map(|(_, peer)| peer.as_str())
    }

    /// Whether the ring has no peers.
    pub fn is_empty(&self) -> bool {
        self.vnodes.is_empty()
    }

    /// Return the number of distinct peers in the ring.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Return the number of occupied ring positions.
    ///
    /// This is `peer_count * replicas` minus any hash collisions.
    pub fn vnode_count(&self) -> usize {
        self.vnodes.len()
    }

    /// Return the number of positions each peer gets.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Return all peers, in insertion order.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("peers", &self.peers)
            .field("replicas", &self.replicas)
            .field("vnodes", &self.vnodes.len())
            .finish()
    }
}
