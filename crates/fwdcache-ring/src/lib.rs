//! Consistent hashing ring for deterministic resource placement.
//!
//! This crate implements the hash ring that maps a resource key (an absolute
//! URL) to the single peer that owns it. Each peer is placed on the ring
//! several times (replicas, or virtual nodes), at positions derived from
//! `hash(replica_index ++ peer)`. A key is owned by the first ring position
//! greater than or equal to its own hash, wrapping around to the smallest
//! position.
//!
//! Adding or removing one peer from an `N`-peer ring remaps only about
//! `1 / (N + 1)` of the keys, which is what makes shard ownership stable
//! across membership changes.

mod ring;

pub use ring::{DEFAULT_REPLICAS, HashFn, Ring, crc32};
