//! Request routing and serving for a fwdcache pool.
//!
//! A pool is a set of cooperating peers, each identified by the base URL of
//! its boundary proxy. Every resource URL has exactly one owner, chosen on a
//! consistent-hash ring, so repeated requests for a resource land in the
//! same cache whichever peer they enter through.
//!
//! - [`Router`] picks the owner of a request and forwards a rewritten copy
//!   of it to `{owner}{path}?q={url}`. Without an identity of its own it is
//!   a client that takes no part in caching.
//! - [`BoundaryProxy`] serves `{path}?q={url}` on a peer: it validates the
//!   target and fetches it through the caching transport.
//! - [`Peer`] combines both; requests it owns skip the network entirely.

mod boundary;
mod config;
mod error;
mod peer;
mod router;


pub use boundary::BoundaryProxy;
pub use config::{DEFAULT_PATH, RouterConfig};
pub use error::BoundaryError;
pub use peer::{Peer, PeerBuilder};
pub use router::Router;
