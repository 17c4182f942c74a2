//! HTTP transport layer for fwdcache.
//!
//! Everything that moves a request somewhere and brings a response back
//! implements one trait, [`Transport`]: the real network client
//! ([`HttpTransport`]), the caching transport, the peer router, and test
//! doubles ([`FnTransport`]).
//!
//! Requests and responses carry fully buffered [`Bytes`] bodies. Bodies are
//! drained through an optional [`BufferPool`] to cut allocation churn on
//! busy peers.
//!
//! [`Bytes`]: bytes::Bytes

mod buffer;
mod error;
mod http_transport;
mod transport;

pub use buffer::{BufferPool, DEFAULT_BUFFER_SIZE, collect_body};
pub use error::TransportError;
pub use http_transport::HttpTransport;
pub use transport::{FnTransport, Transport, clone_request, strip_hop_by_hop};

/// Response header set to `1` on responses served from the cache.
pub const X_FROM_CACHE: &str = "x-from-cache";
