//! HTTP caching transport for fwdcache.
//!
//! [`CachingTransport`] wraps another [`Transport`] and answers requests from
//! a [`ByteCache`] whenever RFC 7234 freshness rules allow it. Stale entries
//! with validators are revalidated with a conditional request, and entries
//! may be served past their lifetime when `stale-if-error` permits and the
//! origin is failing.
//!
//! Responses answered from the cache carry [`X_FROM_CACHE`]` = 1`.
//!
//! [`Transport`]: fwdcache_net::Transport
//! [`ByteCache`]: fwdcache_store::ByteCache
//! [`X_FROM_CACHE`]: fwdcache_net::X_FROM_CACHE

mod cache_control;
mod entry;
mod freshness;
mod transport;

pub use transport::{CachingTransport, cache_key};
