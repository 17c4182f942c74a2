//! The [`Transport`] trait and helpers shared by its implementations.

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONNECTION;
use http::{HeaderMap, HeaderName, Request, Response};

use crate::error::TransportError;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Given a request, produce a response or fail.
///
/// The request is borrowed: an implementation that needs to change it
/// (rewrite the URL, add a validator) works on its own copy, so the
/// caller's request is always left untouched.
///
/// Cancellation needs no extra plumbing: dropping the returned future
/// abandons the call, at whatever depth of forwarding it has reached.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `req` and wait for the response.
    async fn round_trip(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        (**self).round_trip(req).await
    }
}

/// A [`Transport`] backed by a plain closure.
///
/// Handy for adapters and for test doubles that record or fake responses.
pub struct FnTransport<F> {
    f: F,
}

impl<F> FnTransport<F>
where
    F: Fn(&Request<Bytes>) -> Result<Response<Bytes>, TransportError> + Send + Sync,
{
    /// Wrap `f` as a transport.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(&Request<Bytes>) -> Result<Response<Bytes>, TransportError> + Send + Sync,
{
    async fn round_trip(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        (self.f)(req)
    }
}

/// Deep-copy a request: method, URI, version, headers and body.
///
/// Extensions are not carried over.
pub fn clone_request(req: &Request<Bytes>) -> Request<Bytes> {
    let mut out = Request::new(req.body().clone());
    *out.method_mut() = req.method().clone();
    *out.uri_mut() = req.uri().clone();
    *out.version_mut() = req.version();
    *out.headers_mut() = req.headers().clone();
    out
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
