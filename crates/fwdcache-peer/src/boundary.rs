//! The boundary proxy: the inbound side of a peer.
//!
//! A peer serves exactly one path. Requests arrive as
//! `GET {path}?q={percent-encoded absolute url}`; the proxy rewrites them to
//! target that URL and dispatches them through the caching transport, so
//! everything the pool fetches is subject to HTTP caching rules.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request as AxumRequest, State};
use axum::response::{IntoResponse, Response as AxumResponse};
use bytes::Bytes;
use fwdcache_httpcache::CachingTransport;
use fwdcache_net::{BufferPool, Transport, collect_body, strip_hop_by_hop};
use fwdcache_store::ByteCache;
use http::header::{CONTENT_LENGTH, HOST};
use http::{HeaderValue, Method, Request, Response, Uri};
use tracing::{debug, warn};
use url::Url;

use crate::error::BoundaryError;

/// Validates inbound shard requests and serves them through the cache.
pub struct BoundaryProxy {
    path: String,
    transport: Arc<dyn Transport>,
    buffers: Option<BufferPool>,
}

impl BoundaryProxy {
    /// Serve `path`, fetching from origins through `origin` and caching
    /// responses in `cache`.
    pub fn new(
        path: impl Into<String>,
        origin: Arc<dyn Transport>,
        cache: Arc<dyn ByteCache>,
    ) -> Self {
        Self {
            path: path.into(),
            transport: Arc::new(CachingTransport::new(origin, cache)),
            buffers: None,
        }
    }

    /// Drain inbound bodies through `pool`.
    pub fn with_buffer_pool(mut self, pool: BufferPool) -> Self {
        self.buffers = Some(pool);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The caching transport requests are dispatched through.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Handle a fully buffered inbound request.
    pub async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, BoundaryError> {
        if req.uri().path() != self.path {
            return Err(BoundaryError::WrongPath {
                path: req.uri().path().to_string(),
            });
        }
        let target = parse_target(req.uri().query())?;
        let is_head = req.method() == Method::HEAD;

        let origin_req = origin_request(req, &target)?;
        debug!(url = %target, "boundary request");

        let mut resp = self
            .transport
            .round_trip(&origin_req)
            .await
            .map_err(|e| {
                warn!(url = %target, %e, "origin request failed");
                BoundaryError::Upstream(e)
            })?;

        strip_hop_by_hop(resp.headers_mut());
        if !is_head {
            // The body is fully buffered; the server frames it itself.
            resp.headers_mut().remove(CONTENT_LENGTH);
        }
        Ok(resp)
    }

    /// Axum router answering every path: the boundary path is proxied,
    /// anything else is refused.
    pub fn into_router(self: Arc<Self>) -> axum::Router {
        axum::Router::new().fallback(serve).with_state(self)
    }
}

async fn serve(State(proxy): State<Arc<BoundaryProxy>>, req: AxumRequest) -> AxumResponse {
    let (parts, body) = req.into_parts();
    let body = match collect_body(body, proxy.buffers.as_ref()).await {
        Ok(body) => body,
        Err(e) => return BoundaryError::Body(e).into_response(),
    };

    match proxy.handle(Request::from_parts(parts, body)).await {
        Ok(resp) => resp.map(Body::from),
        Err(e) => {
            debug!(%e, "boundary request refused");
            e.into_response()
        }
    }
}

/// Check that every `%` in `raw` starts a two-hex-digit escape.
fn validate_escapes(raw: &str) -> Result<(), BoundaryError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(BoundaryError::MalformedEscape);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Extract and validate the target URL from the raw query string.
///
/// Pairs are separated by `&` only; `;` is part of a value, as in the
/// WHATWG `application/x-www-form-urlencoded` rules.
fn parse_target(query: Option<&str>) -> Result<Url, BoundaryError> {
    let query = query.unwrap_or_default();

    let mut value = None;
    for pair in query.split('&') {
        let Some((key, decoded)) = form_urlencoded::parse(pair.as_bytes()).next() else {
            continue;
        };
        if key != "q" {
            continue;
        }
        let raw = pair.split_once('=').map(|(_, v)| v).unwrap_or_default();
        validate_escapes(raw)?;
        value = Some(decoded.into_owned());
        break;
    }

    let target = value
        .filter(|v| !v.is_empty())
        .ok_or(BoundaryError::MissingTarget)?;
    let invalid = |reason: String| BoundaryError::InvalidTarget {
        target: target.clone(),
        reason,
    };

    let url = Url::parse(&target).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Rewrite an inbound boundary request into a request for `target`.
fn origin_request(req: Request<Bytes>, target: &Url) -> Result<Request<Bytes>, BoundaryError> {
    let invalid = |reason: String| BoundaryError::InvalidTarget {
        target: target.to_string(),
        reason,
    };

    let uri: Uri = target
        .as_str()
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    let host = match (target.host_str(), target.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };
    let host = HeaderValue::from_str(&host).map_err(|e| invalid(e.to_string()))?;

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    parts.version = http::Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    parts.headers.insert(HOST, host);
    Ok(Request::from_parts(parts, body))
}
