//! The caching [`Transport`].

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use fwdcache_net::{Transport, TransportError, clone_request};
use fwdcache_store::ByteCache;
use http::header::{ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RANGE};
use http::{Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use crate::cache_control::CacheControl;
use crate::entry::Entry;
use crate::freshness::{Freshness, can_stale_on_error, freshness};

/// Statuses cacheable without explicit freshness information, as listed by
/// RFC 7231 section 6.1.
const CACHEABLE_STATUS: &[u16] = &[200, 203, 204, 300, 301, 404, 405, 410, 414, 501];

/// Key a request is cached under: the absolute URL for `GET`, the method
/// and URL otherwise.
pub fn cache_key(req: &Request<Bytes>) -> String {
    if req.method() == Method::GET {
        req.uri().to_string()
    } else {
        format!("{} {}", req.method(), req.uri())
    }
}

fn is_cacheable(req: &Request<Bytes>) -> bool {
    (req.method() == Method::GET || req.method() == Method::HEAD)
        && !req.headers().contains_key(RANGE)
}

fn is_unsafe(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn can_store(req_cc: &CacheControl, resp: &Response<Bytes>) -> bool {
    let resp_cc = CacheControl::parse(resp.headers());
    if req_cc.has("no-store") || resp_cc.has("no-store") {
        return false;
    }
    if !CACHEABLE_STATUS.contains(&resp.status().as_u16()) {
        return false;
    }

    let headers = resp.headers();
    let explicitly_fresh = resp_cc.has("max-age") || headers.contains_key(EXPIRES);
    let has_validator = headers.contains_key(ETAG) || headers.contains_key(LAST_MODIFIED);
    explicitly_fresh || has_validator
}

fn gateway_timeout() -> Response<Bytes> {
    let mut resp = Response::new(Bytes::new());
    *resp.status_mut() = StatusCode::GATEWAY_TIMEOUT;
    resp
}

/// Copy of `req` carrying the validators of `entry`, if it has any the
/// client did not already send.
fn conditional_request(req: &Request<Bytes>, entry: &Entry) -> Option<Request<Bytes>> {
    let mut conditional: Option<Request<Bytes>> = None;

    if let Some(etag) = entry.headers.get(ETAG) {
        if !req.headers().contains_key(IF_NONE_MATCH) {
            conditional
                .get_or_insert_with(|| clone_request(req))
                .headers_mut()
                .insert(IF_NONE_MATCH, etag.clone());
        }
    }
    if let Some(last_modified) = entry.headers.get(LAST_MODIFIED) {
        if !req.headers().contains_key(IF_MODIFIED_SINCE) {
            conditional
                .get_or_insert_with(|| clone_request(req))
                .headers_mut()
                .insert(IF_MODIFIED_SINCE, last_modified.clone());
        }
    }

    conditional
}

/// What a lookup with a stored entry produced.
enum Outcome {
    /// Answered from the cache; nothing to store.
    Served(Response<Bytes>),
    /// Came from the network (possibly a refreshed entry); run the storage rules.
    Fetched(Response<Bytes>),
}

/// A [`Transport`] that serves and stores responses through a [`ByteCache`].
///
/// `GET` and `HEAD` requests without a `Range` header are cacheable; every
/// other request passes straight through, and unsafe methods drop any
/// entry stored for their URL. Failures of the byte cache never fail a
/// request: they are logged and handled as misses.
pub struct CachingTransport {
    inner: Arc<dyn Transport>,
    cache: Arc<dyn ByteCache>,
}

impl CachingTransport {
    /// Cache the responses of `inner` in `cache`.
    pub fn new(inner: Arc<dyn Transport>, cache: Arc<dyn ByteCache>) -> Self {
        Self { inner, cache }
    }

    async fn load(&self, key: &str) -> Option<Entry> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match Entry::decode(&raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key, %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, %e, "cache read failed");
                None
            }
        }
    }

    async fn store(&self, key: &str, entry: &Entry) {
        let raw = match entry.encode() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, %e, "failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, Bytes::from(raw)).await {
            warn!(key, %e, "cache write failed");
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!(key, %e, "cache delete failed");
        }
    }

    /// Go to the network for a request that has a stored, non-fresh entry.
    async fn revalidate(
        &self,
        req: &Request<Bytes>,
        key: &str,
        mut entry: Entry,
        state: Freshness,
        now: SystemTime,
    ) -> Result<Outcome, TransportError> {
        let conditional = match state {
            Freshness::Stale => conditional_request(req, &entry),
            _ => None,
        };
        let result = self
            .inner
            .round_trip(conditional.as_ref().unwrap_or(req))
            .await;

        match result {
            Ok(resp) if resp.status() == StatusCode::NOT_MODIFIED && conditional.is_some() => {
                debug!(key, "cache entry revalidated");
                entry.refresh(resp.headers());
                Ok(Outcome::Fetched(entry.into_response()))
            }
            Ok(resp)
                if resp.status().is_server_error()
                    && can_stale_on_error(&entry.headers, req.headers(), now) =>
            {
                warn!(key, status = %resp.status(), "origin failing, serving stale entry");
                Ok(Outcome::Served(entry.into_response()))
            }
            Ok(resp) => Ok(Outcome::Fetched(resp)),
            Err(e) if can_stale_on_error(&entry.headers, req.headers(), now) => {
                warn!(key, %e, "origin unreachable, serving stale entry");
                Ok(Outcome::Served(entry.into_response()))
            }
            Err(e) => {
                self.evict(key).await;
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for CachingTransport {
    async fn round_trip(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        if !is_cacheable(req) {
            let resp = self.inner.round_trip(req).await?;
            if is_unsafe(req.method()) && !resp.status().is_server_error() {
                let url = req.uri().to_string();
                self.evict(&url).await;
                self.evict(&format!("{} {url}", Method::HEAD)).await;
            }
            return Ok(resp);
        }

        let key = cache_key(req);
        let now = SystemTime::now();
        let req_cc = CacheControl::parse_request(req.headers());
        let cached = self.load(&key).await.filter(|entry| entry.matches(req));

        let resp = match cached {
            None if req_cc.has("only-if-cached") => return Ok(gateway_timeout()),
            None => {
                debug!(key, "cache miss");
                self.inner.round_trip(req).await?
            }
            Some(entry) => match freshness(&entry.headers, req.headers(), now) {
                Freshness::Fresh => {
                    debug!(key, "cache hit");
                    return Ok(entry.into_response());
                }
                state => match self.revalidate(req, &key, entry, state, now).await? {
                    Outcome::Served(resp) => return Ok(resp),
                    Outcome::Fetched(resp) => resp,
                },
            },
        };

        if can_store(&req_cc, &resp) {
            self.store(&key, &Entry::capture(req, &resp, now)).await;
        } else {
            self.evict(&key).await;
        }
        Ok(resp)
    }
}
