//! Freshness evaluation of stored responses.

use std::time::{Duration, SystemTime};

use http::header::{AGE, DATE, EXPIRES, HeaderName};
use http::HeaderMap;

use crate::cache_control::{CacheControl, delta_seconds};

/// How a stored response may be used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    /// Serve the stored response without contacting the origin.
    Fresh,
    /// Revalidate with the origin before serving.
    Stale,
    /// The request asked to bypass the cache.
    Transparent,
}

pub(crate) fn header_date(headers: &HeaderMap, name: HeaderName) -> Option<SystemTime> {
    let value = headers.get(name)?.to_str().ok()?;
    httpdate::parse_http_date(value).ok()
}

/// Age of a response: time since its `Date` plus any `Age` it arrived with.
fn current_age(resp: &HeaderMap, date: SystemTime, now: SystemTime) -> Duration {
    let apparent = now.duration_since(date).unwrap_or(Duration::ZERO);
    let received = resp
        .get(AGE)
        .and_then(|v| v.to_str().ok())
        .and_then(delta_seconds)
        .unwrap_or(Duration::ZERO);
    apparent.saturating_add(received)
}

/// Decide whether the stored response with headers `resp` can answer a
/// request with headers `req` at time `now`.
pub(crate) fn freshness(resp: &HeaderMap, req: &HeaderMap, now: SystemTime) -> Freshness {
    let resp_cc = CacheControl::parse(resp);
    let req_cc = CacheControl::parse_request(req);

    if req_cc.has("no-cache") {
        return Freshness::Transparent;
    }
    if resp_cc.has("no-cache") {
        return Freshness::Stale;
    }
    if req_cc.has("only-if-cached") {
        return Freshness::Fresh;
    }

    let Some(date) = header_date(resp, DATE) else {
        return Freshness::Stale;
    };
    let mut age = current_age(resp, date, now);

    let mut lifetime = match resp_cc.seconds("max-age") {
        Some(max_age) => max_age,
        None => header_date(resp, EXPIRES)
            .and_then(|expires| expires.duration_since(date).ok())
            .unwrap_or(Duration::ZERO),
    };
    if let Some(max_age) = req_cc.seconds("max-age") {
        lifetime = max_age;
    }
    if let Some(min_fresh) = req_cc.seconds("min-fresh") {
        age = age.saturating_add(min_fresh);
    }

    // must-revalidate forbids serving past the lifetime, whatever the client tolerates.
    if !resp_cc.has("must-revalidate") {
        if let Some(max_stale) = req_cc.value("max-stale") {
            if max_stale.is_empty() {
                return Freshness::Fresh;
            }
            if let Some(max_stale) = delta_seconds(max_stale) {
                age = age.saturating_sub(max_stale);
            }
        }
    }

    if lifetime > age {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}

/// `stale-if-error` limit: `Some(None)` is unbounded.
fn stale_if_error(cc: &CacheControl) -> Option<Option<Duration>> {
    let value = cc.value("stale-if-error")?;
    if value.is_empty() {
        return Some(None);
    }
    delta_seconds(value).map(Some)
}

/// Whether the stored response may be served because the origin failed.
///
/// The request's `stale-if-error` overrides the response's.
pub(crate) fn can_stale_on_error(resp: &HeaderMap, req: &HeaderMap, now: SystemTime) -> bool {
    let req_cc = CacheControl::parse_request(req);
    let resp_cc = CacheControl::parse(resp);

    match stale_if_error(&req_cc).or_else(|| stale_if_error(&resp_cc)) {
        None => false,
        Some(None) => true,
        Some(Some(limit)) => match header_date(resp, DATE) {
            Some(date) => limit > now.duration_since(date).unwrap_or(Duration::ZERO),
            None => false,
        },
    }
}
