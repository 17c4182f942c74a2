//! Stored response entries and their byte encoding.

use std::time::SystemTime;

use bytes::Bytes;
use fwdcache_net::{X_FROM_CACHE, strip_hop_by_hop};
use http::header::{CONTENT_LENGTH, DATE, HeaderName, HeaderValue, VARY};
use http::{HeaderMap, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Errors decoding a stored entry.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EntryError {
    #[error("codec: {0}")]
    Codec(#[from] postcard::Error),

    #[error("invalid status: {0}")]
    Status(#[from] http::status::InvalidStatusCode),

    #[error("invalid header: {0}")]
    Header(String),
}

/// A response held in the cache.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    /// Request header values the response varies on, names lower-cased.
    varied: Vec<(String, Option<HeaderValue>)>,
    body: Bytes,
}

/// Wire form of [`Entry`].
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
    varied: Vec<(String, Option<Vec<u8>>)>,
    body: Vec<u8>,
}

/// Header names listed in every `Vary` header, lower-cased.
fn vary_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

impl Entry {
    /// Capture `resp`, recording the request headers it varies on.
    ///
    /// A response without a `Date` gets one stamped with `now`.
    pub(crate) fn capture(req: &Request<Bytes>, resp: &Response<Bytes>, now: SystemTime) -> Self {
        let mut headers = resp.headers().clone();
        headers.remove(X_FROM_CACHE);
        if !headers.contains_key(DATE) {
            if let Ok(date) = HeaderValue::from_str(&httpdate::fmt_http_date(now)) {
                headers.insert(DATE, date);
            }
        }

        let varied = vary_names(&headers)
            .into_iter()
            .map(|name| {
                let value = req.headers().get(name.as_str()).cloned();
                (name, value)
            })
            .collect();

        Self {
            status: resp.status(),
            headers,
            varied,
            body: resp.body().clone(),
        }
    }

    /// Whether `req` carries the same values for every varied header.
    ///
    /// `Vary: *` never matches.
    pub(crate) fn matches(&self, req: &Request<Bytes>) -> bool {
        self.varied
            .iter()
            .all(|(name, stored)| name != "*" && req.headers().get(name.as_str()) == stored.as_ref())
    }

    /// Merge end-to-end headers of a `304 Not Modified` into the entry.
    pub(crate) fn refresh(&mut self, not_modified: &HeaderMap) {
        let mut fresh = not_modified.clone();
        strip_hop_by_hop(&mut fresh);
        fresh.remove(CONTENT_LENGTH);
        fresh.remove(X_FROM_CACHE);

        for name in fresh.keys() {
            self.headers.remove(name);
        }
        for (name, value) in &fresh {
            self.headers.append(name.clone(), value.clone());
        }
    }

    /// Build the response served from this entry, marked as a cache hit.
    pub(crate) fn into_response(self) -> Response<Bytes> {
        let mut resp = Response::new(self.body);
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp.headers_mut()
            .insert(X_FROM_CACHE, HeaderValue::from_static("1"));
        resp
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, EntryError> {
        let stored = StoredEntry {
            status: self.status.as_u16(),
            headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
                .collect(),
            varied: self
                .varied
                .iter()
                .map(|(name, value)| (name.clone(), value.as_ref().map(|v| v.as_bytes().to_vec())))
                .collect(),
            body: self.body.to_vec(),
        };
        Ok(postcard::to_allocvec(&stored)?)
    }

    pub(crate) fn decode(raw: &[u8]) -> Result<Self, EntryError> {
        let stored: StoredEntry = postcard::from_bytes(raw)?;

        let mut headers = HeaderMap::with_capacity(stored.headers.len());
        for (name, value) in stored.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| EntryError::Header(e.to_string()))?;
            let value =
                HeaderValue::from_bytes(&value).map_err(|e| EntryError::Header(e.to_string()))?;
            headers.append(name, value);
        }

        let varied = stored
            .varied
            .into_iter()
            .map(|(name, value)| {
                let value = value
                    .map(|v| HeaderValue::from_bytes(&v))
                    .transpose()
                    .map_err(|e| EntryError::Header(e.to_string()))?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, EntryError>>()?;

        Ok(Self {
            status: StatusCode::from_u16(stored.status)?,
            headers,
            varied,
            body: Bytes::from(stored.body),
        })
    }
}
