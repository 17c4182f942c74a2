//! `Cache-Control` directive parsing.

use std::collections::HashMap;
use std::time::Duration;

use http::HeaderMap;
use http::header::{CACHE_CONTROL, PRAGMA};

/// Largest delta-seconds value honored; larger values are clamped to it.
pub(crate) const MAX_DELTA_SECONDS: u64 = 1 << 31;

/// Parse an RFC 7234 delta-seconds value, clamping overflow to
/// [`MAX_DELTA_SECONDS`].
pub(crate) fn delta_seconds(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs = value
        .parse::<u64>()
        .unwrap_or(MAX_DELTA_SECONDS)
        .min(MAX_DELTA_SECONDS);
    Some(Duration::from_secs(secs))
}

/// Parsed `Cache-Control` directives, names lower-cased.
///
/// A directive without an argument maps to the empty string.
#[derive(Debug, Default)]
pub(crate) struct CacheControl {
    directives: HashMap<String, String>,
}

impl CacheControl {
    /// Parse every `Cache-Control` header in `headers`.
    ///
    /// When a directive repeats, the first occurrence wins.
    pub(crate) fn parse(headers: &HeaderMap) -> Self {
        let mut directives = HashMap::new();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for part in value.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let (name, arg) = match part.split_once('=') {
                    Some((name, arg)) => (name.trim(), arg.trim().trim_matches('"')),
                    None => (part, ""),
                };
                directives
                    .entry(name.to_ascii_lowercase())
                    .or_insert_with(|| arg.to_string());
            }
        }
        Self { directives }
    }

    /// Parse request directives. `Pragma: no-cache` counts as `no-cache`
    /// when the request has no `Cache-Control` header.
    pub(crate) fn parse_request(headers: &HeaderMap) -> Self {
        let mut cc = Self::parse(headers);
        if !headers.contains_key(CACHE_CONTROL) {
            let pragma_no_cache = headers
                .get_all(PRAGMA)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .any(|d| d.trim().eq_ignore_ascii_case("no-cache"));
            if pragma_no_cache {
                cc.directives.insert("no-cache".to_string(), String::new());
            }
        }
        cc
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    /// Argument of `name`, empty when the directive has none.
    pub(crate) fn value(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    /// Argument of `name` as delta-seconds.
    pub(crate) fn seconds(&self, name: &str) -> Option<Duration> {
        delta_seconds(self.value(name)?)
    }
}
