//! Errors of the boundary proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fwdcache_net::TransportError;

/// Why the boundary proxy refused or failed a request.
///
/// Every variant answers `502 Bad Gateway` with an empty body: the caller
/// is another peer acting as a gateway, and a bad request from it is a
/// failure of that gateway.
#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    /// The request was not addressed to the boundary path.
    #[error("wrong path: {path}")]
    WrongPath {
        /// Path that was requested.
        path: String,
    },

    /// The `q` parameter is absent or empty.
    #[error("missing target url")]
    MissingTarget,

    /// The query contains a `%` not followed by two hex digits.
    #[error("malformed percent-encoding in query")]
    MalformedEscape,

    /// The `q` parameter is not an absolute http(s) URL.
    #[error("invalid target url {target}: {reason}")]
    InvalidTarget {
        /// Decoded value of `q`.
        target: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Reading the inbound body failed.
    #[error("reading request body: {0}")]
    Body(TransportError),

    /// The origin could not be reached through the cache.
    #[error("upstream error: {0}")]
    Upstream(TransportError),
}

impl BoundaryError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for BoundaryError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}
