//! Error types for transport operations.

/// Errors that can occur while sending a request through a [`Transport`].
///
/// [`Transport`]: crate::Transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The pool has no peers to route to.
    #[error("no peers in pool")]
    NoPeers,

    /// A peer identity is not a usable base URL.
    #[error("invalid peer url {peer}: {reason}")]
    InvalidPeer {
        /// The offending peer identity.
        peer: String,
        /// Why it could not be used.
        reason: String,
    },

    /// The request could not be built or converted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP client failed (connect, TLS, protocol, timeout).
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Reading a body failed.
    #[error("body error: {0}")]
    Body(String),
}
