//! Error types for byte store operations.

/// Errors that can occur during byte store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A background storage task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),
}
