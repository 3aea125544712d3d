//! Session error types.

use thiserror::Error;

/// Errors that can occur when using the session store.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to serialize or deserialize a value.
    #[error("Serialization error: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Failed to perform store operation.
    #[error("Store operation failed: {0}")]
    StoreError(String),

    /// Session not found or expired.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Concurrent modification detected and retries ran out.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The store mutex was poisoned by a panicking holder.
    #[error("Session store poisoned")]
    Poisoned,
}
