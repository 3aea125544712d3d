//! Cart error types.

use crate::ids::{ProductId, UserId};
use thiserror::Error;
use turbo_db::DbError;
use turbo_session::SessionError;

/// Errors that can occur in cart operations.
#[derive(Error, Debug)]
pub enum CartError {
    /// Product id does not resolve in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Optimistic retries against the cart version were exhausted.
    #[error("Concurrent modification of cart for {owner}: gave up after {attempts} attempts")]
    ConcurrentModification { owner: UserId, attempts: u32 },

    /// Durable storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Catalog lookup failure other than a missing product.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Currency mismatch.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Arithmetic overflow in a quantity or money calculation.
    #[error("Arithmetic overflow in cart calculation")]
    Overflow,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CartError {
    /// Check if the caller may simply try the same operation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            CartError::ConcurrentModification { .. } => true,
            CartError::Storage(e) => e.is_transient(),
            CartError::Session(SessionError::ConcurrentModification(_)) => true,
            _ => false,
        }
    }

    /// Check if the error is caused by caller input rather than the system.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, CartError::ProductNotFound(_))
    }
}

impl From<serde_json::Error> for CartError {
    fn from(e: serde_json::Error) -> Self {
        CartError::Session(SessionError::SerializeError(e))
    }
}
