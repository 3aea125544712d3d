//! Engine and store configuration.

use crate::error::CartError;
use crate::money::Currency;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of optimistic attempts for a durable line write.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Reconciliation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attempts at a version-checked write before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts, in milliseconds. Zero retries immediately.
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Currency that every catalog price and view total is expressed in.
    #[serde(default)]
    pub currency: Currency,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: 0,
            currency: Currency::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), CartError> {
        if self.max_attempts == 0 {
            return Err(CartError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Attempt budget, never below one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause between attempts.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Durable cart store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Install the partial unique index that allows one OPEN cart per owner.
    ///
    /// Databases that already hold duplicates open without it; the index is
    /// installed once `normalize_all` has folded them.
    #[serde(default = "default_enforce_single_open_cart")]
    pub enforce_single_open_cart: bool,
}

fn default_enforce_single_open_cart() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enforce_single_open_cart: default_enforce_single_open_cart(),
        }
    }
}
