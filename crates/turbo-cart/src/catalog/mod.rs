//! Line catalog lookup.
//!
//! The engine never trusts a caller-supplied name or price: every line is
//! resolved through a [`CatalogLookup`] at the moment it is written or viewed.

mod memory;
mod sqlite;

pub use memory::InMemoryCatalog;
pub use sqlite::SqliteCatalog;

use crate::error::CartError;
use crate::ids::ProductId;
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Authoritative display name and unit price of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Product display name.
    pub name: String,
    /// Price of one unit.
    pub unit_price: Money,
}

impl CatalogEntry {
    /// Create an entry.
    pub fn new(name: impl Into<String>, unit_price: Money) -> Self {
        Self {
            name: name.into(),
            unit_price,
        }
    }
}

/// Resolves product ids to catalog entries.
///
/// `Ok(None)` means the product does not exist; `Err` is reserved for the
/// lookup itself failing.
pub trait CatalogLookup: Send + Sync {
    /// Resolve a product.
    fn resolve(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>, CartError>;
}

impl<C: CatalogLookup + ?Sized> CatalogLookup for Arc<C> {
    fn resolve(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>, CartError> {
        (**self).resolve(product_id)
    }
}

impl<C: CatalogLookup + ?Sized> CatalogLookup for &C {
    fn resolve(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>, CartError> {
        (**self).resolve(product_id)
    }
}
