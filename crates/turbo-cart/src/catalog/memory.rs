//! In-process catalog for fixtures and tests.

use super::{CatalogEntry, CatalogLookup};
use crate::error::CartError;
use crate::ids::ProductId;
use crate::money::Money;
use std::collections::HashMap;
use std::sync::RwLock;

/// Catalog held in a map.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashMap<ProductId, CatalogEntry>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_product(
        self,
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
    ) -> Self {
        self.insert(product_id, name, unit_price);
        self
    }

    /// Insert or replace a product.
    pub fn insert(
        &self,
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
    ) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(product_id.into(), CatalogEntry::new(name, unit_price));
        }
    }

    /// Remove a product, as if it was deleted from the catalog.
    pub fn remove(&self, product_id: &ProductId) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(product_id).is_some())
            .unwrap_or(false)
    }
}

impl CatalogLookup for InMemoryCatalog {
    fn resolve(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>, CartError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CartError::Catalog("catalog lock poisoned".into()))?;
        Ok(entries.get(product_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    #[test]
    fn test_resolve_and_remove() {
        let catalog = InMemoryCatalog::new().with_product(
            "7",
            "Teapot",
            Money::new(1250, Currency::USD),
        );
        let entry = catalog.resolve(&ProductId::new("7")).unwrap().unwrap();
        assert_eq!(entry.name, "Teapot");

        assert!(catalog.remove(&ProductId::new("7")));
        assert!(catalog.resolve(&ProductId::new("7")).unwrap().is_none());
    }
}
