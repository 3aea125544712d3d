//! Catalog backed by the `products` table.

use super::{CatalogEntry, CatalogLookup};
use crate::error::CartError;
use crate::ids::ProductId;
use crate::money::{Currency, Money};
use serde::Deserialize;
use std::sync::Arc;
use turbo_db::{params, Db};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS products (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    price_minor INTEGER NOT NULL,
    currency    TEXT NOT NULL
);
";

#[derive(Debug, Deserialize)]
struct ProductRow {
    name: String,
    price_minor: i64,
    currency: String,
}

/// Read-mostly product lookup over SQLite.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db: Arc<Db>,
}

impl SqliteCatalog {
    /// Open the catalog, creating its table if needed.
    pub fn open(db: Arc<Db>) -> Result<Self, CartError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }

    /// Insert or replace a product. Used for seeding.
    pub fn upsert(&self, product_id: &ProductId, entry: &CatalogEntry) -> Result<(), CartError> {
        self.db.execute(
            "INSERT INTO products (id, name, price_minor, currency) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price_minor = excluded.price_minor,
                currency = excluded.currency",
            params![
                product_id.as_str(),
                entry.name.as_str(),
                entry.unit_price.amount_minor,
                entry.unit_price.currency.code()
            ],
        )?;
        tracing::debug!(product_id = %product_id, "catalog entry upserted");
        Ok(())
    }

    /// Remove a product. Returns whether it existed.
    pub fn delete(&self, product_id: &ProductId) -> Result<bool, CartError> {
        let changed = self
            .db
            .execute("DELETE FROM products WHERE id = ?", params![product_id.as_str()])?;
        Ok(changed > 0)
    }
}

impl CatalogLookup for SqliteCatalog {
    fn resolve(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>, CartError> {
        let row: Option<ProductRow> = self.db.query_optional(
            "SELECT name, price_minor, currency FROM products WHERE id = ?",
            params![product_id.as_str()],
        )?;

        row.map(|row| {
            let currency = Currency::from_code(&row.currency).ok_or_else(|| {
                CartError::Catalog(format!(
                    "product {product_id} has unknown currency {}",
                    row.currency
                ))
            })?;
            Ok(CatalogEntry::new(row.name, Money::new(row.price_minor, currency)))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SqliteCatalog {
        SqliteCatalog::open(Arc::new(Db::open_in_memory().unwrap())).unwrap()
    }

    #[test]
    fn test_upsert_then_resolve() {
        let catalog = catalog();
        let id = ProductId::new("7");
        catalog
            .upsert(&id, &CatalogEntry::new("Teapot", Money::new(1250, Currency::USD)))
            .unwrap();
        catalog
            .upsert(&id, &CatalogEntry::new("Blue teapot", Money::new(1300, Currency::USD)))
            .unwrap();

        let entry = catalog.resolve(&id).unwrap().unwrap();
        assert_eq!(entry.name, "Blue teapot");
        assert_eq!(entry.unit_price, Money::new(1300, Currency::USD));
    }

    #[test]
    fn test_unknown_product() {
        assert!(catalog().resolve(&ProductId::new("missing")).unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let catalog = catalog();
        let id = ProductId::new("7");
        catalog
            .upsert(&id, &CatalogEntry::new("Teapot", Money::new(1250, Currency::USD)))
            .unwrap();
        assert!(catalog.delete(&id).unwrap());
        assert!(!catalog.delete(&id).unwrap());
    }
}
