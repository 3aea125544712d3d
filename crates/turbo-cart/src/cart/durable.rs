//! Durable carts for authenticated owners.
//!
//! Two tables: `carts` holds one header per cart with its status and
//! version token, `cart_lines` holds at most one line per product and cart.
//! Every line mutation bumps the owning cart's version inside the same
//! transaction, which is what the engine's optimistic retries key on.

use crate::cart::model::{CartHeader, CartLine, CartStatus, CartVersion, FoldReport, OpenCarts};
use crate::config::StoreConfig;
use crate::error::CartError;
use crate::ids::{CartId, ProductId, UserId};
use serde::Deserialize;
use std::sync::Arc;
use turbo_db::{params, Db, DbError, Tx};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS carts (
    id         TEXT PRIMARY KEY,
    owner_id   TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'OPEN',
    version    INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_carts_owner ON carts(owner_id, status);

CREATE TABLE IF NOT EXISTS cart_lines (
    cart_id    TEXT NOT NULL REFERENCES carts(id),
    product_id TEXT NOT NULL,
    quantity   INTEGER NOT NULL CHECK (quantity > 0),
    UNIQUE (cart_id, product_id)
);
";

const SINGLE_OPEN_CART_INDEX: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS uq_carts_one_open_per_owner
    ON carts(owner_id, status) WHERE status = 'OPEN'
";

const HEADER_COLUMNS: &str = "id, owner_id, status, version, created_at, updated_at";

/// A single line write, applied under a version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineWrite {
    /// Create a line that does not exist yet.
    Insert { product_id: ProductId, quantity: i64 },
    /// Overwrite an existing line's quantity.
    Set { product_id: ProductId, quantity: i64 },
    /// Delete a line.
    Delete { product_id: ProductId },
}

/// Storage contract for durable carts.
///
/// Implementations enforce one line per `(cart, product)` and, once healed,
/// one OPEN cart per owner. Mutating operations are each atomic.
pub trait DurableCartStore: Send + Sync {
    /// OPEN carts of an owner, most recently updated first.
    fn find_open_carts(&self, owner: &UserId) -> Result<OpenCarts, CartError>;

    /// Create an OPEN cart. Fails with a constraint violation if the owner
    /// already has one and uniqueness is enforced.
    fn create_cart(&self, owner: &UserId) -> Result<CartHeader, CartError>;

    fn find_line(&self, cart: &CartId, product_id: &ProductId) -> Result<Option<CartLine>, CartError>;

    /// All lines of a cart, in insertion order.
    fn lines(&self, cart: &CartId) -> Result<Vec<CartLine>, CartError>;

    fn insert_line(&self, cart: &CartId, product_id: &ProductId, quantity: i64) -> Result<(), CartError>;

    /// Returns whether the line existed.
    fn update_line_quantity(
        &self,
        cart: &CartId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<bool, CartError>;

    /// Returns whether the line existed.
    fn delete_line(&self, cart: &CartId, product_id: &ProductId) -> Result<bool, CartError>;

    /// Delete a cart and its lines. Returns whether the cart existed.
    fn delete_cart(&self, cart: &CartId) -> Result<bool, CartError>;

    /// Apply `write` only if the cart is still OPEN at `expected`.
    ///
    /// Returns the new version, or `None` when the cart moved on.
    fn write_line_if_version(
        &self,
        cart: &CartId,
        expected: CartVersion,
        write: &LineWrite,
    ) -> Result<Option<CartVersion>, CartError>;

    /// Fold every OPEN cart of `owner` into the most recent one.
    ///
    /// Runs as one exclusive transaction that re-reads the OPEN carts, so a
    /// fold that already happened elsewhere is not repeated. Returns `None`
    /// when there was nothing to fold.
    fn fold_duplicates(&self, owner: &UserId) -> Result<Option<FoldReport>, CartError>;

    /// Owners that currently hold more than one OPEN cart.
    fn owners_with_duplicate_open_carts(&self) -> Result<Vec<UserId>, CartError>;

    /// Install the one-OPEN-cart-per-owner uniqueness, if configured.
    ///
    /// Returns whether the constraint is in place afterwards.
    fn ensure_single_open_cart_index(&self) -> Result<bool, CartError>;
}

impl<S: DurableCartStore + ?Sized> DurableCartStore for Arc<S> {
    fn find_open_carts(&self, owner: &UserId) -> Result<OpenCarts, CartError> {
        (**self).find_open_carts(owner)
    }

    fn create_cart(&self, owner: &UserId) -> Result<CartHeader, CartError> {
        (**self).create_cart(owner)
    }

    fn find_line(&self, cart: &CartId, product_id: &ProductId) -> Result<Option<CartLine>, CartError> {
        (**self).find_line(cart, product_id)
    }

    fn lines(&self, cart: &CartId) -> Result<Vec<CartLine>, CartError> {
        (**self).lines(cart)
    }

    fn insert_line(&self, cart: &CartId, product_id: &ProductId, quantity: i64) -> Result<(), CartError> {
        (**self).insert_line(cart, product_id, quantity)
    }

    fn update_line_quantity(
        &self,
        cart: &CartId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<bool, CartError> {
        (**self).update_line_quantity(cart, product_id, quantity)
    }

    fn delete_line(&self, cart: &CartId, product_id: &ProductId) -> Result<bool, CartError> {
        (**self).delete_line(cart, product_id)
    }

    fn delete_cart(&self, cart: &CartId) -> Result<bool, CartError> {
        (**self).delete_cart(cart)
    }

    fn write_line_if_version(
        &self,
        cart: &CartId,
        expected: CartVersion,
        write: &LineWrite,
    ) -> Result<Option<CartVersion>, CartError> {
        (**self).write_line_if_version(cart, expected, write)
    }

    fn fold_duplicates(&self, owner: &UserId) -> Result<Option<FoldReport>, CartError> {
        (**self).fold_duplicates(owner)
    }

    fn owners_with_duplicate_open_carts(&self) -> Result<Vec<UserId>, CartError> {
        (**self).owners_with_duplicate_open_carts()
    }

    fn ensure_single_open_cart_index(&self) -> Result<bool, CartError> {
        (**self).ensure_single_open_cart_index()
    }
}

#[derive(Debug, Deserialize)]
struct OwnerRow {
    owner_id: UserId,
}

#[derive(Debug, Deserialize)]
struct QuantityRow {
    quantity: i64,
}

/// SQLite implementation of [`DurableCartStore`].
#[derive(Debug, Clone)]
pub struct SqliteCartStore {
    db: Arc<Db>,
    config: StoreConfig,
}

impl SqliteCartStore {
    /// Open the store, creating the schema if needed.
    ///
    /// When uniqueness is enforced but duplicates already exist, the store
    /// still opens; the constraint is installed by a later normalization.
    pub fn open(db: Arc<Db>, config: StoreConfig) -> Result<Self, CartError> {
        db.execute_batch(SCHEMA)?;
        let store = Self { db, config };
        store.ensure_single_open_cart_index()?;
        Ok(store)
    }

    /// The underlying database.
    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    /// The store settings.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run `f` in a write transaction and bump the cart's version with it.
    fn mutate<T>(
        &self,
        cart: &CartId,
        f: impl FnOnce(&Tx<'_>) -> Result<T, CartError>,
    ) -> Result<T, CartError> {
        self.db.transaction(|tx| -> Result<_, CartError> {
            let value = f(tx)?;
            touch(tx, cart)?;
            Ok(value)
        })
    }
}

impl DurableCartStore for SqliteCartStore {
    fn find_open_carts(&self, owner: &UserId) -> Result<OpenCarts, CartError> {
        let headers: Vec<CartHeader> = self.db.query_as(
            &open_carts_sql(),
            params![owner.as_str()],
        )?;
        Ok(OpenCarts::from_ordered(headers))
    }

    fn create_cart(&self, owner: &UserId) -> Result<CartHeader, CartError> {
        let now = now_millis();
        let header = CartHeader {
            id: CartId::generate(),
            owner_id: owner.clone(),
            status: CartStatus::Open,
            version: CartVersion(0),
            created_at: now,
            updated_at: now,
        };
        self.db.execute(
            "INSERT INTO carts (id, owner_id, status, version, created_at, updated_at)
             VALUES (?, ?, ?, 0, ?, ?)",
            params![
                header.id.as_str(),
                owner.as_str(),
                header.status.as_str(),
                now,
                now
            ],
        )?;
        tracing::debug!(owner = %owner, cart_id = %header.id, "durable cart created");
        Ok(header)
    }

    fn find_line(&self, cart: &CartId, product_id: &ProductId) -> Result<Option<CartLine>, CartError> {
        Ok(self.db.query_optional(
            "SELECT cart_id, product_id, quantity FROM cart_lines
             WHERE cart_id = ? AND product_id = ?",
            params![cart.as_str(), product_id.as_str()],
        )?)
    }

    fn lines(&self, cart: &CartId) -> Result<Vec<CartLine>, CartError> {
        Ok(self.db.query_as(
            "SELECT cart_id, product_id, quantity FROM cart_lines
             WHERE cart_id = ? ORDER BY rowid",
            params![cart.as_str()],
        )?)
    }

    fn insert_line(&self, cart: &CartId, product_id: &ProductId, quantity: i64) -> Result<(), CartError> {
        self.mutate(cart, |tx| {
            insert_line(tx, cart, product_id, quantity)?;
            Ok(())
        })
    }

    fn update_line_quantity(
        &self,
        cart: &CartId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<bool, CartError> {
        self.mutate(cart, |tx| Ok(set_line(tx, cart, product_id, quantity)? > 0))
    }

    fn delete_line(&self, cart: &CartId, product_id: &ProductId) -> Result<bool, CartError> {
        self.mutate(cart, |tx| Ok(delete_line(tx, cart, product_id)? > 0))
    }

    fn delete_cart(&self, cart: &CartId) -> Result<bool, CartError> {
        self.db.transaction(|tx| -> Result<_, CartError> {
            tx.execute("DELETE FROM cart_lines WHERE cart_id = ?", params![cart.as_str()])?;
            let deleted = tx.execute("DELETE FROM carts WHERE id = ?", params![cart.as_str()])?;
            Ok(deleted > 0)
        })
    }

    fn write_line_if_version(
        &self,
        cart: &CartId,
        expected: CartVersion,
        write: &LineWrite,
    ) -> Result<Option<CartVersion>, CartError> {
        let expected_param = version_param(expected)?;
        self.db.transaction(|tx| -> Result<_, CartError> {
            let claimed = tx.execute(
                "UPDATE carts SET version = version + 1, updated_at = ?
                 WHERE id = ? AND version = ? AND status = 'OPEN'",
                params![now_millis(), cart.as_str(), expected_param],
            )?;
            if claimed == 0 {
                return Ok(None);
            }

            match write {
                LineWrite::Insert { product_id, quantity } => {
                    insert_line(tx, cart, product_id, *quantity)?;
                }
                LineWrite::Set { product_id, quantity } => {
                    set_line(tx, cart, product_id, *quantity)?;
                }
                LineWrite::Delete { product_id } => {
                    delete_line(tx, cart, product_id)?;
                }
            }
            Ok(Some(CartVersion(expected.0 + 1)))
        })
    }

    fn fold_duplicates(&self, owner: &UserId) -> Result<Option<FoldReport>, CartError> {
        self.db.transaction(|tx| -> Result<_, CartError> {
            let mut headers: Vec<CartHeader> =
                tx.query_as(&open_carts_sql(), params![owner.as_str()])?;
            if headers.len() < 2 {
                return Ok(None);
            }
            let duplicates = headers.split_off(1);
            let keeper = headers.remove(0);

            let mut lines_moved = 0;
            let mut folded = Vec::with_capacity(duplicates.len());
            for duplicate in duplicates {
                let lines: Vec<CartLine> = tx.query_as(
                    "SELECT cart_id, product_id, quantity FROM cart_lines
                     WHERE cart_id = ? ORDER BY rowid",
                    params![duplicate.id.as_str()],
                )?;
                for line in &lines {
                    let existing: Option<QuantityRow> = tx.query_optional(
                        "SELECT quantity FROM cart_lines WHERE cart_id = ? AND product_id = ?",
                        params![keeper.id.as_str(), line.product_id.as_str()],
                    )?;
                    match existing {
                        Some(row) => {
                            let sum = row
                                .quantity
                                .checked_add(line.quantity)
                                .ok_or(CartError::Overflow)?;
                            set_line(tx, &keeper.id, &line.product_id, sum)?;
                        }
                        None => {
                            insert_line(tx, &keeper.id, &line.product_id, line.quantity)?;
                        }
                    }
                    lines_moved += 1;
                }

                tx.execute(
                    "DELETE FROM cart_lines WHERE cart_id = ?",
                    params![duplicate.id.as_str()],
                )?;
                tx.execute("DELETE FROM carts WHERE id = ?", params![duplicate.id.as_str()])?;
                folded.push(duplicate.id);
            }

            touch(tx, &keeper.id)?;
            let keeper: CartHeader = tx
                .query_optional(
                    &format!("SELECT {HEADER_COLUMNS} FROM carts WHERE id = ?"),
                    params![keeper.id.as_str()],
                )?
                .ok_or(DbError::NotFound)?;

            tracing::warn!(
                owner = %owner,
                keeper = %keeper.id,
                folded = folded.len(),
                lines_moved,
                "folded duplicate open carts"
            );
            Ok(Some(FoldReport {
                keeper,
                folded,
                lines_moved,
            }))
        })
    }

    fn owners_with_duplicate_open_carts(&self) -> Result<Vec<UserId>, CartError> {
        let rows: Vec<OwnerRow> = self.db.query_as(
            "SELECT owner_id FROM carts WHERE status = 'OPEN'
             GROUP BY owner_id HAVING COUNT(*) > 1 ORDER BY owner_id",
            &[],
        )?;
        Ok(rows.into_iter().map(|row| row.owner_id).collect())
    }

    fn ensure_single_open_cart_index(&self) -> Result<bool, CartError> {
        if !self.config.enforce_single_open_cart {
            return Ok(false);
        }
        match self.db.execute_batch(SINGLE_OPEN_CART_INDEX) {
            Ok(()) => Ok(true),
            Err(e) if e.is_constraint_violation() => {
                tracing::warn!(
                    error = %e,
                    "duplicate open carts present, deferring uniqueness index until normalized"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn open_carts_sql() -> String {
    format!(
        "SELECT {HEADER_COLUMNS} FROM carts
         WHERE owner_id = ? AND status = 'OPEN'
         ORDER BY updated_at DESC, rowid DESC"
    )
}

fn insert_line(tx: &Tx<'_>, cart: &CartId, product_id: &ProductId, quantity: i64) -> Result<usize, DbError> {
    tx.execute(
        "INSERT INTO cart_lines (cart_id, product_id, quantity) VALUES (?, ?, ?)",
        params![cart.as_str(), product_id.as_str(), quantity],
    )
}

fn set_line(tx: &Tx<'_>, cart: &CartId, product_id: &ProductId, quantity: i64) -> Result<usize, DbError> {
    tx.execute(
        "UPDATE cart_lines SET quantity = ? WHERE cart_id = ? AND product_id = ?",
        params![quantity, cart.as_str(), product_id.as_str()],
    )
}

fn delete_line(tx: &Tx<'_>, cart: &CartId, product_id: &ProductId) -> Result<usize, DbError> {
    tx.execute(
        "DELETE FROM cart_lines WHERE cart_id = ? AND product_id = ?",
        params![cart.as_str(), product_id.as_str()],
    )
}

fn touch(tx: &Tx<'_>, cart: &CartId) -> Result<usize, DbError> {
    tx.execute(
        "UPDATE carts SET version = version + 1, updated_at = ? WHERE id = ?",
        params![now_millis(), cart.as_str()],
    )
}

fn version_param(version: CartVersion) -> Result<i64, CartError> {
    i64::try_from(version.0).map_err(|_| CartError::Overflow)
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(enforce: bool) -> SqliteCartStore {
        SqliteCartStore::open(
            Arc::new(Db::open_in_memory().unwrap()),
            StoreConfig {
                enforce_single_open_cart: enforce,
            },
        )
        .unwrap()
    }

    fn owner() -> UserId {
        UserId::new("alice")
    }

    #[test]
    fn test_create_and_find() {
        let store = store(true);
        assert_eq!(store.find_open_carts(&owner()).unwrap(), OpenCarts::Empty);

        let cart = store.create_cart(&owner()).unwrap();
        match store.find_open_carts(&owner()).unwrap() {
            OpenCarts::Single(found) => assert_eq!(found, cart),
            other => panic!("expected a single cart, got {other:?}"),
        }
    }

    #[test]
    fn test_second_open_cart_rejected_when_enforced() {
        let store = store(true);
        store.create_cart(&owner()).unwrap();
        let err = store.create_cart(&owner()).unwrap_err();
        assert!(matches!(err, CartError::Storage(ref e) if e.is_constraint_violation()));
    }

    #[test]
    fn test_line_crud_bumps_version() {
        let store = store(true);
        let cart = store.create_cart(&owner()).unwrap();
        let p = ProductId::new("7");

        store.insert_line(&cart.id, &p, 2).unwrap();
        assert_eq!(store.find_line(&cart.id, &p).unwrap().unwrap().quantity, 2);
        assert!(store.update_line_quantity(&cart.id, &p, 5).unwrap());
        assert_eq!(store.lines(&cart.id).unwrap().len(), 1);
        assert!(store.delete_line(&cart.id, &p).unwrap());
        assert!(!store.delete_line(&cart.id, &p).unwrap());

        let header = store.find_open_carts(&owner()).unwrap();
        assert_eq!(header.keeper().unwrap().version, CartVersion(4));
    }

    #[test]
    fn test_duplicate_line_and_zero_quantity_rejected() {
        let store = store(true);
        let cart = store.create_cart(&owner()).unwrap();
        let p = ProductId::new("7");
        store.insert_line(&cart.id, &p, 1).unwrap();

        let dup = store.insert_line(&cart.id, &p, 1).unwrap_err();
        assert!(matches!(dup, CartError::Storage(ref e) if e.is_constraint_violation()));
        let zero = store.update_line_quantity(&cart.id, &p, 0).unwrap_err();
        assert!(matches!(zero, CartError::Storage(ref e) if e.is_constraint_violation()));
    }

    #[test]
    fn test_write_if_version() {
        let store = store(true);
        let cart = store.create_cart(&owner()).unwrap();
        let write = LineWrite::Insert {
            product_id: ProductId::new("7"),
            quantity: 3,
        };

        let next = store.write_line_if_version(&cart.id, cart.version, &write).unwrap();
        assert_eq!(next, Some(CartVersion(1)));

        let stale = store
            .write_line_if_version(
                &cart.id,
                cart.version,
                &LineWrite::Delete {
                    product_id: ProductId::new("7"),
                },
            )
            .unwrap();
        assert_eq!(stale, None);
        assert_eq!(store.lines(&cart.id).unwrap().len(), 1);
    }

    #[test]
    fn test_write_if_version_ignores_closed_cart() {
        let store = store(true);
        let cart = store.create_cart(&owner()).unwrap();
        store
            .db()
            .execute(
                "UPDATE carts SET status = 'CHECKED_OUT' WHERE id = ?",
                params![cart.id.as_str()],
            )
            .unwrap();

        let result = store
            .write_line_if_version(
                &cart.id,
                cart.version,
                &LineWrite::Insert {
                    product_id: ProductId::new("7"),
                    quantity: 1,
                },
            )
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_delete_cart_removes_lines() {
        let store = store(true);
        let cart = store.create_cart(&owner()).unwrap();
        store.insert_line(&cart.id, &ProductId::new("7"), 1).unwrap();

        assert!(store.delete_cart(&cart.id).unwrap());
        assert!(store.lines(&cart.id).unwrap().is_empty());
        assert!(!store.delete_cart(&cart.id).unwrap());
    }

    #[test]
    fn test_fold_duplicates() {
        let store = store(false);
        let older = store.create_cart(&owner()).unwrap();
        store.insert_line(&older.id, &ProductId::new("1"), 2).unwrap();
        store.insert_line(&older.id, &ProductId::new("3"), 5).unwrap();
        let newer = store.create_cart(&owner()).unwrap();
        store.insert_line(&newer.id, &ProductId::new("1"), 1).unwrap();
        store.insert_line(&newer.id, &ProductId::new("2"), 4).unwrap();

        assert_eq!(store.owners_with_duplicate_open_carts().unwrap(), vec![owner()]);

        let report = store.fold_duplicates(&owner()).unwrap().unwrap();
        assert_eq!(report.keeper.id, newer.id);
        assert_eq!(report.folded, vec![older.id.clone()]);
        assert_eq!(report.lines_moved, 2);

        let lines = store.lines(&newer.id).unwrap();
        let quantities: Vec<(String, i64)> = lines
            .iter()
            .map(|l| (l.product_id.to_string(), l.quantity))
            .collect();
        assert_eq!(
            quantities,
            vec![("1".into(), 3), ("2".into(), 4), ("3".into(), 5)]
        );
        assert!(store.lines(&older.id).unwrap().is_empty());

        assert!(store.fold_duplicates(&owner()).unwrap().is_none());
        assert!(store.owners_with_duplicate_open_carts().unwrap().is_empty());
    }

    #[test]
    fn test_index_deferred_while_duplicates_exist() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let lax = SqliteCartStore::open(
            Arc::clone(&db),
            StoreConfig {
                enforce_single_open_cart: false,
            },
        )
        .unwrap();
        lax.create_cart(&owner()).unwrap();
        lax.create_cart(&owner()).unwrap();

        let strict = SqliteCartStore::open(Arc::clone(&db), StoreConfig::default()).unwrap();
        assert!(!strict.ensure_single_open_cart_index().unwrap());

        strict.fold_duplicates(&owner()).unwrap().unwrap();
        assert!(strict.ensure_single_open_cart_index().unwrap());
        assert!(strict.create_cart(&owner()).is_err());
    }
}
