//! The cart reconciliation engine.
//!
//! Single entry point for reading and mutating carts. Anonymous carriers
//! work on the guest cart in their session; owners work on their canonical
//! OPEN durable cart, which the engine heals to exactly one on the way.

use crate::cart::anonymous::AnonymousCartStore;
use crate::cart::carrier::{Carrier, Identity};
use crate::cart::durable::{DurableCartStore, LineWrite};
use crate::cart::model::{
    clamp_add_quantity, AddOutcome, CartHeader, CartLine, MergeReport, NormalizeReport,
    OpenCarts, QuantityChange, UpdateOutcome,
};
use crate::cart::view::{compose_view, CartLineView, CartView};
use crate::catalog::{CatalogEntry, CatalogLookup};
use crate::config::EngineConfig;
use crate::error::CartError;
use crate::ids::{ProductId, UserId};

/// What a version-checked attempt should do once it has seen the line.
enum Plan<R> {
    /// Nothing to write.
    Skip(R),
    /// Write under the observed version.
    Write(LineWrite, R),
}

/// Reconciles guest and account carts.
///
/// The engine is `Send + Sync` whenever its store and catalog are, so one
/// instance can serve concurrent requests.
#[derive(Debug)]
pub struct CartEngine<S, C> {
    durable: S,
    anonymous: AnonymousCartStore,
    catalog: C,
    config: EngineConfig,
}

impl<S, C> CartEngine<S, C>
where
    S: DurableCartStore,
    C: CatalogLookup,
{
    /// Create an engine.
    pub fn new(durable: S, anonymous: AnonymousCartStore, catalog: C, config: EngineConfig) -> Self {
        Self {
            durable,
            anonymous,
            catalog,
            config,
        }
    }

    pub fn durable(&self) -> &S {
        &self.durable
    }

    pub fn anonymous(&self) -> &AnonymousCartStore {
        &self.anonymous
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Total quantity across the carrier's cart. Never creates a cart.
    pub fn item_count(&self, carrier: &Carrier) -> Result<i64, CartError> {
        match &carrier.identity {
            Identity::Anonymous => match self.anonymous.get_if_present(&carrier.session_id)? {
                Some(cart) => cart.total_items(),
                None => Ok(0),
            },
            Identity::Owner(owner) => match self.find_canonical(owner, false)? {
                Some(cart) => sum_quantities(&self.durable.lines(&cart.id)?),
                None => Ok(0),
            },
        }
    }

    /// Add a product. Quantities below one count as one.
    ///
    /// Owners get a cart created on demand and must name a product the
    /// catalog knows; guests are only checked when their cart is viewed.
    pub fn add(
        &self,
        carrier: &Carrier,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<AddOutcome, CartError> {
        let quantity = clamp_add_quantity(quantity);

        let owner = match &carrier.identity {
            Identity::Anonymous => {
                let quantity = self
                    .anonymous
                    .upsert_add(&carrier.session_id, product_id, quantity)?;
                return Ok(AddOutcome { quantity });
            }
            Identity::Owner(owner) => owner,
        };

        if self.resolve_priced(product_id)?.is_none() {
            return Err(CartError::ProductNotFound(product_id.clone()));
        }

        let outcome = self
            .write_line(owner, product_id, true, |line| {
                add_plan(product_id, line, quantity).map(|(write, total)| {
                    Plan::Write(write, AddOutcome { quantity: total })
                })
            })?
            .ok_or_else(|| CartError::ConcurrentModification {
                owner: owner.clone(),
                attempts: self.config.attempts(),
            })?;

        tracing::debug!(owner = %owner, product_id = %product_id, quantity = outcome.quantity, "cart line added");
        Ok(outcome)
    }

    /// Adjust or remove a line.
    ///
    /// A missing cart or line is not an error; the call reports `Missing`
    /// and writes nothing.
    pub fn update_quantity(
        &self,
        carrier: &Carrier,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> Result<UpdateOutcome, CartError> {
        let owner = match &carrier.identity {
            Identity::Anonymous => {
                return self
                    .anonymous
                    .apply_delta(&carrier.session_id, product_id, change);
            }
            Identity::Owner(owner) => owner,
        };

        let outcome = self
            .write_line(owner, product_id, false, |line| {
                let Some(line) = line else {
                    return Ok(Plan::Skip(UpdateOutcome::Missing));
                };
                let product_id = line.product_id.clone();
                Ok(match change.apply(line.quantity)? {
                    Some(quantity) => Plan::Write(
                        LineWrite::Set {
                            product_id,
                            quantity,
                        },
                        UpdateOutcome::Updated { quantity },
                    ),
                    None => Plan::Write(LineWrite::Delete { product_id }, UpdateOutcome::Removed),
                })
            })?
            .unwrap_or(UpdateOutcome::Missing);

        match outcome {
            UpdateOutcome::Removed => {
                tracing::info!(owner = %owner, product_id = %product_id, "cart line removed")
            }
            _ => tracing::debug!(owner = %owner, product_id = %product_id, ?outcome, "cart line updated"),
        }
        Ok(outcome)
    }

    /// Move the guest cart of the carrier's session into the owner's cart.
    ///
    /// Quantities for the same product are summed. Entries whose product no
    /// longer resolves are dropped. The guest cart is cleared afterwards, so
    /// a second call is a no-op. An empty guest cart never touches durable
    /// storage.
    ///
    /// Each entry leaves the guest cart right after its durable write
    /// commits. The two stores share no transaction: if that session write
    /// fails (for example with a session `ConcurrentModification`), the
    /// entry stays in the guest cart and a retried merge adds it again.
    /// Callers retrying a failed merge accept that window.
    pub fn merge_anonymous_into_durable(&self, carrier: &Carrier) -> Result<MergeReport, CartError> {
        let Some(owner) = carrier.owner_id() else {
            return Ok(MergeReport::default());
        };
        let session = &carrier.session_id;
        let guest = match self.anonymous.get_if_present(session)? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Ok(MergeReport::default()),
        };

        let mut report = MergeReport::default();
        for (product_id, quantity) in guest.iter() {
            if self.resolve_priced(product_id)?.is_none() {
                tracing::debug!(owner = %owner, product_id = %product_id, "skipping stale guest cart entry");
                self.anonymous.remove_entry(session, product_id)?;
                report.skipped.push(product_id.clone());
                continue;
            }

            self.write_line(owner, product_id, true, |line| {
                add_plan(product_id, line, quantity).map(|(write, _)| Plan::Write(write, ()))
            })?
            .ok_or_else(|| CartError::ConcurrentModification {
                owner: owner.clone(),
                attempts: self.config.attempts(),
            })?;

            // per-entry removal keeps a retried merge from counting twice
            self.anonymous.remove_entry(session, product_id)?;
            report.merged += 1;
        }

        self.anonymous.clear(session)?;
        tracing::info!(
            owner = %owner,
            session = %session,
            merged = report.merged,
            skipped = report.skipped.len(),
            "guest cart merged"
        );
        Ok(report)
    }

    /// Fresh view of the carrier's cart, resolved through the catalog.
    ///
    /// Lines whose product no longer resolves, or is priced in another
    /// currency, are left out.
    pub fn current_view(&self, carrier: &Carrier) -> Result<CartView, CartError> {
        let quantities: Vec<(ProductId, i64)> = match &carrier.identity {
            Identity::Anonymous => match self.anonymous.get_if_present(&carrier.session_id)? {
                Some(cart) => cart.iter().map(|(p, q)| (p.clone(), q)).collect(),
                None => Vec::new(),
            },
            Identity::Owner(owner) => match self.find_canonical(owner, false)? {
                Some(cart) => self
                    .durable
                    .lines(&cart.id)?
                    .into_iter()
                    .map(|line| (line.product_id, line.quantity))
                    .collect(),
                None => Vec::new(),
            },
        };

        let mut lines = Vec::with_capacity(quantities.len());
        for (product_id, quantity) in quantities {
            match self.resolve_priced(&product_id)? {
                Some(entry) => lines.push(CartLineView::resolve(product_id, entry, quantity)?),
                None => tracing::debug!(product_id = %product_id, "dropping unresolvable line from view"),
            }
        }
        compose_view(lines, self.config.currency)
    }

    /// The owner's single OPEN cart, creating it if absent.
    pub fn resolve_canonical_open_cart(&self, owner: &UserId) -> Result<CartHeader, CartError> {
        self.find_canonical(owner, true)?
            .ok_or_else(|| CartError::ConcurrentModification {
                owner: owner.clone(),
                attempts: self.config.attempts(),
            })
    }

    /// Fold duplicates for every affected owner, then install the uniqueness
    /// constraint if it was deferred.
    pub fn normalize_all(&self) -> Result<NormalizeReport, CartError> {
        let mut report = NormalizeReport::default();
        for owner in self.durable.owners_with_duplicate_open_carts()? {
            if let Some(fold) = self.durable.fold_duplicates(&owner)? {
                report.folds.push(fold);
            }
        }
        report.index_installed = self.durable.ensure_single_open_cart_index()?;
        tracing::info!(
            owners = report.folds.len(),
            index_installed = report.index_installed,
            "normalization sweep finished"
        );
        Ok(report)
    }

    /// Catalog entry of a product, `None` unless it is priced in the
    /// engine currency.
    fn resolve_priced(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>, CartError> {
        let Some(entry) = self.catalog.resolve(product_id)? else {
            return Ok(None);
        };
        if entry.unit_price.currency != self.config.currency {
            tracing::warn!(
                product_id = %product_id,
                expected = %self.config.currency,
                got = %entry.unit_price.currency,
                "catalog price in foreign currency, treating product as unavailable"
            );
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Canonical OPEN cart of an owner, healing duplicates.
    ///
    /// With `create` unset a missing cart stays missing. Losing a creation
    /// or fold race re-reads instead of failing.
    fn find_canonical(&self, owner: &UserId, create: bool) -> Result<Option<CartHeader>, CartError> {
        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            match self.durable.find_open_carts(owner)? {
                OpenCarts::Single(cart) => return Ok(Some(cart)),
                OpenCarts::Empty if !create => return Ok(None),
                OpenCarts::Empty => match self.durable.create_cart(owner) {
                    Ok(cart) => return Ok(Some(cart)),
                    Err(CartError::Storage(e)) if e.is_constraint_violation() => {
                        tracing::debug!(owner = %owner, attempt, "lost cart creation race, re-reading");
                    }
                    Err(e) => return Err(e),
                },
                OpenCarts::Multiple(carts) => {
                    tracing::warn!(owner = %owner, count = carts.len(), "multiple open carts, normalizing");
                    if let Some(fold) = self.durable.fold_duplicates(owner)? {
                        return Ok(Some(fold.keeper));
                    }
                }
            }
        }
        Err(CartError::ConcurrentModification {
            owner: owner.clone(),
            attempts,
        })
    }

    /// Bounded compare-and-retry on the cart version.
    ///
    /// Each attempt reads the canonical cart and the line, asks `plan` what
    /// to write, and writes only if the cart version is unchanged. Returns
    /// `None` when no cart exists and `create` is unset.
    fn write_line<R>(
        &self,
        owner: &UserId,
        product_id: &ProductId,
        create: bool,
        mut plan: impl FnMut(Option<&CartLine>) -> Result<Plan<R>, CartError>,
    ) -> Result<Option<R>, CartError> {
        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            let Some(cart) = self.find_canonical(owner, create)? else {
                return Ok(None);
            };
            let line = self.durable.find_line(&cart.id, product_id)?;

            let (write, result) = match plan(line.as_ref())? {
                Plan::Skip(result) => return Ok(Some(result)),
                Plan::Write(write, result) => (write, result),
            };

            match self.durable.write_line_if_version(&cart.id, cart.version, &write) {
                Ok(Some(_)) => return Ok(Some(result)),
                Ok(None) => {
                    tracing::debug!(owner = %owner, product_id = %product_id, attempt, "cart version moved, retrying");
                }
                Err(CartError::Storage(e)) if e.is_constraint_violation() || e.is_transient() => {
                    tracing::debug!(owner = %owner, product_id = %product_id, attempt, error = %e, "line write raced, retrying");
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts && self.config.retry_backoff_ms > 0 {
                std::thread::sleep(self.config.backoff());
            }
        }

        tracing::warn!(owner = %owner, product_id = %product_id, attempts, "giving up on contended cart line");
        Err(CartError::ConcurrentModification {
            owner: owner.clone(),
            attempts,
        })
    }
}

/// Insert a new line or add onto the existing one.
fn add_plan(
    product_id: &ProductId,
    line: Option<&CartLine>,
    quantity: i64,
) -> Result<(LineWrite, i64), CartError> {
    let product_id = product_id.clone();
    match line {
        None => Ok((LineWrite::Insert { product_id, quantity }, quantity)),
        Some(line) => {
            let total = line.quantity.checked_add(quantity).ok_or(CartError::Overflow)?;
            Ok((
                LineWrite::Set {
                    product_id,
                    quantity: total,
                },
                total,
            ))
        }
    }
}

fn sum_quantities(lines: &[CartLine]) -> Result<i64, CartError> {
    lines
        .iter()
        .try_fold(0_i64, |acc, line| acc.checked_add(line.quantity).ok_or(CartError::Overflow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::cart::durable::SqliteCartStore;
    use crate::config::StoreConfig;
    use crate::ids::SessionId;
    use crate::money::{Currency, Money};
    use std::sync::Arc;
    use turbo_db::Db;

    type Engine = CartEngine<SqliteCartStore, InMemoryCatalog>;

    fn engine() -> Engine {
        let store = SqliteCartStore::open(
            Arc::new(Db::open_in_memory().unwrap()),
            StoreConfig::default(),
        )
        .unwrap();
        let catalog = InMemoryCatalog::new()
            .with_product("7", "Teapot", Money::new(1250, Currency::USD))
            .with_product("8", "Cup", Money::new(400, Currency::USD));
        CartEngine::new(store, AnonymousCartStore::in_memory(), catalog, EngineConfig::default())
    }

    fn owner() -> Carrier {
        Carrier::owner(SessionId::new("s1"), UserId::new("alice"))
    }

    #[test]
    fn test_durable_add_creates_cart_and_sums() {
        let engine = engine();
        let p = ProductId::new("7");
        assert_eq!(engine.add(&owner(), &p, 2).unwrap().quantity, 2);
        assert_eq!(engine.add(&owner(), &p, -5).unwrap().quantity, 3);
        assert_eq!(engine.item_count(&owner()).unwrap(), 3);
    }

    #[test]
    fn test_durable_add_unknown_product() {
        let engine = engine();
        let err = engine.add(&owner(), &ProductId::new("404"), 1).unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(_)));
        assert!(err.is_user_facing());
        // no cart materialized for a rejected add
        assert!(engine
            .durable()
            .find_open_carts(&UserId::new("alice"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_durable_update_without_cart_is_noop() {
        let engine = engine();
        let outcome = engine
            .update_quantity(&owner(), &ProductId::new("7"), QuantityChange::Delta(1))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Missing);
        assert!(engine
            .durable()
            .find_open_carts(&UserId::new("alice"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_durable_update_paths() {
        let engine = engine();
        let p = ProductId::new("7");
        engine.add(&owner(), &p, 2).unwrap();

        assert_eq!(
            engine.update_quantity(&owner(), &p, QuantityChange::Delta(3)).unwrap(),
            UpdateOutcome::Updated { quantity: 5 }
        );
        assert_eq!(
            engine
                .update_quantity(&owner(), &ProductId::new("8"), QuantityChange::Delta(-1))
                .unwrap(),
            UpdateOutcome::Missing
        );
        assert_eq!(
            engine
                .update_quantity(&owner(), &p, QuantityChange::Remove)
                .unwrap(),
            UpdateOutcome::Removed
        );
        assert_eq!(engine.item_count(&owner()).unwrap(), 0);
    }

    #[test]
    fn test_anonymous_add_skips_catalog() {
        let engine = engine();
        let guest = Carrier::anonymous(SessionId::new("s1"));
        engine.add(&guest, &ProductId::new("404"), 1).unwrap();
        engine.add(&guest, &ProductId::new("7"), 2).unwrap();

        assert_eq!(engine.item_count(&guest).unwrap(), 3);
        let view = engine.current_view(&guest).unwrap();
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.total_items, 2);
        assert_eq!(view.total_amount, Money::new(2500, Currency::USD));
    }

    #[test]
    fn test_reads_never_create() {
        let engine = engine();
        assert_eq!(engine.item_count(&owner()).unwrap(), 0);
        assert!(engine.current_view(&owner()).unwrap().is_empty());
        assert!(engine
            .durable()
            .find_open_carts(&UserId::new("alice"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_resolve_canonical_is_stable() {
        let engine = engine();
        let alice = UserId::new("alice");
        let first = engine.resolve_canonical_open_cart(&alice).unwrap();
        let second = engine.resolve_canonical_open_cart(&alice).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_foreign_currency_product_is_left_out() {
        let engine = engine();
        engine
            .catalog()
            .insert("9", "Import", Money::new(900, Currency::EUR));
        let guest = Carrier::anonymous(SessionId::new("s2"));
        engine.add(&guest, &ProductId::new("7"), 1).unwrap();
        engine.add(&guest, &ProductId::new("9"), 1).unwrap();

        let view = engine.current_view(&guest).unwrap();
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.total_amount, Money::new(1250, Currency::USD));

        let err = engine.add(&owner(), &ProductId::new("9"), 1).unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(_)));
    }

    #[test]
    fn test_merge_for_anonymous_carrier_is_noop() {
        let engine = engine();
        let guest = Carrier::anonymous(SessionId::new("s1"));
        engine.add(&guest, &ProductId::new("7"), 1).unwrap();
        assert!(engine.merge_anonymous_into_durable(&guest).unwrap().is_noop());
        assert_eq!(engine.item_count(&guest).unwrap(), 1);
    }
}
