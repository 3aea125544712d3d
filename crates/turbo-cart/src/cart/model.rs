//! Cart state shared by the anonymous and durable stores.

use crate::error::CartError;
use crate::ids::{CartId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw wire value meaning "remove the line regardless of its quantity".
pub const REMOVE_DELTA: i64 = i64::MIN;

/// A requested quantity adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityChange {
    /// Signed adjustment of the current quantity.
    Delta(i64),
    /// Drop the line outright.
    Remove,
}

impl QuantityChange {
    /// Quantity after applying this change, `None` if the line must go.
    pub fn apply(self, current: i64) -> Result<Option<i64>, CartError> {
        match self {
            QuantityChange::Remove => Ok(None),
            QuantityChange::Delta(delta) => {
                let next = current.checked_add(delta).ok_or(CartError::Overflow)?;
                Ok((next > 0).then_some(next))
            }
        }
    }
}

impl From<i64> for QuantityChange {
    fn from(delta: i64) -> Self {
        if delta == REMOVE_DELTA {
            QuantityChange::Remove
        } else {
            QuantityChange::Delta(delta)
        }
    }
}

/// Clamp a requested add quantity to at least one.
pub fn clamp_add_quantity(quantity: i64) -> i64 {
    quantity.max(1)
}

/// Guest cart kept in the visitor's session.
///
/// Every present entry has a quantity above zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousCart {
    entries: BTreeMap<ProductId, i64>,
}

impl AnonymousCart {
    /// Create an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantity of a product, if present.
    pub fn quantity(&self, product_id: &ProductId) -> Option<i64> {
        self.entries.get(product_id).copied()
    }

    /// Add to an entry, creating it when absent. Returns the new quantity.
    pub fn add(&mut self, product_id: ProductId, quantity: i64) -> Result<i64, CartError> {
        let quantity = clamp_add_quantity(quantity);
        let entry = self.entries.entry(product_id).or_insert(0);
        *entry = entry.checked_add(quantity).ok_or(CartError::Overflow)?;
        Ok(*entry)
    }

    /// Apply a change to an existing entry.
    ///
    /// An absent entry is left alone. An entry that would reach zero or
    /// below is deleted.
    pub fn apply(
        &mut self,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> Result<UpdateOutcome, CartError> {
        let Some(current) = self.entries.get(product_id).copied() else {
            return Ok(UpdateOutcome::Missing);
        };
        match change.apply(current)? {
            Some(quantity) => {
                self.entries.insert(product_id.clone(), quantity);
                Ok(UpdateOutcome::Updated { quantity })
            }
            None => {
                self.entries.remove(product_id);
                Ok(UpdateOutcome::Removed)
            }
        }
    }

    /// Delete an entry. Returns whether it existed.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        self.entries.remove(product_id).is_some()
    }

    /// Sum of all quantities.
    pub fn total_items(&self) -> Result<i64, CartError> {
        self.entries
            .values()
            .try_fold(0_i64, |acc, q| acc.checked_add(*q).ok_or(CartError::Overflow))
    }

    /// Iterate entries in product order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, i64)> {
        self.entries.iter().map(|(p, q)| (p, *q))
    }

    /// Number of distinct products.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cart has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop any entry that is not strictly positive.
    ///
    /// Session payloads are plain JSON, so this is applied on every load.
    pub(crate) fn retain_positive(mut self) -> Self {
        self.entries.retain(|_, q| *q > 0);
        self
    }
}

/// Lifecycle status of a durable cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// The cart is being filled.
    #[default]
    Open,
    /// The cart was turned into an order.
    CheckedOut,
    /// The cart was given up.
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Open => "OPEN",
            CartStatus::CheckedOut => "CHECKED_OUT",
            CartStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(CartStatus::Open),
            "CHECKED_OUT" => Some(CartStatus::CheckedOut),
            "ABANDONED" => Some(CartStatus::Abandoned),
            _ => None,
        }
    }
}

/// Opaque optimistic-concurrency token of a durable cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartVersion(pub u64);

/// Durable cart header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartHeader {
    /// Cart id.
    pub id: CartId,
    /// Owning identity.
    pub owner_id: UserId,
    /// Lifecycle status.
    pub status: CartStatus,
    /// Current version token.
    pub version: CartVersion,
    /// Unix timestamp, milliseconds.
    pub created_at: i64,
    /// Unix timestamp, milliseconds.
    pub updated_at: i64,
}

/// A stored line of a durable cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Owning cart.
    pub cart_id: CartId,
    /// Product on the line.
    pub product_id: ProductId,
    /// Always above zero.
    pub quantity: i64,
}

/// OPEN carts found for an owner, most recently updated first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenCarts {
    /// No OPEN cart.
    Empty,
    /// The normal state.
    Single(CartHeader),
    /// Duplicates left by a race or an old defect. Never empty.
    Multiple(Vec<CartHeader>),
}

impl OpenCarts {
    /// Classify a recency-ordered list.
    pub fn from_ordered(mut headers: Vec<CartHeader>) -> Self {
        match headers.len() {
            0 => OpenCarts::Empty,
            1 => headers.pop().map_or(OpenCarts::Empty, OpenCarts::Single),
            _ => OpenCarts::Multiple(headers),
        }
    }

    /// The cart that wins normalization.
    pub fn keeper(&self) -> Option<&CartHeader> {
        match self {
            OpenCarts::Empty => None,
            OpenCarts::Single(header) => Some(header),
            OpenCarts::Multiple(headers) => headers.first(),
        }
    }

    /// Number of OPEN carts.
    pub fn len(&self) -> usize {
        match self {
            OpenCarts::Empty => 0,
            OpenCarts::Single(_) => 1,
            OpenCarts::Multiple(headers) => headers.len(),
        }
    }

    /// Check if there is no OPEN cart.
    pub fn is_empty(&self) -> bool {
        matches!(self, OpenCarts::Empty)
    }

    /// The headers, most recently updated first.
    pub fn into_vec(self) -> Vec<CartHeader> {
        match self {
            OpenCarts::Empty => Vec::new(),
            OpenCarts::Single(header) => vec![header],
            OpenCarts::Multiple(headers) => headers,
        }
    }
}

/// Result of an add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    /// Quantity of the line after the add.
    pub quantity: i64,
}

/// Result of a quantity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// The line now holds `quantity`.
    Updated { quantity: i64 },
    /// The line was deleted.
    Removed,
    /// There was no line to change.
    Missing,
}

/// Result of merging a guest cart at login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Entries written into the durable cart.
    pub merged: usize,
    /// Entries dropped because their product no longer resolves.
    pub skipped: Vec<ProductId>,
}

impl MergeReport {
    /// Check if nothing happened.
    pub fn is_noop(&self) -> bool {
        self.merged == 0 && self.skipped.is_empty()
    }
}

/// Result of folding duplicate OPEN carts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldReport {
    /// Surviving cart, after the fold.
    pub keeper: CartHeader,
    /// Deleted duplicate carts.
    pub folded: Vec<CartId>,
    /// Lines moved or summed into the keeper.
    pub lines_moved: usize,
}

/// Result of healing every owner's duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// One fold per owner that had duplicates.
    pub folds: Vec<FoldReport>,
    /// Whether the one-OPEN-cart-per-owner constraint is now in place.
    pub index_installed: bool,
}
