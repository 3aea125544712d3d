//! Read-only cart views and their totals.

use crate::catalog::CatalogEntry;
use crate::error::CartError;
use crate::ids::ProductId;
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// One resolved line of a cart view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

impl CartLineView {
    /// Build a line from its catalog entry, computing the line total.
    pub fn resolve(
        product_id: ProductId,
        entry: CatalogEntry,
        quantity: i64,
    ) -> Result<Self, CartError> {
        let line_total = entry.unit_price.try_multiply(quantity)?;
        Ok(Self {
            product_id,
            product_name: entry.name,
            unit_price: entry.unit_price,
            quantity,
            line_total,
        })
    }
}

/// A snapshot of a cart, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    /// Sum of line quantities.
    pub total_items: i64,
    /// Sum of line totals.
    pub total_amount: Money,
}

impl CartView {
    /// A view with no lines.
    pub fn empty(currency: Currency) -> Self {
        Self {
            lines: Vec::new(),
            total_items: 0,
            total_amount: Money::zero(currency),
        }
    }

    /// Check if the view has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line for a product, if present.
    pub fn line(&self, product_id: &ProductId) -> Option<&CartLineView> {
        self.lines.iter().find(|line| &line.product_id == product_id)
    }

    /// Snapshot handed to a payment collaborator.
    pub fn checkout_items(&self) -> Vec<CheckoutItem> {
        self.lines
            .iter()
            .map(|line| CheckoutItem {
                name: line.product_name.clone(),
                quantity: line.quantity,
                unit_amount_minor: line.unit_price.amount_minor,
            })
            .collect()
    }
}

/// A line item as a payment session expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub name: String,
    pub quantity: i64,
    pub unit_amount_minor: i64,
}

/// Compute totals over resolved lines.
///
/// Every line must be priced in `currency`.
pub fn compose_view(lines: Vec<CartLineView>, currency: Currency) -> Result<CartView, CartError> {
    let total_items = lines
        .iter()
        .try_fold(0_i64, |acc, line| acc.checked_add(line.quantity).ok_or(CartError::Overflow))?;
    let total_amount = Money::try_sum(lines.iter().map(|line| &line.line_total), currency)?;

    Ok(CartView {
        lines,
        total_items,
        total_amount,
    })
}
