//! Guest carts kept in the visitor's session.

use crate::cart::model::{AnonymousCart, QuantityChange, UpdateOutcome};
use crate::error::CartError;
use crate::ids::{ProductId, SessionId};
use turbo_session::{Attributes, SessionStore};

/// Session attribute holding the guest cart.
pub const GUEST_CART_KEY: &str = "guest_cart";

/// Adapter over the session attribute bag.
///
/// Every mutation is one optimistic session update, so two requests of the
/// same visit cannot overwrite each other's cart.
#[derive(Debug, Clone)]
pub struct AnonymousCartStore {
    sessions: SessionStore,
}

impl AnonymousCartStore {
    /// Create a store over a session store.
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Create a store over a private in-memory session store.
    pub fn in_memory() -> Self {
        Self::new(SessionStore::in_memory())
    }

    /// The underlying session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Read the guest cart without creating a session or a cart.
    pub fn get_if_present(&self, session: &SessionId) -> Result<Option<AnonymousCart>, CartError> {
        match self.sessions.get(session)? {
            Some(attrs) => read_cart(&attrs),
            None => Ok(None),
        }
    }

    /// Read the guest cart, creating an empty one if absent.
    pub fn get_or_create(&self, session: &SessionId) -> Result<AnonymousCart, CartError> {
        let (_, cart) = self.sessions.update(session, |attrs| -> Result<_, CartError> {
            let cart = read_cart(attrs)?.unwrap_or_default();
            write_cart(attrs, &cart)?;
            Ok(cart)
        })?;
        Ok(cart)
    }

    /// Add `quantity` to a product's entry. Returns the new quantity.
    pub fn upsert_add(
        &self,
        session: &SessionId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<i64, CartError> {
        let (_, quantity) = self.sessions.update(session, |attrs| -> Result<_, CartError> {
            let mut cart = read_cart(attrs)?.unwrap_or_default();
            let quantity = cart.add(product_id.clone(), quantity)?;
            write_cart(attrs, &cart)?;
            Ok(quantity)
        })?;
        tracing::debug!(session = %session, product_id = %product_id, quantity, "guest cart add");
        Ok(quantity)
    }

    /// Apply a change to an existing entry.
    ///
    /// A missing session, cart or entry is a no-op reported as `Missing`.
    pub fn apply_delta(
        &self,
        session: &SessionId,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> Result<UpdateOutcome, CartError> {
        let present = self
            .get_if_present(session)?
            .is_some_and(|cart| cart.quantity(product_id).is_some());
        if !present {
            return Ok(UpdateOutcome::Missing);
        }

        let (_, outcome) = self.sessions.update(session, |attrs| -> Result<_, CartError> {
            let Some(mut cart) = read_cart(attrs)? else {
                return Ok(UpdateOutcome::Missing);
            };
            let outcome = cart.apply(product_id, change)?;
            write_cart(attrs, &cart)?;
            Ok(outcome)
        })?;
        tracing::debug!(session = %session, product_id = %product_id, ?outcome, "guest cart update");
        Ok(outcome)
    }

    /// Delete an entry. Returns whether it existed.
    pub fn remove_entry(&self, session: &SessionId, product_id: &ProductId) -> Result<bool, CartError> {
        if self.get_if_present(session)?.is_none() {
            return Ok(false);
        }
        let (_, removed) = self.sessions.update(session, |attrs| -> Result<_, CartError> {
            let Some(mut cart) = read_cart(attrs)? else {
                return Ok(false);
            };
            let removed = cart.remove(product_id);
            write_cart(attrs, &cart)?;
            Ok(removed)
        })?;
        Ok(removed)
    }

    /// Drop the guest cart entirely.
    pub fn clear(&self, session: &SessionId) -> Result<(), CartError> {
        let has_cart = self
            .sessions
            .get(session)?
            .is_some_and(|attrs| attrs.contains(GUEST_CART_KEY));
        if !has_cart {
            return Ok(());
        }
        self.sessions.update(session, |attrs| -> Result<_, CartError> {
            attrs.remove(GUEST_CART_KEY);
            Ok(())
        })?;
        Ok(())
    }
}

fn read_cart(attrs: &Attributes) -> Result<Option<AnonymousCart>, CartError> {
    Ok(attrs
        .get::<AnonymousCart>(GUEST_CART_KEY)?
        .map(AnonymousCart::retain_positive))
}

fn write_cart(attrs: &mut Attributes, cart: &AnonymousCart) -> Result<(), CartError> {
    attrs.insert(GUEST_CART_KEY, cart)?;
    Ok(())
}
