//! Cart reconciliation for TurboCommerce.
//!
//! A visitor's cart lives in two places depending on who they are:
//!
//! - **Anonymous**: a product to quantity map in the visit's session
//! - **Authenticated**: one OPEN durable cart per owner, with version-checked
//!   line writes that never lose a concurrent increment
//!
//! [`CartEngine`] is the single entry point over both. It merges the guest
//! cart into the account cart at login, heals owners that ended up with
//! several OPEN carts, and composes read-only [`CartView`]s priced through
//! a [`CatalogLookup`].
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_cart::prelude::*;
//!
//! let db = Arc::new(Db::open(DbConfig::file("carts.db"))?);
//! let engine = CartEngine::new(
//!     SqliteCartStore::open(Arc::clone(&db), StoreConfig::default())?,
//!     AnonymousCartStore::in_memory(),
//!     SqliteCatalog::open(db)?,
//!     EngineConfig::default(),
//! );
//!
//! let guest = Carrier::anonymous(SessionId::generate());
//! engine.add(&guest, &ProductId::new("7"), 2)?;
//!
//! let login = LoginTransition::new(&engine).on_login_success(guest, UserId::new("alice"));
//! let view = engine.current_view(&login.carrier)?;
//! println!("{} items, {}", view.total_items, view.total_amount);
//! ```

pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ids;
pub mod money;

pub use cart::{CartEngine, CartView, Carrier, Identity};
pub use catalog::{CatalogEntry, CatalogLookup};
pub use config::{EngineConfig, StoreConfig};
pub use error::CartError;
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::cart::{
        AddOutcome, AnonymousCart, AnonymousCartStore, CartEngine, CartHeader, CartLine,
        CartLineView, CartStatus, CartView, Carrier, CheckoutItem, DurableCartStore, Identity,
        LoginOutcome, LoginTransition, MergeReport, NormalizeReport, OpenCarts, QuantityChange,
        SqliteCartStore, UpdateOutcome,
    };
    pub use crate::catalog::{CatalogEntry, CatalogLookup, InMemoryCatalog, SqliteCatalog};
    pub use crate::config::{EngineConfig, StoreConfig};
    pub use crate::error::CartError;
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};
}
