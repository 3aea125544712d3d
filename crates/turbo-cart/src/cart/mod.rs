//! Shopping cart module.
//!
//! Guest carts live in the session, account carts in SQLite, and the
//! engine is the only thing that touches either.

mod anonymous;
mod carrier;
mod durable;
mod engine;
mod login;
mod model;
mod view;

pub use anonymous::{AnonymousCartStore, GUEST_CART_KEY};
pub use carrier::{Carrier, Identity};
pub use durable::{DurableCartStore, LineWrite, SqliteCartStore};
pub use engine::CartEngine;
pub use login::{LoginOutcome, LoginTransition};
pub use model::{
    AddOutcome, AnonymousCart, CartHeader, CartLine, CartStatus, CartVersion, FoldReport,
    MergeReport, NormalizeReport, OpenCarts, QuantityChange, UpdateOutcome, REMOVE_DELTA,
};
pub use view::{compose_view, CartLineView, CartView, CheckoutItem};
