//! Shared fixtures for the cart integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use turbo_cart::cart::{AnonymousCartStore, CartEngine, Carrier, SqliteCartStore};
use turbo_cart::catalog::InMemoryCatalog;
use turbo_cart::{Currency, EngineConfig, Money, ProductId, SessionId, StoreConfig, UserId};
use turbo_db::{Db, DbConfig};

pub type Engine = CartEngine<SqliteCartStore, Arc<InMemoryCatalog>>;

/// Catalog with products "1", "2", "7" and "8".
pub fn catalog() -> Arc<InMemoryCatalog> {
    Arc::new(
        InMemoryCatalog::new()
            .with_product("1", "Kettle", Money::new(3000, Currency::USD))
            .with_product("2", "Mug", Money::new(800, Currency::USD))
            .with_product("7", "Teapot", Money::new(1250, Currency::USD))
            .with_product("8", "Saucer", Money::new(400, Currency::USD)),
    )
}

/// Engine over an in-memory database with uniqueness enforced.
pub fn engine() -> Engine {
    engine_with(Db::open_in_memory().unwrap(), StoreConfig::default())
}

/// Engine over an in-memory database that tolerates duplicate OPEN carts,
/// as a database written by an older release would.
pub fn legacy_engine() -> Engine {
    engine_with(
        Db::open_in_memory().unwrap(),
        StoreConfig {
            enforce_single_open_cart: false,
        },
    )
}

/// Engine over a database file.
pub fn file_engine(path: &std::path::Path) -> Engine {
    engine_with(
        Db::open(DbConfig::file(path)).unwrap(),
        StoreConfig::default(),
    )
}

pub fn engine_with(db: Db, store: StoreConfig) -> Engine {
    let store = SqliteCartStore::open(Arc::new(db), store).unwrap();
    CartEngine::new(
        store,
        AnonymousCartStore::in_memory(),
        catalog(),
        EngineConfig::default(),
    )
}

pub fn p(id: &str) -> ProductId {
    ProductId::new(id)
}

pub fn guest(session: &str) -> Carrier {
    Carrier::anonymous(SessionId::new(session))
}

pub fn owner(session: &str, user: &str) -> Carrier {
    Carrier::owner(SessionId::new(session), UserId::new(user))
}

/// `(product, quantity)` pairs of the owner's OPEN cart, in product order.
pub fn durable_lines(engine: &Engine, user: &str) -> Vec<(String, i64)> {
    let carrier = owner("inspect", user);
    let mut lines: Vec<(String, i64)> = engine
        .current_view(&carrier)
        .unwrap()
        .lines
        .into_iter()
        .map(|line| (line.product_id.to_string(), line.quantity))
        .collect();
    lines.sort();
    lines
}
