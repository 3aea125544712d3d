//! Type-safe SQLite database layer for TurboCommerce.
//!
//! Provides a simple, ergonomic API over SQLite with type-safe query results
//! and explicit write transactions.
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_db::{Db, DbConfig, params};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Line {
//!     product_id: String,
//!     quantity: i64,
//! }
//!
//! let db = Db::open(DbConfig::file("carts.db"))?;
//!
//! let lines: Vec<Line> = db.query_as(
//!     "SELECT product_id, quantity FROM cart_lines WHERE cart_id = ?",
//!     params!["cart_1"]
//! )?;
//!
//! db.transaction(|tx| {
//!     tx.execute("DELETE FROM cart_lines WHERE cart_id = ?", params!["cart_1"])?;
//!     Ok::<_, turbo_db::DbError>(())
//! })?;
//! ```

mod config;
mod db;
mod error;
mod types;

pub use config::{DbConfig, JournalMode, DEFAULT_BUSY_TIMEOUT_MS};
pub use db::{Db, Tx};
pub use error::DbError;
pub use types::{QueryResult, Row, Value};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{params, Db, DbConfig, DbError, QueryResult, Row, Tx, Value};
}

/// Create a parameter list for SQL queries.
///
/// # Example
///
/// ```rust,ignore
/// use turbo_db::params;
///
/// let params = params!["cart_1", 42];
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[]
    };
    ($($param:expr),+ $(,)?) => {
        &[$($crate::Value::from($param)),+]
    };
}
