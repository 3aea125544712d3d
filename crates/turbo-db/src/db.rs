//! Database connection and query execution.

use crate::{DbConfig, DbError, QueryResult, Row, Value};
use rusqlite::{params_from_iter, Connection, OpenFlags, TransactionBehavior};
use serde::de::DeserializeOwned;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite database connection.
///
/// Provides type-safe query execution with automatic result deserialization.
/// The connection is guarded by a mutex, so a `Db` can be shared between
/// request threads; each call holds the connection only for its own duration.
pub struct Db {
    conn: Mutex<Connection>,
    config: DbConfig,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").field("config", &self.config).finish()
    }
}

impl Db {
    /// Open a database with the given configuration.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let db = Db::open(DbConfig::file("carts.db"))?;
    /// ```
    pub fn open(config: DbConfig) -> Result<Self, DbError> {
        let conn = match &config.path {
            Some(path) => {
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
                Connection::open_with_flags(path, flags)
                    .map_err(|e| DbError::OpenError(e.to_string()))?
            }
            None => Connection::open_in_memory().map_err(|e| DbError::OpenError(e.to_string()))?,
        };

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DbError::OpenError(e.to_string()))?;
        if config.path.is_some() {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = {};",
                config.journal_mode.pragma_value()
            ))
            .map_err(|e| DbError::OpenError(e.to_string()))?;
        }
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| DbError::OpenError(e.to_string()))?;

        tracing::debug!(path = ?config.path, "opened database");

        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::open(DbConfig::in_memory())
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Execute a SQL statement that doesn't return rows.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// db.execute(
    ///     "UPDATE carts SET updated_at = ? WHERE id = ?",
    ///     params![now, cart_id.as_str()]
    /// )?;
    /// ```
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        execute_on(&*self.lock()?, sql, params)
    }

    /// Execute several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.lock()?.execute_batch(sql).map_err(DbError::from)
    }

    /// Execute a SQL query and return raw results.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        query_on(&*self.lock()?, sql, params)
    }

    /// Execute a SQL query and deserialize results into a vector.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let lines: Vec<LineRow> = db.query_as(
    ///     "SELECT product_id, quantity FROM cart_lines WHERE cart_id = ?",
    ///     params![cart_id.as_str()]
    /// )?;
    /// ```
    pub fn query_as<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<T>, DbError> {
        self.query(sql, params)?.deserialize_all()
    }

    /// Execute a SQL query and return a single row.
    ///
    /// Returns `DbError::NotFound` if no rows are returned.
    pub fn query_one<T: DeserializeOwned>(&self, sql: &str, params: &[Value]) -> Result<T, DbError> {
        self.query(sql, params)?
            .first()
            .ok_or(DbError::NotFound)?
            .deserialize()
    }

    /// Execute a SQL query and return an optional single row.
    pub fn query_optional<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, DbError> {
        self.query(sql, params)?
            .first()
            .map(Row::deserialize)
            .transpose()
    }

    /// Run `f` inside a write transaction.
    ///
    /// The transaction starts `IMMEDIATE`, so it holds the database write lock
    /// from its first statement. It commits when `f` returns `Ok` and rolls back
    /// otherwise. `f` must use the given [`Tx`], not this `Db`, for its
    /// statements.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// db.transaction(|tx| {
    ///     tx.execute("DELETE FROM cart_lines WHERE cart_id = ?", params![id])?;
    ///     tx.execute("DELETE FROM carts WHERE id = ?", params![id])?;
    ///     Ok::<_, DbError>(())
    /// })?;
    /// ```
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut guard = self.lock()?;
        let inner = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let tx = Tx { inner };
        let value = f(&tx)?;
        tx.inner.commit().map_err(DbError::from)?;
        Ok(value)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

/// An open write transaction. Dropped without commit, it rolls back.
pub struct Tx<'c> {
    inner: rusqlite::Transaction<'c>,
}

impl Tx<'_> {
    /// Execute a statement inside the transaction, returning rows changed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        execute_on(&self.inner, sql, params)
    }

    /// Execute a query inside the transaction.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        query_on(&self.inner, sql, params)
    }

    /// Execute a query inside the transaction and deserialize every row.
    pub fn query_as<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<T>, DbError> {
        self.query(sql, params)?.deserialize_all()
    }

    /// Execute a query inside the transaction and deserialize the first row.
    pub fn query_optional<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, DbError> {
        self.query(sql, params)?
            .first()
            .map(Row::deserialize)
            .transpose()
    }
}

fn sql_params(params: &[Value]) -> Vec<rusqlite::types::Value> {
    params.iter().map(rusqlite::types::Value::from).collect()
}

fn execute_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize, DbError> {
    let sql_params = sql_params(params);
    conn.execute(sql, params_from_iter(sql_params.iter()))
        .map_err(DbError::from)
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
    let sql_params = sql_params(params);
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(sql_params.iter()))?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            let value: rusqlite::types::Value = row.get(index)?;
            values.push(Value::from(value));
        }
        rows.push(Row::new(columns.clone(), values));
    }

    Ok(QueryResult::new(columns, rows))
}
