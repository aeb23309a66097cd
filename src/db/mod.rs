//! Database module for Dukkan Sync
//!
//! SQLite-backed persistence behind an r2d2 connection pool. Two tables:
//! `collections` holds one JSON-array payload per (user, collection) key,
//! tombstones included; `settings` is a JSON key/value store for
//! configuration blobs. The pending-operation queue creates its own table
//! on top of the same pool.
//!
//! Writes are quota-aware: an optional byte budget over the sum of all
//! collection payloads models the hard storage cap of the devices this
//! runs on. Exceeding it rejects the write with `DbError::QuotaExceeded`
//! so the storage-pressure ladder can react; nothing is written partially.

use rusqlite::params;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Storage quota exceeded: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded { needed: u64, quota: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Pooled, thread-safe SQLite handle. Clone is cheap (shared pool); the
/// single `Database` value is the sole writer of persisted state.
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
    quota_bytes: Option<u64>,
}

impl Database {
    /// Open (or create) the database file and initialize the schema.
    pub fn open(db_path: PathBuf) -> DbResult<Self> {
        let manager = SqliteConnectionManager::file(&db_path);

        let pool = Pool::builder()
            .max_size(10)
            .min_idle(Some(2))
            .connection_timeout(std::time::Duration::from_secs(10))
            .build(manager)?;

        let conn = pool.get()?;

        // Performance PRAGMAs
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
            quota_bytes: None,
        })
    }

    /// Open a file-backed database with a byte quota over collection
    /// payloads.
    pub fn open_with_quota(db_path: PathBuf, quota_bytes: u64) -> DbResult<Self> {
        let mut db = Self::open(db_path)?;
        db.quota_bytes = Some(quota_bytes);
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    ///
    /// The pool is capped at one connection: each `:memory:` connection is
    /// its own private database, so every handle must share the same one.
    pub fn in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory();

        let pool = Pool::builder().max_size(1).build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
            quota_bytes: None,
        })
    }

    /// In-memory database with a byte quota (for storage-pressure tests).
    pub fn in_memory_with_quota(quota_bytes: u64) -> DbResult<Self> {
        let mut db = Self::in_memory()?;
        db.quota_bytes = Some(quota_bytes);
        Ok(db)
    }

    /// Get a connection from the pool
    #[inline]
    pub fn get_conn(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    // =========================================================================
    // COLLECTIONS
    // =========================================================================

    /// Replace the whole payload stored under `key`. There is no partial or
    /// delta write: callers always persist the full collection.
    ///
    /// With a quota configured, the write is rejected up front when the new
    /// total (all other payloads plus this one) would exceed it. The check
    /// is replacement-aware: shrinking an existing key always fits.
    pub fn put_collection(&self, key: &str, payload: &str) -> DbResult<()> {
        if let Some(quota) = self.quota_bytes {
            let others: i64 = self.query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(payload AS BLOB))), 0) FROM collections WHERE key != ?1",
                params![key],
                |row| row.get(0),
            )?;
            let needed = others as u64 + payload.len() as u64;
            if needed > quota {
                return Err(DbError::QuotaExceeded { needed, quota });
            }
        }

        self.execute(
            "INSERT OR REPLACE INTO collections (key, payload, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, payload],
        )?;

        Ok(())
    }

    /// Read the raw payload stored under `key`, if any.
    pub fn get_collection(&self, key: &str) -> DbResult<Option<String>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            "SELECT payload FROM collections WHERE key = ?1",
            [key],
            |row| row.get(0),
        ) {
            Ok(payload) => Ok(Some(payload)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the payload stored under `key`. Returns whether a row existed.
    pub fn delete_collection(&self, key: &str) -> DbResult<bool> {
        let affected = self.execute("DELETE FROM collections WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Total bytes currently held across all collection payloads
    /// (telemetry; also the quantity the quota is enforced over).
    pub fn payload_bytes(&self) -> DbResult<u64> {
        let total: i64 = self.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(payload AS BLOB))), 0) FROM collections",
            params![],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    /// Configured quota, if any.
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    // =========================================================================
    // SETTINGS
    // =========================================================================

    /// Get a setting value
    pub fn get_setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let conn = self.get_conn()?;
        let result: Result<String, _> = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(json) => {
                let value: T = serde_json::from_str(&json)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a setting value
    pub fn set_setting<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        let conn = self.get_conn()?;
        let json = serde_json::to_string(value)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;

        Ok(())
    }

    // =========================================================================
    // HELPER METHODS (for queue module and other internal use)
    // =========================================================================

    /// Execute a SQL statement and return affected rows
    pub fn execute<P>(&self, sql: &str, params: P) -> DbResult<usize>
    where
        P: rusqlite::Params,
    {
        let conn = self.get_conn()?;

        let affected = conn.execute(sql, params)?;
        Ok(affected)
    }

    /// Execute an INSERT statement and return the last inserted row ID
    pub fn execute_insert<P>(&self, sql: &str, params: P) -> DbResult<i64>
    where
        P: rusqlite::Params,
    {
        let conn = self.get_conn()?;

        conn.execute(sql, params)?;
        Ok(conn.last_insert_rowid())
    }

    /// Query database and map results
    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> DbResult<Vec<T>>
    where
        P: rusqlite::Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;

        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(DbError::from)
    }

    /// Query single row
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> DbResult<T>
    where
        P: rusqlite::Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.get_conn()?;

        conn.query_row(sql, params, f).map_err(DbError::from)
    }

    /// Execute batch SQL
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let conn = self.get_conn()?;

        conn.execute_batch(sql).map_err(DbError::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
