//! Collection Store - Local persistence adapter for synced collections
//!
//! Thin typed layer over the database, scoped to one user. Every collection
//! is stored as a single JSON array (tombstones included) under
//! `"{user}:{domain}"`; writes always replace the whole array.
//!
//! Corrupt payloads (non-JSON, non-array) are treated as an empty
//! collection and the key is best-effort cleared: losing unreadable local
//! data keeps the app running and the next sync restores the server copy.
//! Quota failures are surfaced distinctly so the storage-pressure ladder
//! can react instead of the caller failing outright.

use std::sync::Arc;
use thiserror::Error;

use crate::db::{Database, DbError};

use super::records::{DataDomain, SyncRecord};

/// Known-large, safely-regenerable report caches. Cleared wholesale by the
/// storage-pressure ladder before any synced data is touched: every one of
/// them can be rebuilt from the collections themselves.
const AUX_CACHE_NAMES: [&str; 4] = [
    "sales_report",
    "kitchen_stock_report",
    "inventory_snapshot",
    "activity_log",
];

#[derive(Debug, Error)]
pub enum StoreError {
    /// A single write did not fit the device quota. Recoverable: the
    /// storage-pressure ladder steps in.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Every fallback failed. Not recoverable without user action.
    #[error("local storage exhausted: {0}")]
    StorageExhausted(String),

    #[error("database error: {0}")]
    Database(DbError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::QuotaExceeded { needed, quota } => StoreError::QuotaExceeded(format!(
                "{} bytes needed, quota is {}",
                needed, quota
            )),
            other => StoreError::Database(other),
        }
    }
}

/// Local store adapter, scoped to one user. Clone is cheap (shared pool).
#[derive(Clone)]
pub struct CollectionStore {
    db: Arc<Database>,
    scope: String,
}

impl CollectionStore {
    pub fn new(db: Arc<Database>, scope: impl Into<String>) -> Self {
        Self {
            db,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Storage key for a domain under this user scope. The remote store is
    /// addressed by the same key.
    pub fn storage_key(&self, domain: DataDomain) -> String {
        domain.storage_key(&self.scope)
    }

    /// Read the full stored collection, tombstones included.
    ///
    /// A missing key is an empty collection. A corrupt payload is logged,
    /// the key is cleared and an empty collection returned; the parse error
    /// never propagates upward.
    pub fn read<T: SyncRecord>(&self, domain: DataDomain) -> Result<Vec<T>, StoreError> {
        let key = self.storage_key(domain);

        let Some(payload) = self.db.get_collection(&key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<T>>(&payload) {
            Ok(records) => Ok(records),
            Err(e) => {
                log::warn!("Corrupt payload under {} ({}), clearing key", key, e);
                if let Err(e) = self.db.delete_collection(&key) {
                    log::warn!("Could not clear corrupt key {}: {}", key, e);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Replace the stored collection. Quota failures come back as
    /// `StoreError::QuotaExceeded` for the recovery ladder.
    pub fn write<T: SyncRecord>(&self, domain: DataDomain, records: &[T]) -> Result<(), StoreError> {
        let key = self.storage_key(domain);
        let payload = serde_json::to_string(records)?;

        self.db.put_collection(&key, &payload)?;
        Ok(())
    }

    /// Bytes currently held across all local payloads (telemetry).
    pub fn usage_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.db.payload_bytes()?)
    }

    // =========================================================================
    // AUXILIARY CACHES
    // =========================================================================

    fn cache_key(&self, name: &str) -> String {
        format!("{}:cache:{}", self.scope, name)
    }

    /// Store a regenerable report cache. Quota failures propagate like
    /// collection writes; callers treat caches as disposable.
    pub fn write_cache(&self, name: &str, payload: &str) -> Result<(), StoreError> {
        self.db.put_collection(&self.cache_key(name), payload)?;
        Ok(())
    }

    pub fn read_cache(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.db.get_collection(&self.cache_key(name))?)
    }

    /// Drop every known auxiliary cache. Returns how many keys actually
    /// held data.
    pub fn clear_aux_caches(&self) -> Result<usize, StoreError> {
        let mut cleared = 0;
        for name in AUX_CACHE_NAMES {
            if self.db.delete_collection(&self.cache_key(name))? {
                cleared += 1;
            }
        }
        if cleared > 0 {
            log::info!("Cleared {} auxiliary caches to free storage", cleared);
        }
        Ok(cleared)
    }
}

// ============================================================================
// Tests
// ============================================================================
