//! Pending Operation Queue - Durable buffer for unconfirmed mutations
//!
//! Mutations made while the remote store is unreachable land here and are
//! replayed later, in insertion order, by an executor the host application
//! supplies. The queue knows nothing about what an operation means; it
//! stores [`MutationIntent`] values opaquely and hands them back.
//!
//! Retry policy is bounded: a failing operation is retried in place (same
//! queue position, FIFO preserved) until it exceeds the retry ceiling,
//! then dropped. The drop is a deliberate data-loss boundary and is always
//! logged, never hidden.

use chrono::{DateTime, Utc};
use rusqlite::params;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::db::{Database, DbError};

use super::records::{MutationIntent, PendingOperation};

const DEFAULT_MAX_RETRIES: i32 = 3;

/// Replays one pending operation against the remote store. Supplied by the
/// host application; returns whether the operation was confirmed.
#[async_trait]
pub trait MutationExecutor: Send + Sync {
    async fn execute(&self, operation: &PendingOperation) -> bool;
}

/// Counts from one drain pass, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// Queue depth and age, for status surfaces.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub pending_count: usize,
    pub oldest_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("a drain is already in progress")]
    DrainInProgress,
}

struct QueueRow {
    seq: i64,
    id: String,
    intent_json: String,
    created_at: String,
    retry_count: i32,
}

/// Clears the single-flight flag on every exit path out of `drain`.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// SQLite-backed FIFO of pending operations.
#[derive(Clone)]
pub struct OperationQueue {
    db: Arc<Database>,
    max_retries: i32,
    draining: Arc<AtomicBool>,
}

impl OperationQueue {
    pub fn new(db: Arc<Database>) -> Result<Self, QueueError> {
        Self::with_max_retries(db, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(db: Arc<Database>, max_retries: i32) -> Result<Self, QueueError> {
        let queue = Self {
            db,
            max_retries,
            draining: Arc::new(AtomicBool::new(false)),
        };
        queue.initialize_schema()?;
        Ok(queue)
    }

    fn initialize_schema(&self) -> Result<(), QueueError> {
        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_operations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                intent TEXT NOT NULL,
                created_at TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    /// Append a mutation with a fresh retry budget. Touches storage only,
    /// never the network.
    pub fn enqueue(&self, intent: MutationIntent) -> Result<PendingOperation, QueueError> {
        let operation = PendingOperation::new(intent);
        let intent_json = serde_json::to_string(&operation.intent)?;

        self.db.execute_insert(
            r#"
            INSERT INTO pending_operations (id, intent, created_at, retry_count)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                operation.id,
                intent_json,
                operation.timestamp.to_rfc3339(),
                operation.retry_count,
            ],
        )?;

        log::info!(
            "Queued {} mutation for {} (queue id {})",
            operation.intent.domain().as_str(),
            operation.intent.record_id(),
            operation.id
        );
        Ok(operation)
    }

    /// Replay the queue in stored order.
    ///
    /// Executor success removes the item. Failure below the retry ceiling
    /// increments `retry_count` in place; at the ceiling the item is
    /// dropped and the loss logged. Single-flight: a concurrent call gets
    /// `QueueError::DrainInProgress` instead of interleaving replays.
    pub async fn drain(&self, executor: &dyn MutationExecutor) -> Result<DrainReport, QueueError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QueueError::DrainInProgress);
        }
        let _guard = DrainGuard(&self.draining);

        let rows = self.load_rows()?;
        let mut report = DrainReport {
            success: 0,
            failed: 0,
            total: rows.len(),
        };

        for row in rows {
            let intent: MutationIntent = match serde_json::from_str(&row.intent_json) {
                Ok(intent) => intent,
                Err(e) => {
                    log::error!("Dropping unreadable pending operation {}: {}", row.id, e);
                    self.delete_row(row.seq)?;
                    report.failed += 1;
                    continue;
                }
            };

            let operation = PendingOperation {
                id: row.id,
                intent,
                timestamp: DateTime::parse_from_rfc3339(&row.created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                retry_count: row.retry_count,
            };

            if executor.execute(&operation).await {
                self.delete_row(row.seq)?;
                report.success += 1;
            } else if operation.retry_count < self.max_retries {
                self.db.execute(
                    "UPDATE pending_operations SET retry_count = retry_count + 1 WHERE seq = ?1",
                    params![row.seq],
                )?;
                report.failed += 1;
            } else {
                log::warn!(
                    "Dropping {} mutation for {} after {} attempts",
                    operation.intent.domain().as_str(),
                    operation.intent.record_id(),
                    operation.retry_count + 1
                );
                self.delete_row(row.seq)?;
                report.failed += 1;
            }
        }

        log::info!(
            "Queue drain finished: {}/{} succeeded, {} failed",
            report.success,
            report.total,
            report.failed
        );
        Ok(report)
    }

    /// All queued operations in replay order.
    pub fn pending(&self) -> Result<Vec<PendingOperation>, QueueError> {
        let rows = self.load_rows()?;
        let mut operations = Vec::with_capacity(rows.len());

        for row in rows {
            let intent: MutationIntent = match serde_json::from_str(&row.intent_json) {
                Ok(intent) => intent,
                Err(e) => {
                    log::warn!("Skipping unreadable pending operation {}: {}", row.id, e);
                    continue;
                }
            };
            operations.push(PendingOperation {
                id: row.id,
                intent,
                timestamp: DateTime::parse_from_rfc3339(&row.created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                retry_count: row.retry_count,
            });
        }

        Ok(operations)
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        let count: i64 =
            self.db
                .query_row("SELECT COUNT(*) FROM pending_operations", params![], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let (count, oldest): (i64, Option<String>) = self.db.query_row(
            "SELECT COUNT(*), MIN(created_at) FROM pending_operations",
            params![],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(QueueStats {
            pending_count: count as usize,
            oldest_created_at: oldest
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    fn load_rows(&self) -> Result<Vec<QueueRow>, QueueError> {
        let rows = self.db.query(
            r#"
            SELECT seq, id, intent, created_at, retry_count
            FROM pending_operations
            ORDER BY seq ASC
            "#,
            params![],
            |row| {
                Ok(QueueRow {
                    seq: row.get(0)?,
                    id: row.get(1)?,
                    intent_json: row.get(2)?,
                    created_at: row.get(3)?,
                    retry_count: row.get(4)?,
                })
            },
        )?;
        Ok(rows)
    }

    fn delete_row(&self, seq: i64) -> Result<(), QueueError> {
        self.db
            .execute("DELETE FROM pending_operations WHERE seq = ?1", params![seq])?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::super::records::{Product, SyncRecord};
    use super::*;

    fn test_queue() -> OperationQueue {
        let db = Arc::new(Database::in_memory().unwrap());
        OperationQueue::new(db).unwrap()
    }

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("product {}", id),
            sku: None,
            unit_price: 1000,
            stock_qty: 1.0,
            category: None,
            barcode: None,
            updated_at: 1,
            deleted: false,
            created_at: None,
            created_by: None,
            device_id: None,
        }
    }

    /// Succeeds for everything except one record id.
    struct RejectOne(&'static str);

    #[async_trait]
    impl MutationExecutor for RejectOne {
        async fn execute(&self, operation: &PendingOperation) -> bool {
            operation.intent.record_id() != self.0
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl MutationExecutor for AlwaysFail {
        async fn execute(&self, _operation: &PendingOperation) -> bool {
            false
        }
    }

    #[test]
    fn test_enqueue_preserves_insertion_order() {
        let queue = test_queue();

        queue.enqueue(product("a").into_upsert_intent()).unwrap();
        queue.enqueue(product("b").into_upsert_intent()).unwrap();
        queue.enqueue(Product::delete_intent("c", 99)).unwrap();

        let pending = queue.pending().unwrap();
        let ids: Vec<&str> = pending.iter().map(|op| op.intent.record_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(pending.iter().all(|op| op.retry_count == 0));
    }

    #[tokio::test]
    async fn test_fifo_with_retry_in_place() {
        let queue = test_queue();

        queue.enqueue(product("a").into_upsert_intent()).unwrap();
        queue.enqueue(product("b").into_upsert_intent()).unwrap();
        queue.enqueue(product("c").into_upsert_intent()).unwrap();

        let report = queue.drain(&RejectOne("b")).await.unwrap();
        assert_eq!(report, DrainReport { success: 2, failed: 1, total: 3 });

        // only b remains, retried in place with its count bumped
        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].intent.record_id(), "b");
        assert_eq!(pending[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_retry_keeps_queue_position() {
        let queue = test_queue();

        queue.enqueue(product("a").into_upsert_intent()).unwrap();
        queue.enqueue(product("b").into_upsert_intent()).unwrap();

        // a fails once, then a new operation arrives behind it
        queue.drain(&RejectOne("a")).await.unwrap();
        queue.enqueue(product("c").into_upsert_intent()).unwrap();

        let pending = queue.pending().unwrap();
        let ids: Vec<&str> = pending.iter().map(|op| op.intent.record_id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_bounded_retry_drops_after_ceiling() {
        let queue = test_queue();
        queue.enqueue(product("doomed").into_upsert_intent()).unwrap();

        // drains 1..=MAX_RETRIES leave the item in place
        for expected_retries in 1..=DEFAULT_MAX_RETRIES {
            queue.drain(&AlwaysFail).await.unwrap();
            let pending = queue.pending().unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].retry_count, expected_retries);
        }

        // drain MAX_RETRIES + 1 gives up and drops it
        let report = queue.drain(&AlwaysFail).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_success_removes_item() {
        let queue = test_queue();
        queue.enqueue(product("a").into_upsert_intent()).unwrap();

        struct AlwaysOk;
        #[async_trait]
        impl MutationExecutor for AlwaysOk {
            async fn execute(&self, _operation: &PendingOperation) -> bool {
                true
            }
        }

        let report = queue.drain(&AlwaysOk).await.unwrap();
        assert_eq!(report, DrainReport { success: 1, failed: 0, total: 1 });
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_intent_dropped_loudly() {
        let db = Arc::new(Database::in_memory().unwrap());
        let queue = OperationQueue::new(db.clone()).unwrap();

        db.execute(
            "INSERT INTO pending_operations (id, intent, created_at, retry_count) VALUES ('x', 'garbage', '2026-01-01T00:00:00Z', 0)",
            params![],
        )
        .unwrap();

        struct AlwaysOk;
        #[async_trait]
        impl MutationExecutor for AlwaysOk {
            async fn execute(&self, _operation: &PendingOperation) -> bool {
                true
            }
        }

        let report = queue.drain(&AlwaysOk).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_stats_report_depth_and_age() {
        let queue = test_queue();
        assert_eq!(queue.stats().unwrap().pending_count, 0);

        queue.enqueue(product("a").into_upsert_intent()).unwrap();
        queue.enqueue(product("b").into_upsert_intent()).unwrap();

        let stats = queue.stats().unwrap();
        assert_eq!(stats.pending_count, 2);
        assert!(stats.oldest_created_at.is_some());
    }

    #[test]
    fn test_queue_survives_reopen() {
        let db = Arc::new(Database::in_memory().unwrap());
        let queue = OperationQueue::new(db.clone()).unwrap();
        queue.enqueue(product("a").into_upsert_intent()).unwrap();

        // a second queue instance over the same database sees the item
        let reopened = OperationQueue::new(db).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
    }
}
