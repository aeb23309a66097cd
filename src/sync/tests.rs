//! Integration Tests for the Sync Module
//!
//! Cross-module flows: full orchestrator cycles against an in-memory
//! remote that performs its own server-side merge, offline mutations
//! through the pending queue, storage-pressure recovery end to end, and
//! the re-entrancy guarantees.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::db::Database;

use super::connectivity::ConnectivityMonitor;
use super::orchestrator::{SyncError, SyncOrchestrator, SyncOutcome};
use super::pressure::PressureConfig;
use super::queue::{MutationExecutor, OperationQueue};
use super::records::{
    AttendanceSheet, DataDomain, DeviceInfo, MutationIntent, PendingOperation, Product, SyncRecord,
};
use super::remote::{RemoteError, RemoteStore};
use super::store::CollectionStore;

// ============================================================================
// In-Memory Remote
// ============================================================================

/// Test double for the remote store. Mirrors the production server's
/// behavior on write: union by id, keeping the greater `updatedAt` (the
/// tolerated second merge point).
#[derive(Default)]
struct MemoryRemote {
    collections: StdMutex<HashMap<String, Vec<Value>>>,
    fail_all: AtomicBool,
    slow: AtomicBool,
}

impl MemoryRemote {
    fn seed(&self, key: &str, records: Vec<Value>) {
        self.collections.lock().unwrap().insert(key.to_string(), records);
    }

    fn records(&self, key: &str) -> Vec<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

fn record_stamp(value: &Value) -> i64 {
    value["updatedAt"].as_i64().unwrap_or(0)
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self, key: &str) -> Result<Vec<Value>, RemoteError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout);
        }
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        Ok(self.records(key))
    }

    async fn push(&self, key: &str, records: &[Value]) -> Result<Vec<Value>, RemoteError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout);
        }

        let mut collections = self.collections.lock().unwrap();
        let existing = collections.entry(key.to_string()).or_default();

        let mut by_id: HashMap<String, Value> = existing
            .iter()
            .map(|v| (v["id"].as_str().unwrap_or_default().to_string(), v.clone()))
            .collect();

        for record in records {
            let id = record["id"].as_str().unwrap_or_default().to_string();
            let wins = match by_id.get(&id) {
                Some(held) => record_stamp(record) > record_stamp(held),
                None => true,
            };
            if wins {
                by_id.insert(id, record.clone());
            }
        }

        let merged: Vec<Value> = by_id.into_values().collect();
        *existing = merged.clone();
        Ok(merged)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    db: Arc<Database>,
    remote: Arc<MemoryRemote>,
    queue: Arc<OperationQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    products: SyncOrchestrator<Product>,
}

fn harness() -> Harness {
    harness_with_db(Arc::new(Database::in_memory().unwrap()))
}

fn harness_with_db(db: Arc<Database>) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let remote = Arc::new(MemoryRemote::default());
    let queue = Arc::new(OperationQueue::new(db.clone()).unwrap());
    let connectivity = Arc::new(ConnectivityMonitor::new(true));
    let store = CollectionStore::new(db.clone(), "u1");

    let products = SyncOrchestrator::new(
        DataDomain::Products,
        store,
        remote.clone(),
        queue.clone(),
        connectivity.clone(),
        DeviceInfo::generate(),
    );

    Harness {
        db,
        remote,
        queue,
        connectivity,
        products,
    }
}

fn product(id: &str, updated_at: i64, qty: f64) -> Product {
    Product {
        id: id.to_string(),
        name: format!("product {}", id),
        sku: None,
        unit_price: 1000,
        stock_qty: qty,
        category: None,
        barcode: None,
        updated_at,
        deleted: false,
        created_at: None,
        created_by: None,
        device_id: None,
    }
}

fn as_value(product: &Product) -> Value {
    serde_json::to_value(product).unwrap()
}

// ============================================================================
// Full-Cycle Tests
// ============================================================================

#[tokio::test]
async fn test_remote_tombstone_wins_and_disappears_from_view() {
    let h = harness();
    let store = CollectionStore::new(h.db.clone(), "u1");

    // local: live record at 100; remote: same id tombstoned at 200
    store
        .write(DataDomain::Products, &[product("p1", 100, 5.0)])
        .unwrap();
    let mut dead = product("p1", 0, 0.0);
    dead.mark_deleted(200);
    h.remote.seed("u1:products", vec![as_value(&dead)]);

    let outcome = h.products.sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Completed);

    // consumer view omits the record entirely
    assert!(h.products.snapshot().is_empty());

    // but storage keeps the tombstone for propagation
    let stored: Vec<Product> = store.read(DataDomain::Products).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].deleted);
    assert_eq!(stored[0].updated_at, 200);
}

#[tokio::test]
async fn test_local_only_records_survive_push() {
    let h = harness();
    let store = CollectionStore::new(h.db.clone(), "u1");

    store
        .write(DataDomain::Products, &[product("local-only", 100, 5.0)])
        .unwrap();
    h.remote
        .seed("u1:products", vec![as_value(&product("remote-only", 50, 1.0))]);

    h.products.sync().await.unwrap();

    // both sides now hold both records
    let ids: Vec<String> = h
        .remote
        .records("u1:products")
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"local-only".to_string()));
    assert!(ids.contains(&"remote-only".to_string()));

    let snapshot = h.products.snapshot();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn test_newer_remote_version_adopted() {
    let h = harness();
    let store = CollectionStore::new(h.db.clone(), "u1");

    store
        .write(DataDomain::Products, &[product("p1", 100, 5.0)])
        .unwrap();
    h.remote.seed("u1:products", vec![as_value(&product("p1", 200, 9.0))]);

    h.products.sync().await.unwrap();

    let snapshot = h.products.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].stock_qty, 9.0);
    assert_eq!(snapshot[0].updated_at, 200);
}

#[tokio::test]
async fn test_corrupt_local_payload_recovers_via_remote() {
    let h = harness();

    h.db.put_collection("u1:products", "}{ not json").unwrap();
    h.remote.seed("u1:products", vec![as_value(&product("p1", 10, 1.0))]);

    h.products.sync().await.unwrap();

    // corrupt local state was dropped, remote copy adopted
    let snapshot = h.products.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "p1");
}

#[tokio::test]
async fn test_explicit_sync_propagates_failure_silent_swallows() {
    let h = harness();
    h.remote.fail_all.store(true, Ordering::SeqCst);

    let result = h.products.sync().await;
    assert!(matches!(result, Err(SyncError::Remote(_))));

    // the silent path logs and returns
    h.products.sync_silent().await;

    // the in-flight flag was released both times
    h.remote.fail_all.store(false, Ordering::SeqCst);
    let outcome = h.products.sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Completed);
}

#[tokio::test]
async fn test_overlapping_sync_is_dropped() {
    let h = harness();
    h.remote.slow.store(true, Ordering::SeqCst);

    let background = {
        let products = h.products.clone();
        tokio::spawn(async move { products.sync().await })
    };

    // let the first cycle reach its remote fetch
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = h.products.sync().await.unwrap();
    assert_eq!(second, SyncOutcome::Skipped);

    let first = background.await.unwrap().unwrap();
    assert_eq!(first, SyncOutcome::Completed);
}

#[tokio::test]
async fn test_last_sync_time_advisory_stamp() {
    let h = harness();
    assert!(h.products.last_sync_time().is_none());

    h.products.sync().await.unwrap();
    assert!(h.products.last_sync_time().is_some());
}

// ============================================================================
// Offline Mutations and Queue Replay
// ============================================================================

/// Executor that replays upserts/deletes against the in-memory remote,
/// the way the host application wires its own transport.
struct RemoteReplayExecutor {
    remote: Arc<MemoryRemote>,
    scope: String,
}

#[async_trait]
impl MutationExecutor for RemoteReplayExecutor {
    async fn execute(&self, operation: &PendingOperation) -> bool {
        let key = operation.intent.domain().storage_key(&self.scope);
        let payload = match &operation.intent {
            MutationIntent::ProductUpsert(record) => serde_json::to_value(record).unwrap(),
            MutationIntent::ProductDelete { id, deleted_at } => serde_json::json!({
                "id": id,
                "updatedAt": deleted_at,
                "deleted": true,
            }),
            _ => return false,
        };
        self.remote.push(&key, &[payload]).await.is_ok()
    }
}

#[tokio::test]
async fn test_offline_submit_lands_in_queue_then_replays() {
    let h = harness();
    h.connectivity.set_online(false);

    h.products.submit(product("p1", 0, 3.0)).await.unwrap();

    // persisted locally and published immediately
    assert_eq!(h.products.snapshot().len(), 1);
    assert_eq!(h.queue.len().unwrap(), 1);
    // nothing reached the remote
    assert!(h.remote.records("u1:products").is_empty());

    // connectivity regained: the host drains the queue
    h.connectivity.set_online(true);
    let executor = RemoteReplayExecutor {
        remote: h.remote.clone(),
        scope: "u1".to_string(),
    };
    let report = h.queue.drain(&executor).await.unwrap();

    assert_eq!(report.success, 1);
    assert!(h.queue.is_empty().unwrap());
    assert_eq!(h.remote.records("u1:products").len(), 1);
}

#[tokio::test]
async fn test_offline_remove_queues_tombstone_intent() {
    let h = harness();
    let store = CollectionStore::new(h.db.clone(), "u1");
    store
        .write(DataDomain::Products, &[product("p1", 100, 5.0)])
        .unwrap();

    h.connectivity.set_online(false);
    h.products.remove("p1").await.unwrap();

    // view empties at once, tombstone stays in storage
    assert!(h.products.snapshot().is_empty());
    let stored: Vec<Product> = store.read(DataDomain::Products).unwrap();
    assert!(stored[0].deleted);

    let pending = h.queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].intent.is_delete());
    assert_eq!(pending[0].intent.record_id(), "p1");
}

#[tokio::test]
async fn test_online_submit_syncs_without_queueing() {
    let h = harness();

    h.products.submit(product("p1", 0, 3.0)).await.unwrap();

    // give the spawned background sync a moment
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(h.queue.is_empty().unwrap());
    assert_eq!(h.remote.records("u1:products").len(), 1);
}

#[tokio::test]
async fn test_submit_stamps_record() {
    let h = harness();
    h.connectivity.set_online(false);

    h.products.submit(product("p1", 0, 3.0)).await.unwrap();

    let snapshot = h.products.snapshot();
    assert!(snapshot[0].updated_at > 0);
    assert!(snapshot[0].device_id.is_some());
}

// ============================================================================
// Storage Pressure End to End
// ============================================================================

#[tokio::test]
async fn test_history_sync_truncates_under_quota() {
    let db = Arc::new(Database::in_memory_with_quota(1300).unwrap());
    let remote = Arc::new(MemoryRemote::default());
    let queue = Arc::new(OperationQueue::new(db.clone()).unwrap());
    let connectivity = Arc::new(ConnectivityMonitor::new(true));
    let store = CollectionStore::new(db.clone(), "u1");

    let attendance: SyncOrchestrator<AttendanceSheet> = SyncOrchestrator::new(
        DataDomain::Attendance,
        store.clone(),
        remote.clone(),
        queue,
        connectivity,
        DeviceInfo::generate(),
    )
    .with_pressure_config(PressureConfig::default());

    // remote holds more history than the local quota can take
    let sheets: Vec<Value> = (0..10)
        .map(|i| {
            serde_json::json!({
                "id": format!("s{}", i),
                "sheetDate": chrono::Utc::now().to_rfc3339(),
                "entries": [],
                "importedBy": "x".repeat(80),
                "updatedAt": i * 10,
            })
        })
        .collect();
    remote.seed("u1:attendance", sheets);

    attendance.sync().await.unwrap();

    // the ladder shed data instead of failing, keeping the newest entries
    let stored: Vec<AttendanceSheet> = store.read(DataDomain::Attendance).unwrap();
    assert!(!stored.is_empty());
    assert!(stored.len() < 10);
    let min_kept = stored.iter().map(|s| s.updated_at).min().unwrap();
    assert!(min_kept >= 10 * (10 - stored.len() as i64));
}
