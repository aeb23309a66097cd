//! Sync Module - Offline-first reconciliation across devices
//!
//! Every data domain (products, requests, customers, orders, recipes,
//! store inventory, staff, attendance, reconciliation reports) is edited
//! locally while offline, then reconciled against the shared remote store
//! with no central lock coordinator.
//!
//! Architecture:
//! - Conflict resolution: last-write-wins per record timestamp, with
//!   tombstones for deletions
//! - Durable pending-operation queue with bounded retry for mutations
//!   made while unreachable
//! - Storage-pressure recovery ladder keeps local persistence writable
//!   under a hard device quota
//! - One orchestrator per collection, one sync in flight per collection

pub mod connectivity;
pub mod merge;
pub mod orchestrator;
pub mod pressure;
pub mod prune;
pub mod queue;
pub mod records;
pub mod remote;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use records::{
    now_ms, AttendanceEntry, AttendanceSheet, Customer, DataDomain, DeviceInfo, InventoryCount,
    MutationIntent, Order, OrderLine, PendingOperation, Product, Recipe, RecipeIngredient,
    ReconciliationReport, StaffMember, StockRequest, SyncRecord,
};

pub use connectivity::ConnectivityMonitor;
pub use merge::{live, merge};
pub use orchestrator::{SyncError, SyncOrchestrator, SyncOutcome, SyncState};
pub use pressure::{write_with_recovery, PressureConfig, RecoveryOutcome, RecoveryStage};
pub use prune::{keep_most_recent, prune, prune_at, DEFAULT_RETENTION_DAYS};
pub use queue::{DrainReport, MutationExecutor, OperationQueue, QueueError, QueueStats};
pub use remote::{HttpRemoteStore, RemoteError, RemoteStore};
pub use scheduler::{BackgroundScheduler, SchedulerConfig, SchedulerError, SyncDriver};
pub use store::{CollectionStore, StoreError};
