//! Sync Orchestrator - One full reconciliation cycle per collection
//!
//! Each collection gets its own orchestrator driving the
//! read → fetch → merge → persist → push → publish cycle. State machine is
//! Idle → Syncing → Idle, with a transient SyncFailed recorded for status
//! surfaces; an atomic in-flight flag guards re-entry (an overlapping sync
//! request is dropped, not queued) and is cleared by a drop guard so even a
//! failed or timed-out cycle can never wedge the orchestrator.
//!
//! Local mutations go through `submit`/`remove`, which always re-read the
//! stored collection first instead of trusting the in-memory view. That
//! fresh read is what prevents one in-flight operation from clobbering
//! another's write on the same collection - do not optimize it away.
//!
//! Error posture: explicit (`sync`) calls propagate failures so a UI can
//! report them; background (`sync_silent`) calls swallow and log. Silence
//! is deliberate and observable in the logs, never an accident.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;

use super::connectivity::ConnectivityMonitor;
use super::merge::{live, merge};
use super::pressure::{write_with_recovery, PressureConfig, RecoveryStage};
use super::prune::{prune, DEFAULT_RETENTION_DAYS};
use super::queue::{OperationQueue, QueueError};
use super::records::{now_ms, DataDomain, DeviceInfo, SyncRecord};
use super::remote::{RemoteError, RemoteStore};
use super::scheduler::SyncDriver;
use super::store::{CollectionStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Collection sync status, mirrored to status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    SyncFailed,
}

/// What an explicit sync request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A full cycle ran to completion.
    Completed,
    /// Another cycle was already in flight; this request was dropped.
    Skipped,
}

/// Clears the in-flight flag on every exit path, including panics and
/// timed-out remote calls.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-collection sync driver. Clone is cheap: all state is shared, so a
/// clone can be moved into a background task.
#[derive(Clone)]
pub struct SyncOrchestrator<T: SyncRecord> {
    domain: DataDomain,
    store: CollectionStore,
    remote: Arc<dyn RemoteStore>,
    queue: Arc<OperationQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    pressure: Arc<PressureConfig>,
    device: Arc<DeviceInfo>,
    in_flight: Arc<AtomicBool>,
    state: Arc<StdRwLock<SyncState>>,
    published: Arc<StdRwLock<Vec<T>>>,
    last_sync_time: Arc<StdRwLock<Option<DateTime<Utc>>>>,
}

impl<T: SyncRecord> SyncOrchestrator<T> {
    pub fn new(
        domain: DataDomain,
        store: CollectionStore,
        remote: Arc<dyn RemoteStore>,
        queue: Arc<OperationQueue>,
        connectivity: Arc<ConnectivityMonitor>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            domain,
            store,
            remote,
            queue,
            connectivity,
            pressure: Arc::new(PressureConfig::default()),
            device: Arc::new(device),
            in_flight: Arc::new(AtomicBool::new(false)),
            state: Arc::new(StdRwLock::new(SyncState::Idle)),
            published: Arc::new(StdRwLock::new(Vec::new())),
            last_sync_time: Arc::new(StdRwLock::new(None)),
        }
    }

    pub fn with_pressure_config(mut self, cfg: PressureConfig) -> Self {
        self.pressure = Arc::new(cfg);
        self
    }

    pub fn domain(&self) -> DataDomain {
        self.domain
    }

    /// The published, consumer-facing view: merged and tombstone-free.
    pub fn snapshot(&self) -> Vec<T> {
        self.published.read().unwrap().clone()
    }

    pub fn state(&self) -> SyncState {
        *self.state.read().unwrap()
    }

    /// Advisory timestamp of the last completed cycle. In-memory only;
    /// a UI/telemetry signal, not a correctness mechanism.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_time.read().unwrap()
    }

    // ========================================================================
    // Sync Cycle
    // ========================================================================

    /// Explicit, user-triggered sync. Propagates failures so the caller
    /// can surface them. If a cycle is already in flight the request is a
    /// no-op and reports `Skipped`.
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("{}: sync already in flight, dropping request", self.domain.as_str());
            return Ok(SyncOutcome::Skipped);
        }
        let _guard = InFlightGuard(self.in_flight.clone());
        *self.state.write().unwrap() = SyncState::Syncing;

        match self.run_cycle().await {
            Ok(()) => {
                *self.state.write().unwrap() = SyncState::Idle;
                Ok(SyncOutcome::Completed)
            }
            Err(e) => {
                *self.state.write().unwrap() = SyncState::SyncFailed;
                Err(e)
            }
        }
    }

    /// Background sync: errors are intentionally discarded after logging.
    pub async fn sync_silent(&self) {
        match self.sync().await {
            Ok(_) => {}
            Err(e) => {
                log::warn!("{}: background sync failed: {}", self.domain.as_str(), e);
            }
        }
    }

    async fn run_cycle(&self) -> Result<(), SyncError> {
        let key = self.store.storage_key(self.domain);
        log::debug!("{}: sync cycle starting", self.domain.as_str());

        // Always reconcile against what is actually on disk, not the
        // published view: a local mutation may have landed since.
        let local: Vec<T> = self.store.read(self.domain)?;

        let raw_remote = self.remote.fetch(&key).await?;
        let remote = decode_records::<T>(raw_remote, self.domain);

        let mut merged = merge(local, remote);

        // History collections are pruned before every persist so retention
        // holds even when the quota never triggers.
        if self.domain.is_history() {
            merged = prune(merged, DEFAULT_RETENTION_DAYS);
        }

        let outcome = write_with_recovery(&self.store, self.domain, merged, &self.pressure)?;
        if outcome.stage != RecoveryStage::Direct {
            log::warn!(
                "{}: persisted under storage pressure ({:?})",
                self.domain.as_str(),
                outcome.stage
            );
        }
        let persisted = outcome.persisted;

        let payload = encode_records(&persisted)?;
        let server_view = self.remote.push(&key, &payload).await?;
        log::debug!(
            "{}: pushed {} records, server holds {}",
            self.domain.as_str(),
            payload.len(),
            server_view.len()
        );

        *self.published.write().unwrap() = live(&persisted);
        *self.last_sync_time.write().unwrap() = Some(Utc::now());

        log::info!(
            "{}: sync cycle complete ({} records, {} visible)",
            self.domain.as_str(),
            persisted.len(),
            self.published.read().unwrap().len()
        );
        Ok(())
    }

    // ========================================================================
    // Local Mutations
    // ========================================================================

    /// Insert or update a record locally, then propagate: straight to a
    /// background sync when the backend is reachable, into the pending
    /// queue otherwise.
    pub async fn submit(&self, mut record: T) -> Result<(), SyncError> {
        record.touch(now_ms());
        record.set_device(&self.device.device_id);

        // Fresh read-modify-write; the published view may be stale.
        let fresh: Vec<T> = self.store.read(self.domain)?;
        let mut updated: Vec<T> = fresh
            .into_iter()
            .filter(|existing| existing.id() != record.id())
            .collect();
        updated.push(record.clone());

        let outcome = write_with_recovery(&self.store, self.domain, updated, &self.pressure)?;
        *self.published.write().unwrap() = live(&outcome.persisted);

        if self.connectivity.is_online() {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                orchestrator.sync_silent().await;
            });
        } else {
            self.queue.enqueue(record.into_upsert_intent())?;
        }

        Ok(())
    }

    /// Tombstone a record locally, then propagate like `submit`. The
    /// record stays in storage so the deletion reaches other devices.
    pub async fn remove(&self, id: &str) -> Result<(), SyncError> {
        let stamp = now_ms();

        let mut updated: Vec<T> = self.store.read(self.domain)?;
        let mut found = false;
        for record in &mut updated {
            if record.id() == id {
                record.mark_deleted(stamp);
                record.set_device(&self.device.device_id);
                found = true;
            }
        }
        if !found {
            log::debug!("{}: remove of unknown id {}", self.domain.as_str(), id);
        }

        let outcome = write_with_recovery(&self.store, self.domain, updated, &self.pressure)?;
        *self.published.write().unwrap() = live(&outcome.persisted);

        if self.connectivity.is_online() {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                orchestrator.sync_silent().await;
            });
        } else {
            self.queue.enqueue(T::delete_intent(id, stamp))?;
        }

        Ok(())
    }
}

#[async_trait]
impl<T: SyncRecord> SyncDriver for SyncOrchestrator<T> {
    fn domain(&self) -> DataDomain {
        self.domain
    }

    async fn sync_silent(&self) {
        SyncOrchestrator::sync_silent(self).await;
    }
}

/// Tolerant per-record decoding of a remote payload: one malformed record
/// is logged and skipped, the rest of the collection still syncs.
fn decode_records<T: SyncRecord>(raw: Vec<Value>, domain: DataDomain) -> Vec<T> {
    let mut records = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("{}: skipping invalid remote record: {}", domain.as_str(), e);
            }
        }
    }
    records
}

fn encode_records<T: SyncRecord>(records: &[T]) -> Result<Vec<Value>, SyncError> {
    let mut values = Vec::with_capacity(records.len());
    for record in records {
        values.push(serde_json::to_value(record).map_err(StoreError::from)?);
    }
    Ok(values)
}

// ============================================================================
// Tests
// ============================================================================
