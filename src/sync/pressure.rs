//! Storage-Pressure Recovery - Staged data-shedding when writes hit quota
//!
//! A collection write that exceeds the device quota is not an error the
//! caller sees immediately; it triggers a ladder of increasingly aggressive
//! fallbacks, stopping at the first one that fits:
//!
//! 1. retry the identical write
//! 2. clear the regenerable auxiliary report caches, retry
//! 3. live collections: shed bulky optional payload from every record
//!    history collections: prune to graduated retention windows, then keep
//!    only the N most-recently-updated entries on a descending ladder
//! 4. report storage exhausted with a user-actionable message
//!
//! Every stage recomputes from the in-memory collection passed in, never
//! from partial on-disk state, so re-invoking the ladder after a prior
//! partial success cannot corrupt anything. Data is only ever dropped
//! with a log trail, and total failure is loud.

use super::prune::{keep_most_recent, prune};
use super::records::{DataDomain, SyncRecord};
use super::store::{CollectionStore, StoreError};

/// Ladder tuning. The defaults mirror what the retention behavior shipped
/// with; they are configuration, not law.
#[derive(Debug, Clone)]
pub struct PressureConfig {
    /// Graduated retention windows (days) tried for history collections.
    pub prune_windows: Vec<i64>,
    /// Descending keep-most-recent counts tried after the windows.
    pub retention_counts: Vec<usize>,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            prune_windows: vec![45, 30, 14],
            retention_counts: vec![12, 6, 3, 2, 1],
        }
    }
}

/// Which rung of the ladder the write finally succeeded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    /// First write went through, no pressure.
    Direct,
    /// Identical retry succeeded.
    Retry,
    /// Succeeded after clearing auxiliary caches.
    CacheCleared,
    /// Succeeded after shedding bulky fields from every record.
    Slimmed,
    /// Succeeded after pruning to this retention window (days).
    Pruned(i64),
    /// Succeeded after truncating to the N most-recently-updated records.
    Truncated(usize),
}

/// What was actually persisted, and how hard the ladder had to work.
#[derive(Debug)]
pub struct RecoveryOutcome<T> {
    pub stage: RecoveryStage,
    pub persisted: Vec<T>,
}

/// Attempt a write, fails only on quota.
fn try_write<T: SyncRecord>(
    store: &CollectionStore,
    domain: DataDomain,
    records: &[T],
) -> Result<bool, StoreError> {
    match store.write(domain, records) {
        Ok(()) => Ok(true),
        Err(StoreError::QuotaExceeded(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Persist `records`, walking the fallback ladder on quota failure.
///
/// Returns the stage that succeeded and the records actually persisted
/// (callers publish and push exactly that set). `StorageExhausted` only
/// comes back when every rung failed.
pub fn write_with_recovery<T: SyncRecord>(
    store: &CollectionStore,
    domain: DataDomain,
    records: Vec<T>,
    cfg: &PressureConfig,
) -> Result<RecoveryOutcome<T>, StoreError> {
    // Stage 0: the normal path.
    if try_write(store, domain, &records)? {
        return Ok(RecoveryOutcome {
            stage: RecoveryStage::Direct,
            persisted: records,
        });
    }
    log::warn!(
        "Quota hit writing {} ({} records), entering recovery ladder",
        domain.as_str(),
        records.len()
    );

    // Stage 1: identical retry. Catches transient accounting races where
    // another in-flight write just freed space.
    if try_write(store, domain, &records)? {
        log::info!("{}: identical retry succeeded", domain.as_str());
        return Ok(RecoveryOutcome {
            stage: RecoveryStage::Retry,
            persisted: records,
        });
    }

    // Stage 2: clear regenerable caches belonging to other features.
    let cleared = store.clear_aux_caches()?;
    if cleared > 0 && try_write(store, domain, &records)? {
        log::info!(
            "{}: write succeeded after clearing {} caches",
            domain.as_str(),
            cleared
        );
        return Ok(RecoveryOutcome {
            stage: RecoveryStage::CacheCleared,
            persisted: records,
        });
    }

    // Stage 3: shed data. Live collections lose bulky optional fields;
    // history collections shrink by age, then by count.
    if domain.is_history() {
        for days in &cfg.prune_windows {
            let pruned = prune(records.clone(), *days);
            if try_write(store, domain, &pruned)? {
                log::warn!(
                    "{}: kept only the last {} days to fit quota",
                    domain.as_str(),
                    days
                );
                return Ok(RecoveryOutcome {
                    stage: RecoveryStage::Pruned(*days),
                    persisted: pruned,
                });
            }
        }

        for count in &cfg.retention_counts {
            let kept = keep_most_recent(records.clone(), *count);
            if try_write(store, domain, &kept)? {
                log::warn!(
                    "{}: truncated to the {} most recent entries to fit quota",
                    domain.as_str(),
                    count
                );
                return Ok(RecoveryOutcome {
                    stage: RecoveryStage::Truncated(*count),
                    persisted: kept,
                });
            }
        }
    } else {
        let mut slimmed = records.clone();
        for record in &mut slimmed {
            record.shed_bulk();
        }
        if try_write(store, domain, &slimmed)? {
            log::warn!(
                "{}: shed bulky optional fields to fit quota",
                domain.as_str()
            );
            return Ok(RecoveryOutcome {
                stage: RecoveryStage::Slimmed,
                persisted: slimmed,
            });
        }
    }

    // Stage 4: nothing fits. Loud, actionable, never silent.
    log::error!(
        "{}: every storage fallback failed, local storage is exhausted",
        domain.as_str()
    );
    Err(StoreError::StorageExhausted(format!(
        "could not persist the {} collection: local storage is full and no fallback freed \
         enough space. Free up device storage or remove old data, then retry the sync.",
        domain.as_str()
    )))
}

// ============================================================================
// Tests
// ============================================================================
