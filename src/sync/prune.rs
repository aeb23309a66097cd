//! Retention Pruner - Bounds growth of history-shaped collections
//!
//! Attendance sheets and reconciliation reports accumulate forever if left
//! alone; on a quota-limited device they are the first thing to blow the
//! storage budget. Pruning drops records whose business date (sheet date,
//! report date - not `updatedAt`) fell out of the retention window.
//!
//! Pure and side-effect-free: callers decide when to persist the result.

use chrono::{DateTime, Duration, Utc};

use super::records::SyncRecord;

/// Default window applied defensively before every persistence of a
/// history-shaped collection.
pub const DEFAULT_RETENTION_DAYS: i64 = 60;

/// Drop records whose `record_date` is strictly older than `days_to_keep`
/// days before now. Records without a date are kept.
pub fn prune<T: SyncRecord>(records: Vec<T>, days_to_keep: i64) -> Vec<T> {
    prune_at(records, days_to_keep, Utc::now())
}

/// Same as [`prune`] with an explicit "now", which makes the horizon
/// deterministic. Idempotent at a fixed `now`.
pub fn prune_at<T: SyncRecord>(records: Vec<T>, days_to_keep: i64, now: DateTime<Utc>) -> Vec<T> {
    let cutoff = now - Duration::days(days_to_keep);
    let before = records.len();

    let kept: Vec<T> = records
        .into_iter()
        .filter(|record| match record.record_date() {
            Some(date) => date >= cutoff,
            None => true,
        })
        .collect();

    if kept.len() < before {
        log::debug!(
            "Pruned {} of {} records older than {} days",
            before - kept.len(),
            before,
            days_to_keep
        );
    }

    kept
}

/// Keep only the `n` most-recently-updated records. Last rung of the
/// storage-pressure ladder, when age-based pruning still does not fit.
pub fn keep_most_recent<T: SyncRecord>(mut records: Vec<T>, n: usize) -> Vec<T> {
    records.sort_by_key(|record| std::cmp::Reverse(record.updated_at()));
    records.truncate(n);
    records
}

// ============================================================================
// Tests
// ============================================================================
