//! Merge Engine - Last-write-wins reconciliation of two collection versions
//!
//! Pure functions, no I/O. The merge is the single conflict-resolution point
//! of the whole engine: per record id, the version with the greater
//! `updatedAt` wins, whole-record. Tombstones flow through the same rule, so
//! a deletion stamped on one device beats an older edit from another.
//!
//! Deliberately weaker than CRDT field merging: concurrent edits to the same
//! record lose all but the latest writer. Multi-device tolerance rests
//! entirely on this coarse rule, there is no lock coordinator.

use std::collections::HashMap;

use super::records::SyncRecord;

/// Reconcile a local and a remote version of the same collection.
///
/// The map is seeded with every local record; a remote record replaces the
/// entry only when none exists or its `updated_at` is strictly greater.
/// Equal stamps keep the local entry, so a tie can never resurrect a local
/// tombstone. Output order is unspecified and nothing downstream relies
/// on it.
///
/// Duplicate ids inside one input are corrupt data; the last occurrence in
/// that input wins within the pass, nothing more is guaranteed.
pub fn merge<T: SyncRecord>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    let mut by_id: HashMap<String, T> = HashMap::with_capacity(local.len() + remote.len());

    for record in local {
        by_id.insert(record.id().to_string(), record);
    }

    for record in remote {
        let wins = match by_id.get(record.id()) {
            Some(existing) => record.updated_at() > existing.updated_at(),
            None => true,
        };
        if wins {
            by_id.insert(record.id().to_string(), record);
        }
    }

    by_id.into_values().collect()
}

/// Consumer-facing projection: everything not tombstoned. Storage keeps the
/// tombstones so deletions still propagate.
pub fn live<T: SyncRecord>(records: &[T]) -> Vec<T> {
    records
        .iter()
        .filter(|record| !record.is_deleted())
        .cloned()
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
