//! Pure reconciliation of two task collections.
//!
//! Whole-record Last-Write-Wins keyed by task id: a record with a newer
//! (or equal) `updated_at` replaces the other entirely, tombstone state
//! included. That is how deletes propagate, and why an older live copy
//! can never resurrect a newer tombstone. No record is ever dropped: the
//! output is the union of ids from both sides.
//!
//! Timestamps are wall-clock milliseconds from whichever machine made the
//! edit; skew between machines is not compensated.

use std::collections::HashMap;

use taskboard_proto::task::{Task, TaskId};

/// Returns `true` if `incoming` should replace `existing`.
///
/// Ties favor the incoming record, so re-merging the same snapshot is a
/// no-op.
#[must_use]
pub const fn incoming_wins(existing: &Task, incoming: &Task) -> bool {
    incoming.updated_at >= existing.updated_at
}

/// Merges `incoming` into `existing`, returning the reconciled collection.
///
/// Records keep the order of `existing`; ids only present in `incoming` are
/// appended in their incoming order.
#[must_use]
pub fn reconcile(existing: &[Task], incoming: &[Task]) -> Vec<Task> {
    let mut merged: Vec<Task> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<TaskId, usize> = HashMap::with_capacity(existing.len());

    for task in existing.iter().chain(incoming) {
        if let Some(&slot) = index.get(&task.id) {
            if incoming_wins(&merged[slot], task) {
                merged[slot] = task.clone();
            }
        } else {
            index.insert(task.id.clone(), merged.len());
            merged.push(task.clone());
        }
    }

    merged
}

/// Returns `true` if both collections hold exactly the same records,
/// ignoring order.
#[must_use]
pub fn same_records(a: &[Task], b: &[Task]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let by_id: HashMap<&TaskId, &Task> = a.iter().map(|t| (&t.id, t)).collect();
    by_id.len() == b.len() && b.iter().all(|t| by_id.get(&t.id) == Some(&t))
}
