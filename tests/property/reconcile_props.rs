//! Property-based tests for whole-record Last-Write-Wins reconciliation.
//!
//! Uses proptest to verify:
//! 1. Merging collections with disjoint ids is commutative as a set.
//! 2. The result holds every distinct id exactly once.
//! 3. Merging a collection with itself changes nothing.
//! 4. For a shared id the record with the newer `updated_at` wins, and a
//!    newer tombstone is never undone by an older live copy.

use std::collections::BTreeSet;

use proptest::prelude::*;
use taskboard::tasks::{reconcile, same_records};
use taskboard_proto::task::{Priority, Status, Task, TaskId};

// --- Strategies ---

fn make_task(id: String, title: String, updated_at: i64, deleted: bool) -> Task {
    Task {
        id: TaskId::from(id),
        title,
        project: "GENERAL".to_string(),
        due_date: None,
        priority: Priority::Med,
        status: Status::Todo,
        assigned_to: vec!["alice".to_string()],
        created_by: "alice".to_string(),
        notes: String::new(),
        favorite: false,
        archived: false,
        archived_at: None,
        subtasks: Vec::new(),
        gantt_days: Vec::new(),
        created_at: 0,
        updated_at,
        completed_at: None,
        deleted_at: deleted.then_some(updated_at),
    }
}

fn arb_task(id_prefix: &'static str) -> impl Strategy<Value = Task> {
    ("[0-9]{1,3}", "[A-Z]{1,6}", 0i64..10_000, any::<bool>()).prop_map(
        move |(n, title, updated_at, deleted)| {
            make_task(format!("{id_prefix}{n}"), title, updated_at, deleted)
        },
    )
}

/// A collection with unique ids, all starting with `id_prefix`.
fn arb_collection(id_prefix: &'static str) -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(arb_task(id_prefix), 0..12).prop_map(|tasks| {
        let mut seen = BTreeSet::new();
        tasks
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect()
    })
}

fn ids(tasks: &[Task]) -> BTreeSet<TaskId> {
    tasks.iter().map(|t| t.id.clone()).collect()
}

proptest! {
    /// Disjoint collections merge to the same set in either order.
    #[test]
    fn disjoint_merge_commutes(a in arb_collection("a-"), b in arb_collection("b-")) {
        let ab = reconcile(&a, &b);
        let ba = reconcile(&b, &a);
        prop_assert!(same_records(&ab, &ba));
    }

    /// Every distinct id appears exactly once.
    #[test]
    fn merge_is_union(a in arb_collection("x-"), b in arb_collection("x-")) {
        let merged = reconcile(&a, &b);
        let expected: BTreeSet<TaskId> = ids(&a).union(&ids(&b)).cloned().collect();
        prop_assert_eq!(merged.len(), expected.len());
        prop_assert_eq!(ids(&merged), expected);
    }

    /// Merging a collection with itself is the identity.
    #[test]
    fn self_merge_is_identity(a in arb_collection("s-")) {
        prop_assert_eq!(reconcile(&a, &a), a);
    }

    /// Merging the result again with either input changes nothing.
    #[test]
    fn merge_absorbs_its_inputs(a in arb_collection("x-"), b in arb_collection("x-")) {
        let merged = reconcile(&a, &b);
        prop_assert!(same_records(&reconcile(&merged, &b), &merged));
    }

    /// The newer record wins regardless of side.
    #[test]
    fn newer_record_wins(
        older in 0i64..5_000,
        delta in 1i64..5_000,
        older_deleted in any::<bool>(),
        newer_deleted in any::<bool>(),
    ) {
        let old = make_task("t".to_string(), "OLD".to_string(), older, older_deleted);
        let new = make_task("t".to_string(), "NEW".to_string(), older + delta, newer_deleted);

        for merged in [reconcile(&[old.clone()], &[new.clone()]), reconcile(&[new.clone()], &[old.clone()])] {
            prop_assert_eq!(merged.len(), 1);
            prop_assert_eq!(&merged[0], &new);
            prop_assert_eq!(merged[0].is_deleted(), newer_deleted);
        }
    }
}
