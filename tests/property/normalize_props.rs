//! Property-based tests for the record normalizer.
//!
//! Uses proptest to verify:
//! 1. Any JSON value normalizes without panicking and yields a task that
//!    satisfies the data-model invariants.
//! 2. Normalizing an already normalized task changes nothing.
//! 3. Ownership repair only touches placeholder owners.

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use taskboard_proto::normalize::{NormalizeContext, normalize_task};
use taskboard_proto::task::{Status, UNASSIGNED};

// --- Strategies ---

/// Arbitrary JSON, biased toward the keys a task record uses.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1.0e15f64..1.0e15).prop_map(|f| json!(f)),
        "[a-zA-Z0-9 :_-]{0,24}".prop_map(Value::String),
        Just(json!("unassigned")),
        Just(json!("done")),
        Just(json!("2024-05-06T07:08:09Z")),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((arb_key(), inner), 0..8)
                .prop_map(|pairs| Value::Object(pairs.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("id".to_string()),
        Just("title".to_string()),
        Just("project".to_string()),
        Just("status".to_string()),
        Just("priority".to_string()),
        Just("assignedTo".to_string()),
        Just("createdBy".to_string()),
        Just("createdAt".to_string()),
        Just("updatedAt".to_string()),
        Just("completedAt".to_string()),
        Just("deletedAt".to_string()),
        Just("dueDate".to_string()),
        Just("subtasks".to_string()),
        Just("ganttDays".to_string()),
        Just("userIds".to_string()),
        Just("userId".to_string()),
        Just("date".to_string()),
        "[a-z]{1,8}",
    ]
}

fn arb_user() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(UNASSIGNED.to_string())),
        "[a-z]{1,8}".prop_map(Some),
    ]
}

proptest! {
    /// Any JSON value yields a well-formed task.
    #[test]
    fn normalize_is_total(value in arb_json(), user in arb_user(), now in 0i64..4_000_000_000_000) {
        let ctx = NormalizeContext::new(user, now);
        let task = normalize_task(&value, &ctx);

        prop_assert!(!task.id.as_str().trim().is_empty());
        prop_assert!(!task.title.is_empty());
        prop_assert_eq!(task.title.clone(), task.title.to_uppercase());
        prop_assert!(!task.project.is_empty());
        prop_assert!(!task.created_by.is_empty());
        if task.status == Status::Done {
            prop_assert!(task.completed_at.is_some());
        }
        for subtask in &task.subtasks {
            prop_assert!(!subtask.id.is_empty());
        }
    }

    /// Normalizing the serialized output again is a no-op.
    #[test]
    fn normalize_is_idempotent(value in arb_json(), user in arb_user(), now in 0i64..4_000_000_000_000) {
        let ctx = NormalizeContext::new(user, now);
        let once = normalize_task(&value, &ctx);
        let encoded = serde_json::to_value(&once).unwrap();
        let twice = normalize_task(&encoded, &ctx);
        prop_assert_eq!(once, twice);
    }

    /// A real assignee list survives repair even when the creator is a
    /// placeholder.
    #[test]
    fn repair_leaves_real_assignees(assignee in "[a-z]{1,8}", fallback in "[a-z]{1,8}") {
        prop_assume!(assignee != UNASSIGNED && fallback != UNASSIGNED);
        let ctx = NormalizeContext::new(Some(fallback.clone()), 0);
        let task = normalize_task(
            &json!({"id": "x", "createdBy": UNASSIGNED, "assignedTo": [assignee.clone()]}),
            &ctx,
        );
        prop_assert_eq!(task.created_by, fallback);
        prop_assert_eq!(task.assigned_to, vec![assignee]);
    }
}
