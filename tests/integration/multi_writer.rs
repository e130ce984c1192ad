//! Integration tests for several application instances sharing one file.
//!
//! Each instance is a `SyncController` with its own cache; all of them share
//! one in-memory filesystem, so every write one makes is visible to the
//! others' polls.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use taskboard::storage::{LockConfig, MemoryCache, MemoryFs, WriterConfig};
use taskboard::sync::{PollOutcome, SyncConfig, SyncController, SyncStatus, spawn_sync};
use taskboard::tasks::{NewTask, TaskPatch};
use taskboard_proto::document::TaskDocument;
use taskboard_proto::normalize::NormalizeContext;
use taskboard_proto::task::{Priority, Status, Task, TaskId};

const SHARED: &str = "/mnt/team/tasks.json";

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn config(debounce_ms: u64) -> SyncConfig {
    SyncConfig {
        shared_path: SHARED.into(),
        poll_interval: Duration::from_secs(60),
        debounce: Duration::from_millis(debounce_ms),
        writer: WriterConfig {
            lock: LockConfig {
                retries: 1,
                retry_delay: Duration::from_millis(1),
                stale_after: Duration::from_secs(10),
            },
            settle_delay: Duration::ZERO,
            keep_backups: 3,
        },
    }
}

type Instance = SyncController<MemoryFs, MemoryCache>;

fn instance(fs: &Arc<MemoryFs>, user: &str) -> Instance {
    SyncController::new(
        Arc::clone(fs),
        Arc::new(MemoryCache::new()),
        Some(user.to_string()),
        config(20),
    )
}

fn titled(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        ..NewTask::default()
    }
}

/// A well-formed task with an explicit `updated_at`.
fn task_at(id: &str, title: &str, updated_at: i64) -> Task {
    let ctx = NormalizeContext::new(Some("alice".to_string()), 1);
    let mut task = taskboard_proto::normalize::normalize_task(
        &serde_json::json!({"id": id, "title": title, "createdAt": 1}),
        &ctx,
    );
    task.updated_at = updated_at;
    task
}

fn on_disk(fs: &MemoryFs) -> TaskDocument {
    let bytes = fs.contents(Path::new(SHARED)).expect("shared file exists");
    TaskDocument::from_json_bytes(&bytes, &NormalizeContext::new(None, 0)).unwrap()
}

// ===========================================================================
// Two-writer scenarios
// ===========================================================================

#[tokio::test]
async fn edit_round_trips_between_two_writers() {
    let fs = Arc::new(MemoryFs::new());
    let mut a = instance(&fs, "alice");
    a.start().await;
    a.mutate(|s| {
        s.replace_tasks(vec![task_at("t1", "draft", 100)]);
        Ok(())
    })
    .unwrap();
    a.flush().await.unwrap();

    let mut b = instance(&fs, "bob");
    b.start().await;
    let adopted = b.store().get(&TaskId::from("t1")).unwrap().clone();
    assert_eq!(adopted.updated_at, 100);
    assert_eq!(adopted.title, "DRAFT");

    b.mutate(|s| {
        s.replace_tasks(vec![task_at("t1", "final", 200)]);
        Ok(())
    })
    .unwrap();
    b.flush().await.unwrap();

    let outcome = a.poll().await;
    assert_eq!(
        outcome,
        PollOutcome::Reconciled {
            adopted: true,
            write_back: false
        }
    );
    let t1 = a.store().get(&TaskId::from("t1")).unwrap();
    assert_eq!(t1.updated_at, 200);
    assert_eq!(t1.title, "FINAL");
}

#[tokio::test]
async fn store_edits_propagate_both_ways() {
    let fs = Arc::new(MemoryFs::new());
    let mut a = instance(&fs, "alice");
    a.start().await;
    let task = a.mutate(|s| s.create_task(titled("ship it"))).unwrap();
    a.flush().await.unwrap();

    let mut b = instance(&fs, "bob");
    b.start().await;
    b.mutate(|s| {
        s.update_task(
            &task.id,
            TaskPatch {
                priority: Some(Priority::High),
                status: Some(Status::Review),
                ..TaskPatch::default()
            },
        )
    })
    .unwrap();
    b.flush().await.unwrap();

    a.poll().await;
    let seen = a.store().get(&task.id).unwrap();
    assert_eq!(seen.priority, Priority::High);
    assert_eq!(seen.status, Status::Review);
    assert_eq!(seen.created_by, "alice");
}

#[tokio::test]
async fn disjoint_creations_converge() {
    let fs = Arc::new(MemoryFs::new());
    let mut a = instance(&fs, "alice");
    let mut b = instance(&fs, "bob");
    a.start().await;
    b.start().await;

    let ta = a.mutate(|s| s.create_task(titled("from alice"))).unwrap();
    let tb = b.mutate(|s| s.create_task(titled("from bob"))).unwrap();

    a.flush().await.unwrap();
    // B wrote nothing yet: it folds A's file in, then writes the union.
    b.poll().await;
    b.flush().await.unwrap();
    a.poll().await;

    for c in [&a, &b] {
        assert!(c.store().get(&ta.id).is_some());
        assert!(c.store().get(&tb.id).is_some());
    }
    assert_eq!(on_disk(&fs).tasks.len(), 2);
    assert!(!a.has_unsaved());
}

#[tokio::test]
async fn tombstone_reaches_the_other_writer() {
    let fs = Arc::new(MemoryFs::new());
    let mut a = instance(&fs, "alice");
    a.start().await;
    let task = a.mutate(|s| s.create_task(titled("obsolete"))).unwrap();
    a.flush().await.unwrap();

    let mut b = instance(&fs, "bob");
    b.start().await;
    assert_eq!(b.store().visible_tasks().len(), 1);

    a.mutate(|s| s.delete_task(&task.id)).unwrap();
    a.flush().await.unwrap();
    b.poll().await;

    assert!(b.store().visible_tasks().is_empty());
    assert!(b.store().get(&task.id).unwrap().is_deleted());
    // The tombstone stays in the file.
    assert_eq!(on_disk(&fs).tasks.len(), 1);
}

#[tokio::test]
async fn stale_copy_does_not_resurrect() {
    let fs = Arc::new(MemoryFs::new());
    let mut a = instance(&fs, "alice");
    a.start().await;
    let task = a.mutate(|s| s.create_task(titled("gone"))).unwrap();
    a.flush().await.unwrap();

    let mut b = instance(&fs, "bob");
    b.start().await;

    a.mutate(|s| s.delete_task(&task.id)).unwrap();
    a.flush().await.unwrap();

    // B never saw the deletion and writes its stale live copy over it.
    b.mark_dirty();
    b.flush().await.unwrap();
    a.poll().await;

    assert!(a.store().get(&task.id).unwrap().is_deleted());
    // A's newer tombstone is written back over B's stale copy.
    assert!(a.has_unsaved());
    a.flush().await.unwrap();
    b.poll().await;
    assert!(b.store().get(&task.id).unwrap().is_deleted());
}

#[tokio::test]
async fn own_write_does_not_retrigger_reconcile() {
    let fs = Arc::new(MemoryFs::new());
    let mut a = instance(&fs, "alice");
    a.start().await;
    for i in 0..3 {
        a.mutate(|s| s.create_task(titled(&format!("t{i}")))).unwrap();
        a.flush().await.unwrap();
        assert_eq!(a.poll().await, PollOutcome::Unchanged);
    }
}

#[tokio::test]
async fn record_without_id_survives_foreign_write_once() {
    let fs = Arc::new(MemoryFs::new());
    let legacy = r#"{"title":"legacy","updatedAt":10}"#;
    fs.seed(Path::new(SHARED), format!(r#"{{"tasks":[{legacy}]}}"#).as_bytes());
    let mut a = instance(&fs, "alice");
    a.start().await;
    assert_eq!(a.store().tasks().len(), 1);

    // Another writer rewrites the file without touching the record.
    fs.seed(
        Path::new(SHARED),
        format!(r#"{{"tasks":[{legacy}],"themeSettings":{{"mode":"dark"}}}}"#).as_bytes(),
    );
    a.poll().await;
    assert_eq!(a.store().tasks().len(), 1);

    a.mark_dirty();
    a.flush().await.unwrap();
    assert_eq!(on_disk(&fs).tasks.len(), 1);

    let mut b = instance(&fs, "bob");
    b.start().await;
    assert_eq!(b.store().tasks(), a.store().tasks());
}

// ===========================================================================
// Failure handling
// ===========================================================================

#[tokio::test]
async fn unreachable_share_degrades_and_recovers() {
    let fs = Arc::new(MemoryFs::new());
    let mut a = instance(&fs, "alice");
    a.start().await;
    a.flush().await.unwrap();

    fs.set_fail_writes(true);
    let task = a.mutate(|s| s.create_task(titled("offline edit"))).unwrap();
    assert!(a.flush().await.is_err());
    assert!(matches!(a.status(), SyncStatus::Degraded { .. }));
    assert!(a.store().get(&task.id).is_some());

    fs.set_fail_writes(false);
    a.flush().await.unwrap();
    assert_eq!(a.status(), SyncStatus::Healthy);
    assert!(on_disk(&fs).tasks.iter().any(|t| t.id == task.id));
}

#[tokio::test]
async fn garbage_in_shared_file_is_not_overwritten_until_next_edit() {
    let fs = Arc::new(MemoryFs::new());
    fs.seed(Path::new(SHARED), b"<<<not json>>>");
    let mut a = instance(&fs, "alice");
    a.start().await;

    assert!(a.flush_deadline().is_none());
    assert_eq!(fs.contents(Path::new(SHARED)).unwrap(), b"<<<not json>>>");

    a.mutate(|s| s.create_task(titled("fresh"))).unwrap();
    a.flush().await.unwrap();
    assert_eq!(on_disk(&fs).tasks.len(), 1);
}

#[tokio::test]
async fn legacy_records_are_repaired_without_write_back() {
    let fs = Arc::new(MemoryFs::new());
    fs.seed(
        Path::new(SHARED),
        br#"{"tasks":[{"id":"old","title":"legacy","status":"in-progress","priority":"urgent","createdBy":"unassigned","assignedTo":[],"updatedAt":"2024-01-02T03:04:05Z"}]}"#,
    );
    let mut a = instance(&fs, "alice");
    a.start().await;

    let task = a.store().get(&TaskId::from("old")).unwrap();
    assert_eq!(task.status, Status::Doing);
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.created_by, "alice");
    assert_eq!(task.assigned_to, vec!["alice".to_string()]);
    assert_eq!(task.updated_at, 1_704_164_645_000);
    assert!(!a.has_unsaved());
}

// ===========================================================================
// Runtime
// ===========================================================================

#[tokio::test]
async fn burst_of_edits_becomes_one_write() {
    let fs = Arc::new(MemoryFs::new());
    fs.seed(Path::new(SHARED), br#"{"tasks":[]}"#);
    let controller = SyncController::new(
        Arc::clone(&fs),
        Arc::new(MemoryCache::new()),
        Some("alice".to_string()),
        config(150),
    );
    let handle = spawn_sync(controller);

    for i in 0..5 {
        handle
            .mutate(move |s| s.create_task(titled(&format!("burst {i}"))))
            .await
            .unwrap();
    }
    assert_eq!(fs.rename_count(), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(fs.rename_count(), 1);
    assert_eq!(on_disk(&fs).tasks.len(), 5);

    handle.shutdown().await.unwrap();
    assert_eq!(fs.rename_count(), 1);
}

#[tokio::test]
async fn running_instances_pick_up_each_others_writes() {
    let fs = Arc::new(MemoryFs::new());
    fs.seed(Path::new(SHARED), br#"{"tasks":[]}"#);
    let make = |user: &str| {
        let mut cfg = config(20);
        cfg.poll_interval = Duration::from_millis(30);
        SyncController::new(
            Arc::clone(&fs),
            Arc::new(MemoryCache::new()),
            Some(user.to_string()),
            cfg,
        )
    };
    let a = spawn_sync(make("alice"));
    let b = spawn_sync(make("bob"));

    let task = a
        .mutate(|s| s.create_task(titled("hello bob")))
        .await
        .unwrap();

    let mut tasks = b.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if tasks.borrow_and_update().iter().any(|t| t.id == task.id) {
                break;
            }
            tasks.changed().await.unwrap();
        }
    })
    .await
    .expect("bob sees alice's task");

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}
