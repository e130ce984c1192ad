//! Integration tests for durable writes against a real directory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use taskboard::storage::{
    DiskFs, DurableWriter, FileCache, LocalCache, LockConfig, SharedFs, WriterConfig,
};
use taskboard::sync::{SyncConfig, SyncController};
use taskboard::tasks::NewTask;
use taskboard_proto::document::TaskDocument;
use taskboard_proto::normalize::NormalizeContext;

fn writer_config(keep: usize) -> WriterConfig {
    WriterConfig {
        lock: LockConfig {
            retries: 2,
            retry_delay: Duration::from_millis(5),
            stale_after: Duration::from_secs(10),
        },
        settle_delay: Duration::ZERO,
        keep_backups: keep,
    }
}

fn document(titles: &[&str]) -> TaskDocument {
    let tasks: Vec<serde_json::Value> = titles
        .iter()
        .enumerate()
        .map(|(i, t)| serde_json::json!({"id": format!("t{i}"), "title": t, "updatedAt": 10}))
        .collect();
    TaskDocument::from_value(
        &serde_json::json!({"tasks": tasks}),
        &NormalizeContext::new(Some("alice".to_string()), 1),
    )
}

fn backups_in(dir: &Path) -> Vec<PathBuf> {
    let mut names: Vec<PathBuf> = std::fs::read_dir(dir.join("backups"))
        .map(|entries| entries.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default();
    names.sort();
    names
}

fn backdate(path: &Path, age: Duration) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

#[tokio::test]
async fn write_creates_missing_directories() {
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("team").join("board").join("tasks.json");
    let mut writer = DurableWriter::new(Arc::new(DiskFs::new()), writer_config(5), "alice");

    let fp = writer.write(&dest, &document(&["a"])).await.unwrap();

    assert!(dest.exists());
    assert_eq!(DiskFs.fingerprint(&dest).await.unwrap(), Some(fp));
    let leftovers: Vec<_> = std::fs::read_dir(dest.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".tmp") || n.ends_with(".lock"))
        .collect();
    assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
}

#[tokio::test]
async fn retention_keeps_newest_backups() {
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("tasks.json");
    let mut writer = DurableWriter::new(Arc::new(DiskFs::new()), writer_config(5), "alice");

    let mut contents = Vec::new();
    for i in 0..8 {
        writer
            .write(&dest, &document(&[&format!("v{i}")]))
            .await
            .unwrap();
        contents.push(std::fs::read(&dest).unwrap());
    }

    let backups = backups_in(root.path());
    assert_eq!(backups.len(), 5);
    for (backup, expected) in backups.iter().zip(&contents[3..]) {
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tasks-") && name.ends_with("Z.json"), "{name}");
        assert_eq!(&std::fs::read(backup).unwrap(), expected);
    }
}

#[tokio::test]
async fn foreign_lock_does_not_block_write() {
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("tasks.json");
    let lock = root.path().join("tasks.json.lock");
    let fresh = format!(
        "{{\"owner\":\"bob\",\"token\":\"x\",\"acquiredAt\":{}}}",
        chrono::Utc::now().timestamp_millis()
    );
    std::fs::write(&lock, fresh).unwrap();

    let mut writer = DurableWriter::new(Arc::new(DiskFs::new()), writer_config(5), "alice");
    writer.write(&dest, &document(&["a"])).await.unwrap();

    assert!(dest.exists());
    assert!(lock.exists(), "another writer's lock is left in place");
}

#[tokio::test]
async fn abandoned_lock_is_cleared() {
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("tasks.json");
    let lock = root.path().join("tasks.json.lock");
    std::fs::write(&lock, "{\"owner\":\"bob\",\"token\":\"x\",\"acquiredAt\":0}").unwrap();
    backdate(&lock, Duration::from_secs(60));

    let mut writer = DurableWriter::new(Arc::new(DiskFs::new()), writer_config(5), "alice");
    writer.write(&dest, &document(&["a"])).await.unwrap();

    assert!(!lock.exists());
}

#[tokio::test]
async fn lock_left_empty_by_a_crash_expires() {
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("tasks.json");
    let lock = root.path().join("tasks.json.lock");
    std::fs::write(&lock, b"").unwrap();
    backdate(&lock, Duration::from_secs(60));

    let mut writer = DurableWriter::new(Arc::new(DiskFs::new()), writer_config(5), "alice");
    writer.write(&dest, &document(&["a"])).await.unwrap();

    assert!(!lock.exists());
}

#[tokio::test]
async fn controller_round_trip_on_disk() {
    let root = tempfile::tempdir().unwrap();
    let shared = root.path().join("share").join("tasks.json");
    let cache_path = root.path().join("local").join("cache.json");
    let config = SyncConfig {
        shared_path: shared.clone(),
        poll_interval: Duration::from_secs(60),
        debounce: Duration::from_millis(10),
        writer: writer_config(2),
    };

    let cache = Arc::new(FileCache::new(&cache_path));
    let mut c = SyncController::new(
        Arc::new(DiskFs::new()),
        Arc::clone(&cache),
        Some("alice".to_string()),
        config.clone(),
    );
    c.start().await;
    let task = c
        .mutate(|s| {
            s.create_task(NewTask {
                title: "persist me".to_string(),
                ..NewTask::default()
            })
        })
        .unwrap();
    c.shutdown().await.unwrap();

    assert!(cache.load().await.unwrap().is_some());

    // A fresh instance with an empty cache sees the task via the shared file.
    let mut fresh = SyncController::new(
        Arc::new(DiskFs::new()),
        Arc::new(FileCache::new(root.path().join("other").join("cache.json"))),
        Some("bob".to_string()),
        config,
    );
    fresh.start().await;
    assert_eq!(fresh.store().get(&task.id), Some(&task));
}
