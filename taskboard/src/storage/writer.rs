//! Durable writes of the shared document.
//!
//! Sequence: create the directory, take the advisory lock (best effort),
//! serialize, write a temporary sibling, rename it over the destination,
//! optionally pause for slow network caches, write a rolling backup, release
//! the lock. Everything before the rename leaves the destination untouched,
//! so readers only ever see the old or the new complete document.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use uuid::Uuid;

use taskboard_proto::document::TaskDocument;

use super::lock::{self, LockConfig, LockOutcome};
use super::{Fingerprint, SharedFs, StorageError};

/// Name of the backups directory next to the shared document.
pub const BACKUP_DIR: &str = "backups";

/// Tunables for [`DurableWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Advisory lock budget.
    pub lock: LockConfig,
    /// Pause after the rename before anything reads the file back.
    pub settle_delay: Duration,
    /// Number of backups retained.
    pub keep_backups: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            lock: LockConfig::default(),
            settle_delay: Duration::from_millis(200),
            keep_backups: 5,
        }
    }
}

/// Commits whole documents to a [`SharedFs`].
pub struct DurableWriter<F> {
    fs: Arc<F>,
    config: WriterConfig,
    owner: String,
    last_backup_ms: i64,
}

impl<F: SharedFs> DurableWriter<F> {
    /// Creates a writer identifying itself as `owner` in lock files.
    #[must_use]
    pub fn new(fs: Arc<F>, config: WriterConfig, owner: impl Into<String>) -> Self {
        Self {
            fs,
            config,
            owner: owner.into(),
            last_backup_ms: 0,
        }
    }

    /// Writes `document` to `path` and returns the fingerprint of the bytes
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory, the temporary file, or the
    /// rename fails. The destination is unchanged in every error case.
    pub async fn write(
        &mut self,
        path: &Path,
        document: &TaskDocument,
    ) -> Result<Fingerprint, StorageError> {
        let dir = parent_dir(path);
        self.fs
            .create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: dir.clone(),
                source,
            })?;

        let lock_path = sibling(path, "lock");
        let held = lock::acquire(&*self.fs, &lock_path, &self.owner, &self.config.lock).await;
        if matches!(held, LockOutcome::Unavailable) {
            tracing::warn!(
                path = %lock_path.display(),
                "could not acquire lock; writing without it"
            );
        }

        let result = self.commit(path, &dir, document).await;

        if let LockOutcome::Acquired(guard) = held {
            guard.release(&*self.fs).await;
        }
        result
    }

    async fn commit(
        &mut self,
        path: &Path,
        dir: &Path,
        document: &TaskDocument,
    ) -> Result<Fingerprint, StorageError> {
        let bytes = document.to_json_bytes()?;

        let tmp = sibling(path, &format!("{}.tmp", Uuid::now_v7().simple()));
        if let Err(source) = self.fs.write(&tmp, &bytes).await {
            let _ = self.fs.remove(&tmp).await;
            return Err(StorageError::WriteTemp { path: tmp, source });
        }
        if let Err(source) = self.fs.rename(&tmp, path).await {
            let _ = self.fs.remove(&tmp).await;
            return Err(StorageError::Rename {
                path: path.to_path_buf(),
                source,
            });
        }

        let fingerprint = Fingerprint::of(&bytes);
        tracing::debug!(
            path = %path.display(),
            bytes = bytes.len(),
            fingerprint = %fingerprint,
            "document committed"
        );

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        self.write_backup(path, dir, &bytes).await;
        Ok(fingerprint)
    }

    /// Writes a timestamped copy and prunes old ones. Failures here never
    /// fail the write: the document itself is already committed.
    async fn write_backup(&mut self, path: &Path, dir: &Path, bytes: &[u8]) {
        if self.config.keep_backups == 0 {
            return;
        }
        let backup_dir = dir.join(BACKUP_DIR);
        if let Err(e) = self.fs.create_dir_all(&backup_dir).await {
            tracing::warn!(path = %backup_dir.display(), error = %e, "failed to create backup directory");
            return;
        }

        let stem = backup_stem(path);
        let name = format!("{stem}-{}.json", self.next_backup_stamp());
        let backup_path = backup_dir.join(&name);
        if let Err(e) = self.fs.write(&backup_path, bytes).await {
            tracing::warn!(path = %backup_path.display(), error = %e, "failed to write backup");
            return;
        }

        let names = match self.fs.list_dir(&backup_dir).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(path = %backup_dir.display(), error = %e, "failed to list backups");
                return;
            }
        };
        let mut backups: Vec<String> = names
            .into_iter()
            .filter(|n| is_backup_of(n, &stem))
            .collect();
        backups.sort();

        let excess = backups.len().saturating_sub(self.config.keep_backups);
        for old in backups.iter().take(excess) {
            let old_path = backup_dir.join(old);
            if let Err(e) = self.fs.remove(&old_path).await {
                tracing::warn!(path = %old_path.display(), error = %e, "failed to prune backup");
            }
        }
    }

    /// UTC timestamp with millisecond precision, strictly increasing per
    /// writer so names never collide and sort chronologically.
    fn next_backup_stamp(&mut self) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        let ms = now.max(self.last_backup_ms.saturating_add(1));
        self.last_backup_ms = ms;
        DateTime::from_timestamp_millis(ms).map_or_else(
            || format!("{ms:020}"),
            |dt| dt.format("%Y%m%dT%H%M%S%3fZ").to_string(),
        )
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// `tasks.json` + `lock` -> `tasks.json.lock`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn backup_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string()
}

/// Matches exactly `<stem>-<stamp>.json` as produced by
/// [`DurableWriter::next_backup_stamp`], so a sibling document whose name
/// merely starts with `stem` keeps its own backups.
fn is_backup_of(name: &str, stem: &str) -> bool {
    let Some(stamp) = name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(".json"))
    else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match stamp.strip_suffix('Z').and_then(|s| s.split_once('T')) {
        Some((date, time)) => date.len() == 8 && time.len() == 9 && digits(date) && digits(time),
        None => stamp.len() == 20 && digits(stamp),
    }
}
