//! Advisory lock file guarding writes to the shared document.
//!
//! The lock only keeps two writers from lock-stepping each other. It is not
//! what makes the system correct: a writer that cannot get the lock within
//! its retry budget proceeds anyway, and the next poll's reconciliation
//! absorbs whatever the other writer did.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SharedFs;

/// Retry budget and staleness threshold for lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Attempts after the first one.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Age after which a held lock is presumed abandoned.
    pub stale_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            retry_delay: Duration::from_millis(100),
            stale_after: Duration::from_secs(10),
        }
    }
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockRecord {
    owner: String,
    token: String,
    acquired_at: i64,
}

/// Result of [`acquire`].
#[derive(Debug)]
pub enum LockOutcome {
    /// The lock is held until [`LockGuard::release`].
    Acquired(LockGuard),
    /// The retry budget ran out.
    Unavailable,
}

/// A held lock.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
}

impl LockGuard {
    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the lock file, unless another writer has since taken it over
    /// as stale.
    pub async fn release<F: SharedFs>(self, fs: &F) {
        let ours = match fs.read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<LockRecord>(&bytes)
                .is_ok_and(|record| record.token == self.token),
            Err(_) => false,
        };
        if ours {
            if let Err(e) = fs.remove(&self.path).await {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
            }
        } else {
            tracing::debug!(path = %self.path.display(), "lock no longer ours; leaving it");
        }
    }
}

/// Tries to take the lock at `path` within the retry budget.
pub async fn acquire<F: SharedFs>(
    fs: &F,
    path: &Path,
    owner: &str,
    config: &LockConfig,
) -> LockOutcome {
    let token = Uuid::now_v7().to_string();

    for attempt in 0..=config.retries {
        let record = LockRecord {
            owner: owner.to_string(),
            token: token.clone(),
            acquired_at: chrono::Utc::now().timestamp_millis(),
        };
        let bytes = serde_json::to_vec(&record).unwrap_or_default();

        match fs.create_new(path, &bytes).await {
            Ok(true) => {
                tracing::debug!(path = %path.display(), attempt, "lock acquired");
                return LockOutcome::Acquired(LockGuard {
                    path: path.to_path_buf(),
                    token,
                });
            }
            Ok(false) => {
                if holder_is_stale(fs, path, config.stale_after).await {
                    tracing::warn!(path = %path.display(), "removing stale lock");
                    let _ = fs.remove(path).await;
                    continue;
                }
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "lock attempt failed");
            }
        }

        if attempt < config.retries {
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    LockOutcome::Unavailable
}

/// A lock is stale when the lock file was last modified more than
/// `stale_after` ago. The file's own timestamp is used rather than the
/// holder's recorded time, so a lock left empty or half-written by a crash
/// still expires.
async fn holder_is_stale<F: SharedFs>(fs: &F, path: &Path, stale_after: Duration) -> bool {
    match fs.modified(path).await {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO)
            > stale_after,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "cannot age lock; treating as held");
            false
        }
    }
}
