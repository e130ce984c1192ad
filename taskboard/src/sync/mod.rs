//! Persistence cycle: keeps the live task collection and the shared file
//! converging.
//!
//! [`SyncController`] owns the [`TaskStore`](crate::tasks::TaskStore) and
//! drives load, poll, reconcile, and debounced durable writes.
//! [`spawn_sync`] runs a controller on its own tokio task and hands back a
//! [`SyncHandle`] for the rest of the application.

pub mod controller;
pub mod debounce;
pub mod runtime;

pub use controller::{PollOutcome, SyncController};
pub use debounce::Debouncer;
pub use runtime::{SyncCommand, SyncHandle, spawn_sync};

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::{StorageError, WriterConfig};
use crate::tasks::TaskError;

/// Errors surfaced by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The sync task has exited.
    #[error("sync engine has stopped")]
    Stopped,

    /// A local mutation was rejected.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The shared document could not be written.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Health of the shared-file link, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// The last write succeeded (or none has been attempted yet).
    #[default]
    Healthy,
    /// The last write failed. Local changes are kept and retried on the
    /// next flush.
    Degraded {
        /// Human-readable cause.
        reason: String,
    },
}

impl SyncStatus {
    /// Returns `true` for [`SyncStatus::Degraded`].
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded { reason } => write!(f, "degraded: {reason}"),
        }
    }
}

/// Lifecycle of a [`SyncController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, nothing loaded yet.
    Uninitialized,
    /// Reading the local cache and the shared file.
    LoadingExternal,
    /// Idle between polls and writes.
    Watching,
    /// A durable write is in progress.
    Committing,
    /// Shut down; no further timers fire.
    Stopped,
}

/// Settings for the persistence cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Location of the shared document.
    pub shared_path: PathBuf,
    /// How often the shared file is checked for foreign writes.
    pub poll_interval: Duration,
    /// Quiet period after the last local mutation before writing.
    pub debounce: Duration,
    /// Durable write settings.
    pub writer: WriterConfig,
}

impl SyncConfig {
    /// Creates a configuration with default timings for `shared_path`.
    #[must_use]
    pub fn new(shared_path: impl Into<PathBuf>) -> Self {
        Self {
            shared_path: shared_path.into(),
            poll_interval: Duration::from_millis(3000),
            debounce: Duration::from_millis(500),
            writer: WriterConfig::default(),
        }
    }
}
