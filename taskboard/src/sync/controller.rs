//! Stateful orchestration of load, poll, reconcile, and write.
//!
//! The controller is driven from a single task. Every method that touches
//! the shared file is `async`; normalization and reconciliation in between
//! are synchronous. The fingerprint of a self-issued write is recorded
//! before [`SyncController::flush`] returns, so the next poll on the same
//! task can never mistake that write for a foreign one.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use taskboard_proto::document::TaskDocument;
use taskboard_proto::normalize::NormalizeContext;

use super::debounce::Debouncer;
use super::{Phase, SyncConfig, SyncError, SyncStatus};
use crate::storage::{DurableWriter, Fingerprint, FsError, LocalCache, SharedFs};
use crate::tasks::{TaskError, TaskStore, reconcile, same_records};

/// What a poll found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The shared file has not changed since it was last seen (or could not
    /// be checked).
    Unchanged,
    /// The shared file does not exist; a write is pending to recreate it.
    Missing,
    /// The shared file changed but is not valid JSON. Local state is kept.
    Malformed,
    /// The shared file changed and was folded into the live collection.
    Reconciled {
        /// The live collection changed as a result.
        adopted: bool,
        /// Local state the file lacks is pending a write-back.
        write_back: bool,
    },
}

/// Owns the live collection and keeps it converged with the shared file.
pub struct SyncController<F, C> {
    fs: Arc<F>,
    cache: Arc<C>,
    writer: DurableWriter<F>,
    store: TaskStore,
    config: SyncConfig,
    debouncer: Debouncer,
    last_fingerprint: Option<Fingerprint>,
    phase: Phase,
    unsaved: bool,
    status_tx: watch::Sender<SyncStatus>,
}

impl<F: SharedFs, C: LocalCache> SyncController<F, C> {
    /// Creates a controller for the session user `user_id`.
    #[must_use]
    pub fn new(fs: Arc<F>, cache: Arc<C>, user_id: Option<String>, config: SyncConfig) -> Self {
        let owner = user_id.clone().unwrap_or_else(|| "anonymous".to_string());
        let writer = DurableWriter::new(Arc::clone(&fs), config.writer.clone(), owner);
        let (status_tx, _) = watch::channel(SyncStatus::Healthy);
        Self {
            fs,
            cache,
            writer,
            store: TaskStore::new(user_id),
            debouncer: Debouncer::new(config.debounce),
            config,
            last_fingerprint: None,
            phase: Phase::Uninitialized,
            unsaved: false,
            status_tx,
        }
    }

    /// Returns the live store.
    #[must_use]
    pub const fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the fingerprint of the shared file as last seen or written.
    #[must_use]
    pub const fn last_fingerprint(&self) -> Option<&Fingerprint> {
        self.last_fingerprint.as_ref()
    }

    /// Returns the current health.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribes to health changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Returns `true` if local changes have not reached the shared file.
    #[must_use]
    pub const fn has_unsaved(&self) -> bool {
        self.unsaved
    }

    /// Returns the pending debounced write deadline, if any.
    #[must_use]
    pub const fn flush_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Loads the local cache, then folds in the shared file.
    pub async fn start(&mut self) {
        self.phase = Phase::LoadingExternal;

        let cached = self.load_cache().await;
        tracing::info!(tasks = cached.tasks.len(), "loaded local cache");
        self.store.replace_document(cached);

        let path = self.config.shared_path.clone();
        match self.fs.read(&path).await {
            Ok(bytes) => {
                self.last_fingerprint = Some(Fingerprint::of(&bytes));
                let outcome = self.absorb(&bytes);
                tracing::info!(
                    path = %path.display(),
                    tasks = self.store.tasks().len(),
                    ?outcome,
                    "loaded shared document"
                );
                if let PollOutcome::Reconciled { adopted: true, .. } = outcome {
                    let document = self.store.document().clone();
                    self.write_cache(&document).await;
                }
            }
            Err(FsError::NotFound(_)) => {
                tracing::info!(path = %path.display(), "no shared document yet; local state is authoritative");
                self.mark_dirty();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "shared document unreadable; keeping local state");
            }
        }

        self.phase = Phase::Watching;
    }

    /// Checks the shared file for foreign writes and reconciles if it moved.
    pub async fn poll(&mut self) -> PollOutcome {
        let path = self.config.shared_path.clone();
        let current = match self.fs.fingerprint(&path).await {
            Ok(Some(fp)) => fp,
            Ok(None) => return self.on_missing(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to fingerprint shared document");
                return PollOutcome::Unchanged;
            }
        };
        if self.last_fingerprint.as_ref() == Some(&current) {
            return PollOutcome::Unchanged;
        }

        // Recorded before reading so a slow read cannot be raced into a
        // second reconciliation of the same contents.
        let previous = self.last_fingerprint.replace(current);
        let bytes = match self.fs.read(&path).await {
            Ok(bytes) => bytes,
            Err(FsError::NotFound(_)) => return self.on_missing(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read shared document");
                self.last_fingerprint = previous;
                return PollOutcome::Unchanged;
            }
        };
        self.last_fingerprint = Some(Fingerprint::of(&bytes));

        let outcome = self.absorb(&bytes);
        if let PollOutcome::Reconciled { adopted: true, .. } = outcome {
            let document = self.store.document().clone();
            self.write_cache(&document).await;
        }
        outcome
    }

    /// Re-arms the debounced write.
    pub fn mark_dirty(&mut self) {
        self.unsaved = true;
        self.debouncer.arm();
    }

    /// Runs a store mutation and schedules a write if it succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Task`] if the mutation was rejected; nothing is
    /// scheduled in that case.
    pub fn mutate<T>(
        &mut self,
        apply: impl FnOnce(&mut TaskStore) -> Result<T, TaskError>,
    ) -> Result<T, SyncError> {
        let out = apply(&mut self.store)?;
        self.mark_dirty();
        Ok(out)
    }

    /// Writes the live document to the local cache and the shared file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the durable write failed. The status
    /// turns degraded and stays so until a later write succeeds; local state
    /// is not reverted.
    pub async fn flush(&mut self) -> Result<Fingerprint, SyncError> {
        self.debouncer.clear();
        self.phase = Phase::Committing;

        let document = self.store.document().clone();
        self.write_cache(&document).await;
        let result = self.writer.write(&self.config.shared_path, &document).await;

        self.phase = Phase::Watching;
        match result {
            Ok(fingerprint) => {
                self.last_fingerprint = Some(fingerprint.clone());
                self.unsaved = false;
                tracing::info!(
                    tasks = document.tasks.len(),
                    fingerprint = %fingerprint,
                    "shared document written"
                );
                self.set_status(SyncStatus::Healthy);
                Ok(fingerprint)
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.config.shared_path.display(),
                    error = %e,
                    "failed to write shared document; local changes kept"
                );
                self.set_status(SyncStatus::Degraded {
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Flushes if the debounce deadline has passed at `now`.
    pub async fn flush_if_due(&mut self, now: Instant) -> Option<Result<Fingerprint, SyncError>> {
        if self.debouncer.is_due(now) {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Writes pending changes, if any, and stops the timers.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub async fn shutdown(&mut self) -> Result<(), SyncError> {
        let result = if self.unsaved || self.debouncer.is_armed() {
            self.flush().await.map(|_| ())
        } else {
            Ok(())
        };
        self.debouncer.clear();
        self.phase = Phase::Stopped;
        tracing::info!("sync stopped");
        result
    }

    fn context(&self) -> NormalizeContext {
        NormalizeContext::at_now(self.store.user_id().map(str::to_string))
    }

    /// Folds the shared file's contents into the live collection.
    fn absorb(&mut self, bytes: &[u8]) -> PollOutcome {
        let external = match TaskDocument::from_json_bytes(bytes, &self.context()) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    path = %self.config.shared_path.display(),
                    error = %e,
                    "shared document is malformed; keeping local state"
                );
                return PollOutcome::Malformed;
            }
        };

        let mut merged = self.store.document().clone();
        merged.tasks = reconcile(self.store.tasks(), &external.tasks);
        // Local settings not yet in the file win until they land, including
        // after a failed write has cleared the debouncer.
        if !self.unsaved && !self.debouncer.is_armed() {
            merged.adopt_settings(&external);
        }

        let write_back =
            !same_records(&merged.tasks, &external.tasks) || !merged.same_settings(&external);
        let adopted = merged != *self.store.document();
        if adopted {
            self.store.replace_document(merged);
        }
        if write_back {
            self.unsaved = true;
            self.debouncer.arm_if_idle();
        }

        tracing::debug!(
            tasks = self.store.tasks().len(),
            adopted,
            write_back,
            "reconciled shared document"
        );
        PollOutcome::Reconciled {
            adopted,
            write_back,
        }
    }

    fn on_missing(&mut self) -> PollOutcome {
        if self.last_fingerprint.take().is_some() {
            tracing::warn!(
                path = %self.config.shared_path.display(),
                "shared document vanished; recreating"
            );
        }
        self.unsaved = true;
        self.debouncer.arm_if_idle();
        PollOutcome::Missing
    }

    async fn load_cache(&self) -> TaskDocument {
        match self.cache.load().await {
            Ok(Some(bytes)) => TaskDocument::from_json_bytes(&bytes, &self.context())
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "local cache is corrupt; starting empty");
                    TaskDocument::default()
                }),
            Ok(None) => TaskDocument::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load local cache; starting empty");
                TaskDocument::default()
            }
        }
    }

    async fn write_cache(&self, document: &TaskDocument) {
        let bytes = match document.to_json_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize local cache");
                return;
            }
        };
        if let Err(e) = self.cache.store(&bytes).await {
            tracing::warn!(error = %e, "failed to update local cache");
        }
    }

    fn set_status(&self, status: SyncStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::info!(from = %current, to = %status, "sync status changed");
            *current = status;
            true
        });
    }
}
