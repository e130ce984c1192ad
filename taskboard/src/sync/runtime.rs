//! Event loop running a [`SyncController`] on its own tokio task.
//!
//! One task owns the controller; everything else talks to it through a
//! [`SyncHandle`]. The loop waits on three sources at once: the poll
//! interval, the debounce deadline, and the command channel. Because a
//! flush runs to completion on the same task before the next poll is
//! selected, a self-issued write is always recorded before it is polled.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::controller::SyncController;
use super::{Phase, SyncError, SyncStatus};
use crate::storage::{Fingerprint, LocalCache, SharedFs};
use crate::tasks::{TaskError, TaskSnapshot, TaskStore};

/// Capacity of the command channel.
const COMMAND_CAPACITY: usize = 64;

/// A store mutation shipped to the sync task.
pub type MutationJob = Box<dyn FnOnce(&mut TaskStore) -> Result<(), TaskError> + Send>;

/// Commands accepted by the sync task.
pub enum SyncCommand {
    /// Run a mutation against the live store.
    Mutate(MutationJob),
    /// Write immediately, bypassing the debounce.
    FlushNow(oneshot::Sender<Result<Fingerprint, SyncError>>),
    /// Write pending changes and stop.
    Shutdown(oneshot::Sender<Result<(), SyncError>>),
}

impl std::fmt::Debug for SyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mutate(_) => write!(f, "Mutate"),
            Self::FlushNow(_) => write!(f, "FlushNow"),
            Self::Shutdown(_) => write!(f, "Shutdown"),
        }
    }
}

/// Client side of a running sync task.
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    status: watch::Receiver<SyncStatus>,
    tasks: watch::Receiver<TaskSnapshot>,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Runs `apply` against the live store on the sync task and schedules a
    /// debounced write if it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Task`] if the mutation was rejected, or
    /// [`SyncError::Stopped`] if the sync task has exited.
    pub async fn mutate<T, M>(&self, apply: M) -> Result<T, SyncError>
    where
        T: Send + 'static,
        M: FnOnce(&mut TaskStore) -> Result<T, TaskError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: MutationJob = Box::new(move |store| {
            let result = apply(store);
            let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
            let _ = reply_tx.send(result);
            outcome
        });
        self.commands
            .send(SyncCommand::Mutate(job))
            .await
            .map_err(|_| SyncError::Stopped)?;
        reply_rx
            .await
            .map_err(|_| SyncError::Stopped)?
            .map_err(SyncError::from)
    }

    /// Writes immediately.
    ///
    /// # Errors
    ///
    /// Returns the write error, or [`SyncError::Stopped`].
    pub async fn flush_now(&self) -> Result<Fingerprint, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::FlushNow(reply_tx))
            .await
            .map_err(|_| SyncError::Stopped)?;
        reply_rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Returns the current health.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to health changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Subscribes to snapshots of the live collection.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.tasks.clone()
    }

    /// Returns the latest snapshot of the live collection.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        self.tasks.borrow().clone()
    }

    /// Writes pending changes, stops the timers, and waits for the sync
    /// task to exit.
    ///
    /// # Errors
    ///
    /// Returns the error of the final write, or [`SyncError::Stopped`] if
    /// the task had already exited.
    pub async fn shutdown(self) -> Result<(), SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::Shutdown(reply_tx))
            .await
            .map_err(|_| SyncError::Stopped)?;
        let result = reply_rx.await.map_err(|_| SyncError::Stopped)?;
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "sync task ended abnormally");
        }
        result
    }
}

/// Spawns the sync loop for `controller`, starting it first if needed.
#[must_use]
pub fn spawn_sync<F, C>(controller: SyncController<F, C>) -> SyncHandle
where
    F: SharedFs + 'static,
    C: LocalCache + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
    let status = controller.subscribe_status();
    let tasks = controller.store().subscribe();

    let join = tokio::spawn(async move {
        run_loop(controller, cmd_rx).await;
    });

    SyncHandle {
        commands: cmd_tx,
        status,
        tasks,
        join,
    }
}

async fn run_loop<F, C>(
    mut controller: SyncController<F, C>,
    mut commands: mpsc::Receiver<SyncCommand>,
) where
    F: SharedFs,
    C: LocalCache,
{
    if controller.phase() == Phase::Uninitialized {
        controller.start().await;
    }

    let period = controller.config().poll_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = controller.flush_deadline();
        tokio::select! {
            _ = ticker.tick() => {
                controller.poll().await;
            }
            () = wait_until(deadline) => {
                // Failures are reported through the status channel.
                let _ = controller.flush().await;
            }
            cmd = commands.recv() => match cmd {
                Some(SyncCommand::Mutate(job)) => {
                    let _ = controller.mutate(job);
                }
                Some(SyncCommand::FlushNow(reply)) => {
                    let _ = reply.send(controller.flush().await);
                }
                Some(SyncCommand::Shutdown(reply)) => {
                    let _ = reply.send(controller.shutdown().await);
                    break;
                }
                None => {
                    tracing::debug!("all sync handles dropped; shutting down");
                    let _ = controller.shutdown().await;
                    break;
                }
            },
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
