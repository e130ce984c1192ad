//! `taskboard-sync` — headless sync engine for a shared task board.
//!
//! Keeps the local cache and a shared JSON document (typically on a network
//! drive) converged until interrupted. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/taskboard/config.toml`).
//!
//! ```bash
//! # Run until Ctrl-C
//! cargo run --bin taskboard-sync -- --shared-path /mnt/team/tasks.json --user alice
//!
//! # Reconcile and write once
//! TASKBOARD_SHARED_PATH=/mnt/team/tasks.json cargo run --bin taskboard-sync -- --once
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::config::{AppConfig, CliArgs};
use taskboard::storage::{DiskFs, FileCache};
use taskboard::sync::{SyncController, spawn_sync};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let sync_config = match config.to_sync_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        shared = %sync_config.shared_path.display(),
        cache = %config.cache_path.display(),
        user = config.user_id.as_deref().unwrap_or("-"),
        "starting taskboard-sync"
    );

    let mut controller = SyncController::new(
        Arc::new(DiskFs::new()),
        Arc::new(FileCache::new(config.cache_path.clone())),
        config.user_id.clone(),
        sync_config,
    );

    if cli.once {
        controller.start().await;
        let visible = controller.store().visible_tasks().len();
        return match controller.shutdown().await {
            Ok(()) => {
                println!("synced: {visible} visible tasks");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("sync failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let handle = spawn_sync(controller);
    let mut status = handle.subscribe_status();
    let mut tasks = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                eprintln!("sync status: {current}");
            }
            Ok(()) = tasks.changed() => {
                let count = tasks.borrow_and_update().iter().filter(|t| t.is_visible()).count();
                tracing::info!(visible = count, "task collection updated");
            }
        }
    }

    tracing::info!("shutting down");
    match handle.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("final sync failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based tracing so log output doesn't interleave with the
/// status lines on stderr.
///
/// Returns a guard that must be held for the lifetime of the program to
/// ensure buffered logs are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
