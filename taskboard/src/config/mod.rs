//! Configuration for the `taskboard-sync` engine.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::{FileCache, LockConfig, WriterConfig};
use crate::sync::SyncConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// No shared document location was given anywhere.
    #[error("no shared document path (use --shared-path, TASKBOARD_SHARED_PATH, or [shared] path)")]
    MissingSharedPath,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    shared: SharedFileConfig,
    session: SessionFileConfig,
    sync: SyncFileConfig,
    lock: LockFileConfig,
    backup: BackupFileConfig,
}

/// `[shared]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SharedFileConfig {
    path: Option<PathBuf>,
    cache_path: Option<PathBuf>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<String>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    poll_interval_ms: Option<u64>,
    debounce_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
}

/// `[lock]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LockFileConfig {
    retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    stale_after_secs: Option<u64>,
}

/// `[backup]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackupFileConfig {
    keep: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved engine configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Shared --
    /// Location of the shared document. Required to run.
    pub shared_path: Option<PathBuf>,
    /// Location of the local cache file.
    pub cache_path: PathBuf,

    // -- Session --
    /// Current user, used for new tasks and ownership repair.
    pub user_id: Option<String>,

    // -- Sync --
    /// Interval between checks of the shared file.
    pub poll_interval: Duration,
    /// Quiet period before a local change is written.
    pub debounce: Duration,
    /// Pause after each rename for slow network caches.
    pub settle_delay: Duration,

    // -- Lock --
    /// Advisory lock retries.
    pub lock_retries: u32,
    /// Pause between lock attempts.
    pub lock_retry_delay: Duration,
    /// Age after which a lock is presumed abandoned.
    pub lock_stale_after: Duration,

    // -- Backup --
    /// Number of backups retained.
    pub keep_backups: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shared_path: None,
            cache_path: FileCache::default_path(),
            user_id: None,
            poll_interval: Duration::from_millis(3000),
            debounce: Duration::from_millis(500),
            settle_delay: Duration::from_millis(200),
            lock_retries: 10,
            lock_retry_delay: Duration::from_millis(100),
            lock_stale_after: Duration::from_secs(10),
            keep_backups: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/taskboard/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve an `AppConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            shared_path: cli
                .shared_path
                .clone()
                .or_else(|| file.shared.path.clone()),
            cache_path: cli
                .cache_path
                .clone()
                .or_else(|| file.shared.cache_path.clone())
                .unwrap_or(defaults.cache_path),
            user_id: cli
                .user
                .clone()
                .or_else(|| file.session.user_id.clone())
                .filter(|u| !u.trim().is_empty()),
            poll_interval: file
                .sync
                .poll_interval_ms
                .map_or(defaults.poll_interval, Duration::from_millis),
            debounce: file
                .sync
                .debounce_ms
                .map_or(defaults.debounce, Duration::from_millis),
            settle_delay: file
                .sync
                .settle_delay_ms
                .map_or(defaults.settle_delay, Duration::from_millis),
            lock_retries: file.lock.retries.unwrap_or(defaults.lock_retries),
            lock_retry_delay: file
                .lock
                .retry_delay_ms
                .map_or(defaults.lock_retry_delay, Duration::from_millis),
            lock_stale_after: file
                .lock
                .stale_after_secs
                .map_or(defaults.lock_stale_after, Duration::from_secs),
            keep_backups: file.backup.keep.unwrap_or(defaults.keep_backups),
        }
    }

    /// Build a [`SyncConfig`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSharedPath`] if no shared path was set.
    pub fn to_sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let shared_path = self
            .shared_path
            .clone()
            .ok_or(ConfigError::MissingSharedPath)?;

        Ok(SyncConfig {
            shared_path,
            poll_interval: self.poll_interval,
            debounce: self.debounce,
            writer: WriterConfig {
                lock: LockConfig {
                    retries: self.lock_retries,
                    retry_delay: self.lock_retry_delay,
                    stale_after: self.lock_stale_after,
                },
                settle_delay: self.settle_delay,
                keep_backups: self.keep_backups,
            },
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Keeps a local task board in sync with a shared JSON file")]
pub struct CliArgs {
    /// Path of the shared task document (e.g. on a network drive).
    #[arg(long, env = "TASKBOARD_SHARED_PATH")]
    pub shared_path: Option<PathBuf>,

    /// Path of the local cache (default: `<data dir>/taskboard/cache.json`).
    #[arg(long)]
    pub cache_path: Option<PathBuf>,

    /// Current user id.
    #[arg(long, env = "TASKBOARD_USER")]
    pub user: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Load, reconcile, write once, and exit.
    #[arg(long)]
    pub once: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskboard").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
