//! Access to the shared document file and the local cache.
//!
//! [`SharedFs`] is the only boundary the sync engine needs to reach the
//! shared file. It can be backed by a local disk, a mounted network share
//! ([`DiskFs`]), or an in-memory fake for tests ([`MemoryFs`]). Reads report
//! a missing file as [`FsError::NotFound`], distinct from every other failure,
//! because "no shared document yet" is an expected state rather than an error.

pub mod cache;
pub mod disk;
pub mod lock;
pub mod memory;
pub mod writer;

pub use cache::{CacheError, FileCache, LocalCache, MemoryCache};
pub use disk::DiskFs;
pub use lock::{LockConfig, LockGuard, LockOutcome};
pub use memory::MemoryFs;
pub use writer::{DurableWriter, WriterConfig};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use taskboard_proto::document::DocumentError;

/// Errors reported by a [`SharedFs`] backend.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// The path does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Any other I/O failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl FsError {
    /// Classifies an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Returns `true` for [`FsError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors from a durable write. Any of these means the destination still
/// holds its previous complete contents.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The destination directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        /// Directory that was attempted.
        path: PathBuf,
        /// Underlying error.
        source: FsError,
    },

    /// The document could not be serialized.
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] DocumentError),

    /// The temporary sibling file could not be written.
    #[error("failed to write temporary file {}: {source}", path.display())]
    WriteTemp {
        /// Temporary path that was attempted.
        path: PathBuf,
        /// Underlying error.
        source: FsError,
    },

    /// The temporary file could not be renamed over the destination.
    #[error("failed to replace {}: {source}", path.display())]
    Rename {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        source: FsError,
    },
}

/// Content hash of the shared document, used to detect foreign writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hashes `bytes` with SHA-256.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough for logs.
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

/// Filesystem-like access to the shared resource.
pub trait SharedFs: Send + Sync {
    /// Reads a whole file.
    fn read(&self, path: &Path) -> impl Future<Output = Result<Vec<u8>, FsError>> + Send;

    /// Writes a whole file, replacing any previous contents.
    fn write(&self, path: &Path, bytes: &[u8]) -> impl Future<Output = Result<(), FsError>> + Send;

    /// Creates a file only if it does not exist yet.
    ///
    /// Returns `Ok(false)` if the file already exists.
    fn create_new(
        &self,
        path: &Path,
        bytes: &[u8],
    ) -> impl Future<Output = Result<bool, FsError>> + Send;

    /// Renames `from` over `to` atomically.
    fn rename(&self, from: &Path, to: &Path) -> impl Future<Output = Result<(), FsError>> + Send;

    /// Creates a directory and all missing ancestors.
    fn create_dir_all(&self, path: &Path) -> impl Future<Output = Result<(), FsError>> + Send;

    /// Lists the file names directly inside a directory.
    fn list_dir(&self, path: &Path) -> impl Future<Output = Result<Vec<String>, FsError>> + Send;

    /// Deletes a file.
    fn remove(&self, path: &Path) -> impl Future<Output = Result<(), FsError>> + Send;

    /// Returns the last modification time of a file.
    fn modified(&self, path: &Path) -> impl Future<Output = Result<SystemTime, FsError>> + Send;

    /// Hashes the file contents. Returns `Ok(None)` if the file is absent.
    fn fingerprint(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Option<Fingerprint>, FsError>> + Send {
        async move {
            match self.read(path).await {
                Ok(bytes) => Ok(Some(Fingerprint::of(&bytes))),
                Err(FsError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }
}
