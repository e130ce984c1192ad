//! [`SharedFs`] backed by the real filesystem (local disk or mounted share).

use std::path::Path;
use std::time::SystemTime;

use tokio::io::AsyncWriteExt;

use super::{FsError, SharedFs};

/// Filesystem access through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl DiskFs {
    /// Creates a disk backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SharedFs for DiskFs {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), FsError> {
        let io = |e| FsError::from_io(path, e);
        let mut file = tokio::fs::File::create(path).await.map_err(io)?;
        file.write_all(bytes).await.map_err(io)?;
        // The rename that follows is only crash-safe if the data is on disk.
        file.sync_all().await.map_err(io)
    }

    async fn create_new(&self, path: &Path, bytes: &[u8]) -> Result<bool, FsError> {
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(FsError::from_io(path, e)),
        };
        file.write_all(bytes)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        file.flush().await.map_err(|e| FsError::from_io(path, e))?;
        Ok(true)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| FsError::from_io(from, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, FsError> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(path, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn remove(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime, FsError> {
        tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|e| FsError::from_io(path, e))
    }
}
