//! Local snapshot of the collection kept between sessions.
//!
//! The cache is what the application starts from before the shared file has
//! been read, and what survives when the shared location is unreachable. It
//! holds one document under one fixed key.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// File name of the cache inside the data directory.
pub const CACHE_FILE: &str = "cache.json";

/// Errors that can occur while reading or writing the local cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache could not be read.
    #[error("failed to read cache {}: {source}", path.display())]
    Read {
        /// Cache path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The cache could not be written.
    #[error("failed to write cache {}: {source}", path.display())]
    Write {
        /// Cache path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The backend is unavailable.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key-value style storage for the serialized document.
pub trait LocalCache: Send + Sync {
    /// Loads the cached bytes, or `None` when nothing has been cached yet.
    fn load(&self)
    -> impl std::future::Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send;

    /// Replaces the cached bytes.
    fn store(&self, bytes: &[u8])
    -> impl std::future::Future<Output = Result<(), CacheError>> + Send;
}

/// Cache stored as a single JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    /// Creates a cache at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the default cache path: `<data_dir>/taskboard/cache.json`.
    ///
    /// Falls back to the current directory if the platform has no data
    /// directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskboard")
            .join(CACHE_FILE)
    }

    /// Returns the cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalCache for FileCache {
    async fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn store(&self, bytes: &[u8]) -> Result<(), CacheError> {
        let write_err = |source: std::io::Error| CacheError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        Ok(())
    }
}

/// In-memory cache for testing.
#[derive(Debug, Default)]
pub struct MemoryCache {
    bytes: Mutex<Option<Vec<u8>>>,
    fail: AtomicBool,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache already holding `bytes`.
    #[must_use]
    pub fn with_contents(bytes: &[u8]) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes.to_vec())),
            fail: AtomicBool::new(false),
        }
    }

    /// Makes every operation fail (or succeed again).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the current contents.
    #[must_use]
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.lock().clone()
    }
}

impl LocalCache for MemoryCache {
    async fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected failure".to_string()));
        }
        Ok(self.contents())
    }

    async fn store(&self, bytes: &[u8]) -> Result<(), CacheError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected failure".to_string()));
        }
        *self.bytes.lock() = Some(bytes.to_vec());
        Ok(())
    }
}
