//! In-memory [`SharedFs`] for tests.
//!
//! Several controllers can share one `MemoryFs` (behind an `Arc`) to play
//! independent application instances writing the same shared file. Reads,
//! fingerprints, writes and renames can each be made to fail to exercise the
//! degraded paths.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;

use super::{Fingerprint, FsError, SharedFs};

#[derive(Debug)]
struct File {
    bytes: Vec<u8>,
    modified: SystemTime,
}

impl File {
    fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            modified: SystemTime::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<PathBuf, File>,
    dirs: BTreeSet<PathBuf>,
}

impl Tree {
    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if parent.parent().is_none() || parent.as_os_str().is_empty() => true,
            Some(parent) => self.dirs.contains(parent),
        }
    }
}

/// Shared in-memory filesystem with failure injection.
#[derive(Debug, Default)]
pub struct MemoryFs {
    tree: Mutex<Tree>,
    fail_reads: AtomicBool,
    fail_fingerprints: AtomicBool,
    fail_writes: AtomicBool,
    fail_renames: AtomicBool,
    renames: AtomicUsize,
}

impl MemoryFs {
    /// Creates an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `read` fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `fingerprint` fail (or succeed again).
    pub fn set_fail_fingerprints(&self, fail: bool) {
        self.fail_fingerprints.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `write` and `create_new` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `rename` fail (or succeed again).
    pub fn set_fail_renames(&self, fail: bool) {
        self.fail_renames.store(fail, Ordering::SeqCst);
    }

    /// Number of successful renames so far.
    #[must_use]
    pub fn rename_count(&self) -> usize {
        self.renames.load(Ordering::SeqCst)
    }

    /// Returns a copy of a file's contents, if present.
    #[must_use]
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.tree.lock().files.get(path).map(|f| f.bytes.clone())
    }

    /// Overrides a file's modification time. Test setup helper.
    pub fn set_modified(&self, path: &Path, modified: SystemTime) {
        if let Some(file) = self.tree.lock().files.get_mut(path) {
            file.modified = modified;
        }
    }

    /// Returns every file path currently stored.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.tree.lock().files.keys().cloned().collect()
    }

    /// Places a file directly, creating its ancestors. Test setup helper.
    pub fn seed(&self, path: &Path, bytes: &[u8]) {
        let mut tree = self.tree.lock();
        if let Some(parent) = path.parent() {
            tree.dirs.extend(parent.ancestors().map(Path::to_path_buf));
        }
        tree.files.insert(path.to_path_buf(), File::new(bytes));
    }

    fn check(&self, flag: &AtomicBool, path: &Path) -> Result<(), FsError> {
        if flag.load(Ordering::SeqCst) {
            Err(FsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("injected failure"),
            })
        } else {
            Ok(())
        }
    }
}

impl SharedFs for MemoryFs {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.check(&self.fail_reads, path)?;
        self.contents(path)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), FsError> {
        self.check(&self.fail_writes, path)?;
        let mut tree = self.tree.lock();
        if !tree.parent_exists(path) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        tree.files.insert(path.to_path_buf(), File::new(bytes));
        Ok(())
    }

    async fn create_new(&self, path: &Path, bytes: &[u8]) -> Result<bool, FsError> {
        self.check(&self.fail_writes, path)?;
        let mut tree = self.tree.lock();
        if !tree.parent_exists(path) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        if tree.files.contains_key(path) {
            return Ok(false);
        }
        tree.files.insert(path.to_path_buf(), File::new(bytes));
        Ok(true)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.check(&self.fail_renames, from)?;
        let mut tree = self.tree.lock();
        let file = tree
            .files
            .remove(from)
            .ok_or_else(|| FsError::NotFound(from.to_path_buf()))?;
        tree.files.insert(to.to_path_buf(), file);
        self.renames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.tree
            .lock()
            .dirs
            .extend(path.ancestors().map(Path::to_path_buf));
        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, FsError> {
        let tree = self.tree.lock();
        if !tree.dirs.contains(path) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        Ok(tree
            .files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect())
    }

    async fn remove(&self, path: &Path) -> Result<(), FsError> {
        self.tree
            .lock()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime, FsError> {
        self.tree
            .lock()
            .files
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    async fn fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>, FsError> {
        self.check(&self.fail_fingerprints, path)?;
        Ok(self
            .tree
            .lock()
            .files
            .get(path)
            .map(|f| Fingerprint::of(&f.bytes)))
    }
}
