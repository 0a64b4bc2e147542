// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory filesystem for tests.
///
/// Clones share the same underlying file table, so a test can hand one
/// clone to the code under test and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
    reads: Arc<Mutex<BTreeMap<PathBuf, usize>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.files()
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// All paths currently stored, in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files().get(path.as_ref()).cloned()
    }

    /// How many times `path` has been read.
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        *self
            .reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_path_buf())
            .or_default() += 1;
        self.files()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let content = self.read(path)?;
        String::from_utf8(content).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files();
        files.contains_key(path) || files.keys().any(|p| p.starts_with(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }
}
