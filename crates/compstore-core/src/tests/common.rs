//! Helpers shared by unit and integration tests.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::engine::error::{Error, Result};
use crate::storage::local::LocalStorageProvider;
use crate::storage::macros::{MacroTable, SharedMacros};
use crate::storage::provider::StorageProvider;

/// Route `log` output through the test harness; safe to call repeatedly
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn shared_macros(table: MacroTable) -> SharedMacros {
    Arc::new(std::sync::RwLock::new(table))
}

/// Local provider that counts every mutation of the file system
#[derive(Debug, Default)]
pub struct CountingProvider {
    inner: LocalStorageProvider,
    writes: AtomicUsize,
    removals: AtomicUsize,
    deny_removals: AtomicBool,
}

impl CountingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.writes() + self.removals()
    }

    /// Make every later `remove_file` fail with a permission error
    pub fn deny_removals(&self) {
        self.deny_removals.store(true, Ordering::SeqCst);
    }
}

impl StorageProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.create_dir_all(path)
    }

    fn read_to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read_to_bytes(path)
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_bytes(path, contents)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        if self.deny_removals.load(Ordering::SeqCst) {
            let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "removal denied");
            return Err(Error::io(denied, "remove_file", path.to_path_buf()));
        }
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_file(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }

    fn is_writable(&self, path: &Path) -> bool {
        self.inner.is_writable(path)
    }

    fn set_readonly(&self, path: &Path, readonly: bool) -> Result<()> {
        self.inner.set_readonly(path, readonly)
    }
}

/// Sorted file names directly under `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("directory should be readable")
        .map(|entry| {
            entry
                .expect("entry should be readable")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

pub fn read_string(path: &Path) -> String {
    std::fs::read_to_string(path).expect("file should be readable")
}
