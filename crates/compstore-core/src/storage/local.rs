use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::engine::error::{Error, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::provider::StorageProvider;

/// Local filesystem storage provider
#[derive(Clone, Default)]
pub struct LocalStorageProvider {
    base_path: PathBuf,
}

impl LocalStorageProvider {
    /// Create a new local storage provider; relative paths resolve against `base_path`
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Provider that uses every path as given
    pub fn unrooted() -> Self {
        Self::default()
    }

    /// Resolve a relative path against the base path
    fn resolve_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.base_path.join(path)
    }
}

impl StorageProvider for LocalStorageProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve_path(path).exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve_path(path).is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve_path(path).is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::create_dir_all(&full_path).map_err(|e| Error::io(e, "create_dir_all", full_path))
    }

    fn read_to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);
        fs::read(&full_path).map_err(|e| Error::io(e, "read_to_bytes", full_path))
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(path);

        let parent = match full_path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => {
                return Err(StorageSystemError::InvalidPath {
                    path: full_path,
                    reason: "cannot write to a path without a parent directory".to_string(),
                }
                .into());
            }
        };

        // Ensure parent directory exists
        if !parent.is_dir() {
            fs::create_dir_all(&parent).map_err(|e| Error::io(e, "create_dir_all", parent.clone()))?;
        }

        // Create a named temporary file in the same directory as the target file
        let mut temp_file = NamedTempFile::new_in(&parent)
            .map_err(|e| Error::io(e, "create_temp_file", parent.clone()))?;

        temp_file
            .write_all(contents)
            .map_err(|e| Error::io(e, "write_to_temp_file", temp_file.path().to_path_buf()))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| Error::io(e, "sync_temp_file", temp_file.path().to_path_buf()))?;

        // Persist the temporary file, atomically replacing the target file.
        // On failure the temporary file is removed and the old target survives.
        temp_file
            .persist(&full_path)
            .map_err(|e| Error::io(e.error, "persist_temp_file", full_path.clone()))?;

        debug!("Wrote {} bytes to {}", contents.len(), full_path.display());
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let full_from = self.resolve_path(from);
        let full_to = self.resolve_path(to);
        fs::copy(&full_from, &full_to)
            .map(|_| ())
            .map_err(|e| Error::io(e, "copy", full_from)) // Report error with source path
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::remove_file(&full_path).map_err(|e| Error::io(e, "remove_file", full_path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let full_path = self.resolve_path(path);
        let entries = fs::read_dir(&full_path).map_err(|e| Error::io(e, "read_dir", full_path.clone()))?;
        let mut result = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| Error::io(e, "read_dir_entry", full_path.clone()))?;
            let path = entry.path();

            // Convert back to a relative path if possible
            match path.strip_prefix(&self.base_path) {
                Ok(rel_path) => result.push(rel_path.to_path_buf()),
                Err(_) => result.push(path),
            }
        }

        result.sort();
        Ok(result)
    }

    fn is_writable(&self, path: &Path) -> bool {
        match fs::metadata(self.resolve_path(path)) {
            Ok(metadata) => !metadata.permissions().readonly(),
            Err(_) => true,
        }
    }

    fn set_readonly(&self, path: &Path, readonly: bool) -> Result<()> {
        let full_path = self.resolve_path(path);
        let metadata = fs::metadata(&full_path).map_err(|e| Error::io(e, "metadata", full_path.clone()))?;
        let mut permissions = metadata.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(readonly);
        fs::set_permissions(&full_path, permissions).map_err(|e| Error::io(e, "set_permissions", full_path))
    }
}

impl fmt::Debug for LocalStorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStorageProvider")
            .field("base_path", &self.base_path)
            .finish()
    }
}
