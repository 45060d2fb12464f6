use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::engine::error::Result;

/// File-system abstraction every storage backend goes through
pub trait StorageProvider: Send + Sync + Debug {
    /// Get the name of this provider
    fn name(&self) -> &str;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a directory and all its parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read a file to a vector of bytes
    fn read_to_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    /// Replace the contents of a file. Implementations must not leave a
    /// partially written target behind: write elsewhere, then swap.
    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Copy a file from one path to another
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Remove a file
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// A missing file counts as writable: it can be created
    fn is_writable(&self, path: &Path) -> bool;

    /// Toggle the read-only flag of an existing file
    fn set_readonly(&self, path: &Path, readonly: bool) -> Result<()>;
}
