use std::fmt;
use std::sync::Arc;

use crate::storage::splitter::StateSplitter;

/// Where a component's state lives.
///
/// `file` is a path template that may contain `$MACRO$` tokens. Naming a
/// splitter selects a directory-based storage; naming a storage class
/// selects a backend registered with the manager.
#[derive(Clone)]
pub struct StorageSpec {
    pub file: String,
    pub storage_class: Option<String>,
    pub splitter: Option<Arc<dyn StateSplitter>>,
    /// Read during load, never written; state found here moves to the first non-deprecated spec
    pub deprecated: bool,
}

impl StorageSpec {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            storage_class: None,
            splitter: None,
            deprecated: false,
        }
    }

    pub fn with_storage_class(mut self, class: impl Into<String>) -> Self {
        self.storage_class = Some(class.into());
        self
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn StateSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Storages are cached under the custom class name if there is one, else the raw template
    pub fn cache_key(&self) -> &str {
        self.storage_class.as_deref().unwrap_or(&self.file)
    }

    pub fn is_directory(&self) -> bool {
        self.storage_class.is_none() && self.splitter.is_some()
    }
}

impl PartialEq for StorageSpec {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
            && self.storage_class == other.storage_class
            && self.deprecated == other.deprecated
            && self.splitter.as_ref().map(|s| s.name()) == other.splitter.as_ref().map(|s| s.name())
    }
}

impl fmt::Debug for StorageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSpec")
            .field("file", &self.file)
            .field("storage_class", &self.storage_class)
            .field("splitter", &self.splitter.as_ref().map(|s| s.name().to_string()))
            .field("deprecated", &self.deprecated)
            .finish()
    }
}
