//! # File-Based Storage
//!
//! One document holding many `<component name=...>` fragments under a root
//! such as `<application>` or `<project version="4">`.
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::engine::constants::{COMPONENT_TAG, NAME_ATTR};
use crate::engine::error::Result;
use crate::storage::error::StorageSystemError;
use crate::storage::macros::{SharedMacros, read_macros};
use crate::storage::provider::StorageProvider;
use crate::storage::state_storage::{StateStorage, component_fragment, is_fragment_of};
use crate::xml::codec;
use crate::xml::element::Element;
use crate::xml::error::XmlError;

/// What a save would do to the backing file
enum PendingWrite {
    Write(Vec<u8>),
    Delete,
}

#[derive(Debug)]
pub struct FileBasedStorage {
    file_spec: String,
    path: PathBuf,
    root_name: String,
    provider: Arc<dyn StorageProvider>,
    macros: SharedMacros,
    line_separator: String,
    /// Lazily loaded on first access; `None` until then
    root: Option<Element>,
}

impl FileBasedStorage {
    pub fn new(
        path: PathBuf,
        root_name: impl Into<String>,
        provider: Arc<dyn StorageProvider>,
        macros: SharedMacros,
    ) -> Self {
        Self {
            file_spec: path.display().to_string(),
            path,
            root_name: root_name.into(),
            provider,
            macros,
            line_separator: "\n".to_string(),
            root: None,
        }
    }

    pub fn with_line_separator(mut self, line_separator: impl Into<String>) -> Self {
        self.line_separator = line_separator.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.root.is_some()
    }

    /// Names of the fragments currently held in the root
    pub fn component_names(&mut self) -> Result<Vec<String>> {
        Ok(self
            .root()?
            .children_named(COMPONENT_TAG)
            .filter_map(|c| c.attribute(NAME_ATTR))
            .map(str::to_string)
            .collect())
    }

    fn root(&mut self) -> Result<&mut Element> {
        let root = match self.root.take() {
            Some(root) => root,
            None => self.load_root()?,
        };
        Ok(self.root.insert(root))
    }

    fn load_root(&self) -> Result<Element> {
        if !self.provider.exists(&self.path) {
            debug!("Storage file {} does not exist yet", self.path.display());
            return Ok(Element::new(&self.root_name));
        }

        let bytes = self.provider.read_to_bytes(&self.path)?;
        let mut root = match codec::parse(&bytes) {
            Ok(root) => root,
            Err(XmlError::Empty) => {
                debug!("Storage file {} is empty", self.path.display());
                return Ok(Element::new(&self.root_name));
            }
            Err(source) => {
                return Err(StorageSystemError::Parse {
                    path: self.path.clone(),
                    source,
                }
                .into());
            }
        };

        if root.name() != self.root_name {
            debug!(
                "Storage file {} has root <{}>, expected <{}>",
                self.path.display(),
                root.name(),
                self.root_name
            );
        }

        read_macros(&self.macros)?.expand_element(&mut root);
        debug!("Loaded storage file {}", self.path.display());
        Ok(root)
    }

    fn pending_write(&mut self) -> Result<Option<PendingWrite>> {
        if self.root.is_none() {
            return Ok(None);
        }
        let line_separator = self.line_separator.clone();
        let macros = self.macros.clone();
        let root = self.root()?;
        root.sort_children_by(compare_fragments);

        if root.is_empty() {
            let exists = self.provider.exists(&self.path);
            return Ok(exists.then_some(PendingWrite::Delete));
        }

        let mut collapsed = root.clone();
        read_macros(&macros)?.collapse_element(&mut collapsed);
        let bytes = codec::to_bytes(&collapsed, &line_separator);

        if self.provider.exists(&self.path) && self.provider.read_to_bytes(&self.path)? == bytes {
            return Ok(None);
        }
        Ok(Some(PendingWrite::Write(bytes)))
    }
}

/// Order by tag (case-insensitive), then by `name` attribute
fn compare_fragments(a: &Element, b: &Element) -> Ordering {
    a.name()
        .to_lowercase()
        .cmp(&b.name().to_lowercase())
        .then_with(|| a.attribute(NAME_ATTR).cmp(&b.attribute(NAME_ATTR)))
}

impl StateStorage for FileBasedStorage {
    fn file_spec(&self) -> &str {
        &self.file_spec
    }

    fn get_element(&mut self, component: &str) -> Result<Option<Element>> {
        let root = self.root()?;
        Ok(root
            .position_of_child(|c| is_fragment_of(c, component))
            .map(|index| root.detach_child(index)))
    }

    fn has_element(&mut self, component: &str) -> Result<bool> {
        Ok(self
            .root()?
            .position_of_child(|c| is_fragment_of(c, component))
            .is_some())
    }

    fn set_element(&mut self, component: &str, state: Element) -> Result<()> {
        let root = self.root()?;
        root.remove_children_where(|c| is_fragment_of(c, component));
        if !state.is_empty() {
            root.add_child(component_fragment(component, state));
        }
        Ok(())
    }

    fn remove_element(&mut self, component: &str) -> Result<bool> {
        Ok(!self
            .root()?
            .remove_children_where(|c| is_fragment_of(c, component))
            .is_empty())
    }

    fn needs_save(&mut self) -> Result<bool> {
        Ok(self.pending_write()?.is_some())
    }

    fn files_to_write(&mut self) -> Result<Vec<PathBuf>> {
        Ok(match self.pending_write()? {
            Some(_) => vec![self.path.clone()],
            None => Vec::new(),
        })
    }

    fn save(&mut self) -> Result<Vec<PathBuf>> {
        match self.pending_write()? {
            None => {
                debug!("{} is up to date", self.path.display());
                Ok(Vec::new())
            }
            Some(PendingWrite::Delete) => {
                self.provider.remove_file(&self.path)?;
                info!("Deleted empty storage file {}", self.path.display());
                Ok(vec![self.path.clone()])
            }
            Some(PendingWrite::Write(bytes)) => {
                self.provider.write_bytes(&self.path, &bytes)?;
                info!("Saved {}", self.path.display());
                Ok(vec![self.path.clone()])
            }
        }
    }

    fn list_files(&mut self) -> Result<Vec<PathBuf>> {
        Ok(vec![self.path.clone()])
    }

    fn reload(&mut self) {
        self.root = None;
    }

    fn root_attribute(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.root()?.attribute(key).map(str::to_string))
    }

    fn set_root_attribute(&mut self, key: &str, value: &str) -> Result<()> {
        self.root()?.set_attribute(key, value);
        Ok(())
    }
}
