//! # Directory-Based Storage
//!
//! One directory per collection, one file per split fragment. Every file is a
//! `<component name=...>` document wrapping the fragment(s) the splitter
//! assigned to it. Saving reconciles the directory: files the current split
//! no longer produces are deleted.
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::engine::constants::{COMPONENT_TAG, NAME_ATTR, STATE_FILE_EXTENSION};
use crate::engine::error::{Error, OperationFailure, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::macros::{SharedMacros, read_macros};
use crate::storage::provider::StorageProvider;
use crate::storage::splitter::StateSplitter;
use crate::storage::state_storage::StateStorage;
use crate::xml::codec;
use crate::xml::element::Element;
use crate::xml::error::XmlError;

/// component name -> backing file -> `<component>` document for that file
type EntryMap = BTreeMap<String, BTreeMap<PathBuf, Element>>;

#[derive(Debug, Default)]
struct SavePlan {
    writes: Vec<(PathBuf, Vec<u8>)>,
    deletes: Vec<PathBuf>,
}

impl SavePlan {
    fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .writes
            .iter()
            .map(|(path, _)| path.clone())
            .chain(self.deletes.iter().cloned())
            .collect();
        files.sort();
        files
    }
}

#[derive(Debug)]
pub struct DirectoryBasedStorage {
    file_spec: String,
    dir: PathBuf,
    splitter: Arc<dyn StateSplitter>,
    provider: Arc<dyn StorageProvider>,
    macros: SharedMacros,
    line_separator: String,
    entries: Option<EntryMap>,
}

impl DirectoryBasedStorage {
    pub fn new(
        dir: PathBuf,
        splitter: Arc<dyn StateSplitter>,
        provider: Arc<dyn StorageProvider>,
        macros: SharedMacros,
    ) -> Self {
        Self {
            file_spec: dir.display().to_string(),
            dir,
            splitter,
            provider,
            macros,
            line_separator: "\n".to_string(),
            entries: None,
        }
    }

    pub fn with_line_separator(mut self, line_separator: impl Into<String>) -> Self {
        self.line_separator = line_separator.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files currently indexed for `component`
    pub fn files_of(&mut self, component: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .entries()?
            .get(component)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn entries(&mut self) -> Result<&mut EntryMap> {
        let entries = match self.entries.take() {
            Some(entries) => entries,
            None => self.load_entries()?,
        };
        Ok(self.entries.insert(entries))
    }

    /// State files currently present in the directory
    fn files_on_disk(&self) -> Result<Vec<PathBuf>> {
        if !self.provider.is_dir(&self.dir) {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for path in self.provider.read_dir(&self.dir)? {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let is_state_file = Path::new(file_name)
                .extension()
                .is_some_and(|ext| ext == STATE_FILE_EXTENSION);
            let file = self.dir.join(file_name);
            if is_state_file && self.provider.is_file(&file) {
                files.push(file);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_entries(&self) -> Result<EntryMap> {
        let mut entries = EntryMap::new();
        let files = self.files_on_disk()?;
        if files.is_empty() {
            debug!("No state files under {}", self.dir.display());
            return Ok(entries);
        }

        let macros = read_macros(&self.macros)?;
        for file in files {
            let bytes = self.provider.read_to_bytes(&file)?;
            let mut document = match codec::parse(&bytes) {
                Ok(document) => document,
                Err(XmlError::Empty) => {
                    warn!("Ignoring empty state file {}", file.display());
                    continue;
                }
                Err(source) => {
                    return Err(StorageSystemError::Parse { path: file, source }.into());
                }
            };

            let component = match (document.name(), document.attribute(NAME_ATTR)) {
                (COMPONENT_TAG, Some(name)) => name.to_string(),
                _ => {
                    warn!(
                        "Ignoring {}: root is not a named <{}>",
                        file.display(),
                        COMPONENT_TAG
                    );
                    continue;
                }
            };

            macros.expand_element(&mut document);
            entries.entry(component).or_default().insert(file, document);
        }

        debug!(
            "Indexed {} component(s) under {}",
            entries.len(),
            self.dir.display()
        );
        Ok(entries)
    }

    fn plan(&mut self) -> Result<SavePlan> {
        if self.entries.is_none() {
            return Ok(SavePlan::default());
        }
        let on_disk: BTreeSet<PathBuf> = self.files_on_disk()?.into_iter().collect();
        let line_separator = self.line_separator.clone();
        let macros = self.macros.clone();
        let provider = self.provider.clone();
        let entries = self.entries()?;

        let mut plan = SavePlan::default();
        let mut indexed = BTreeSet::new();
        let macros = read_macros(&macros)?;

        for files in entries.values() {
            for (path, document) in files {
                indexed.insert(path.clone());
                let mut collapsed = document.clone();
                macros.collapse_element(&mut collapsed);
                let bytes = codec::to_bytes(&collapsed, &line_separator);
                if on_disk.contains(path) && provider.read_to_bytes(path)? == bytes {
                    continue;
                }
                plan.writes.push((path.clone(), bytes));
            }
        }

        plan.deletes = on_disk.difference(&indexed).cloned().collect();
        Ok(plan)
    }

    /// Deletion never leaves the owning directory
    fn is_owned(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path
                .file_name()
                .is_some_and(|name| validate_file_name(&name.to_string_lossy()).is_ok())
    }
}

fn validate_file_name(file_name: &str) -> std::result::Result<(), String> {
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !file_name.contains(['/', '\\']) => Ok(()),
        _ => Err(format!("'{file_name}' is not a plain file name")),
    }
}

impl StateStorage for DirectoryBasedStorage {
    fn file_spec(&self) -> &str {
        &self.file_spec
    }

    fn get_element(&mut self, component: &str) -> Result<Option<Element>> {
        let Some(files) = self.entries()?.remove(component) else {
            return Ok(None);
        };

        let mut fragments = Vec::new();
        for (_, mut document) in files {
            fragments.extend(document.take_children());
        }

        let mut state = Element::new(COMPONENT_TAG).with_attribute(NAME_ATTR, component);
        self.splitter.merge(&mut state, fragments)?;
        Ok(Some(state))
    }

    fn has_element(&mut self, component: &str) -> Result<bool> {
        Ok(self.entries()?.contains_key(component))
    }

    fn set_element(&mut self, component: &str, state: Element) -> Result<()> {
        let splitter = self.splitter.clone();
        let dir = self.dir.clone();

        let mut files = BTreeMap::new();
        for (fragment, file_name) in splitter.split(state)? {
            validate_file_name(&file_name).map_err(|reason| StorageSystemError::InvalidPath {
                path: dir.join(&file_name),
                reason,
            })?;
            let path = dir.join(&file_name);
            let document = Element::new(COMPONENT_TAG)
                .with_attribute(NAME_ATTR, component)
                .with_child(fragment);
            if files.insert(path, document).is_some() {
                return Err(StorageSystemError::splitter(
                    splitter.name(),
                    format!("file '{file_name}' produced twice for component '{component}'"),
                )
                .into());
            }
        }

        let entries = self.entries()?;
        for (other, other_files) in entries.iter() {
            if other == component {
                continue;
            }
            if let Some(path) = files.keys().find(|path| other_files.contains_key(*path)) {
                return Err(StorageSystemError::splitter(
                    splitter.name(),
                    format!(
                        "file '{}' already belongs to component '{}'",
                        path.display(),
                        other
                    ),
                )
                .into());
            }
        }

        if files.is_empty() {
            entries.remove(component);
        } else {
            entries.insert(component.to_string(), files);
        }
        Ok(())
    }

    fn remove_element(&mut self, component: &str) -> Result<bool> {
        Ok(self.entries()?.remove(component).is_some())
    }

    fn needs_save(&mut self) -> Result<bool> {
        Ok(!self.plan()?.is_empty())
    }

    fn files_to_write(&mut self) -> Result<Vec<PathBuf>> {
        Ok(self.plan()?.files())
    }

    fn save(&mut self) -> Result<Vec<PathBuf>> {
        let plan = self.plan()?;
        if plan.is_empty() {
            debug!("{} is up to date", self.dir.display());
            return Ok(Vec::new());
        }

        let mut touched = Vec::new();
        if !plan.writes.is_empty() && !self.provider.is_dir(&self.dir) {
            self.provider.create_dir_all(&self.dir)?;
        }
        for (path, bytes) in plan.writes {
            self.provider.write_bytes(&path, &bytes)?;
            debug!("Wrote {}", path.display());
            touched.push(path);
        }

        let mut failures = Vec::new();
        for path in plan.deletes {
            if !self.is_owned(&path) {
                warn!("Refusing to delete {} outside {}", path.display(), self.dir.display());
                continue;
            }
            match self.provider.remove_file(&path) {
                Ok(()) => {
                    debug!("Deleted stale state file {}", path.display());
                    touched.push(path);
                }
                Err(e) => {
                    warn!("Could not delete stale state file {}: {}", path.display(), e);
                    failures.push(OperationFailure::new(path.display().to_string(), e));
                }
            }
        }

        info!("Saved {} file(s) under {}", touched.len(), self.dir.display());
        if !failures.is_empty() {
            return Err(Error::SaveFailed { failures });
        }
        Ok(touched)
    }

    fn list_files(&mut self) -> Result<Vec<PathBuf>> {
        let mut files: BTreeSet<PathBuf> = self.files_on_disk()?.into_iter().collect();
        for component_files in self.entries()?.values() {
            files.extend(component_files.keys().cloned());
        }
        Ok(files.into_iter().collect())
    }

    fn reload(&mut self) {
        self.entries = None;
    }
}
