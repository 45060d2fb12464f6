//! # Externalization and Save Sessions
//!
//! A save cycle is `Idle -> Externalizing -> Saving -> Idle`. The manager
//! hands out one [`ExternalizationSession`]; consuming it through
//! [`ExternalizationSession::create_save_session`] flushes the buffered
//! states into their storages and yields the [`SaveSession`], and consuming
//! that through [`SaveSession::save`] performs the writes. Each step takes
//! `self` by value, so no session can be used twice.
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::engine::error::{Error, OperationFailure, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::manager::StateStorageManager;
use crate::storage::spec::StorageSpec;
use crate::storage::state_storage::{SharedStorage, lock_storage};
use crate::xml::element::Element;

/// Result of a save: files actually written or deleted, and per-target failures.
///
/// Storages that saved successfully stay committed even when others failed.
#[derive(Debug, Default)]
pub struct SaveOutcome {
    pub saved_files: Vec<PathBuf>,
    pub errors: Vec<OperationFailure>,
}

impl SaveOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: SaveOutcome) {
        self.saved_files.extend(other.saved_files);
        self.errors.extend(other.errors);
    }

    /// Saved files on success, [`Error::SaveFailed`] otherwise
    pub fn into_result(self) -> Result<Vec<PathBuf>> {
        if self.errors.is_empty() {
            Ok(self.saved_files)
        } else {
            Err(Error::SaveFailed {
                failures: self.errors,
            })
        }
    }
}

/// Holds the manager's session flag until dropped
#[derive(Debug)]
struct SessionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Buffered writes for one storage
struct PendingStorage {
    template: String,
    storage: SharedStorage,
    /// `None` removes the component's fragment
    writes: Vec<(String, Option<Element>)>,
}

impl PendingStorage {
    fn push(&mut self, component: &str, state: Option<Element>) {
        self.writes.retain(|(name, _)| name != component);
        self.writes.push((component.to_string(), state));
    }
}

pub struct ExternalizationSession<'a> {
    manager: &'a StateStorageManager,
    pending: BTreeMap<String, PendingStorage>,
    errors: Vec<OperationFailure>,
    _guard: SessionGuard<'a>,
}

impl<'a> ExternalizationSession<'a> {
    pub(crate) fn open(manager: &'a StateStorageManager) -> Result<Self> {
        manager
            .session_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StorageSystemError::SessionInProgress)?;
        debug!("Externalization session opened for <{}>", manager.root_name());

        Ok(Self {
            manager,
            pending: BTreeMap::new(),
            errors: Vec::new(),
            _guard: SessionGuard {
                flag: &manager.session_open,
            },
        })
    }

    fn buffer(&mut self, spec: &StorageSpec, storage: SharedStorage, component: &str, state: Option<Element>) {
        self.pending
            .entry(spec.cache_key().to_string())
            .or_insert_with(|| PendingStorage {
                template: spec.file.clone(),
                storage,
                writes: Vec::new(),
            })
            .push(component, state);
    }

    /// Buffer `state` for `component` in the first spec whose storage resolves.
    ///
    /// Deprecated specs are never written; any fragment they still hold for
    /// the component is scheduled for removal. Returns false when no spec
    /// resolved.
    pub fn set_state(&mut self, specs: &[StorageSpec], component: &str, state: Element) -> Result<bool> {
        let mut state = Some(state);

        for spec in specs {
            let Some(storage) = self.manager.resolve_storage(spec)? else {
                continue;
            };
            if spec.deprecated {
                self.buffer(spec, storage, component, None);
            } else if let Some(state) = state.take() {
                debug!("Buffered state of '{}' for {}", component, spec.file);
                self.buffer(spec, storage, component, Some(state));
            }
        }

        if state.is_some() {
            warn!("No storage resolved for component '{}'", component);
            return Ok(false);
        }
        Ok(true)
    }

    /// Buffer `state` in the legacy combined file regardless of new-style specs
    pub fn set_state_in_old_storage(&mut self, component: &str, state: Element) -> Result<bool> {
        let Some(spec) = self.manager.old_storage_spec().cloned() else {
            warn!("No legacy storage configured for component '{}'", component);
            return Ok(false);
        };
        match self.manager.resolve_storage(&spec)? {
            Some(storage) => {
                self.buffer(&spec, storage, component, Some(state));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Take part in this save without buffering a state, so changes made
    /// directly to the storage (such as a version stamp) are written
    pub fn include_storage(&mut self, spec: &StorageSpec) -> Result<bool> {
        let Some(storage) = self.manager.resolve_storage(spec)? else {
            return Ok(false);
        };
        self.pending
            .entry(spec.cache_key().to_string())
            .or_insert_with(|| PendingStorage {
                template: spec.file.clone(),
                storage,
                writes: Vec::new(),
            });
        Ok(true)
    }

    /// Record a failure that belongs in this cycle's outcome
    pub fn report_failure(&mut self, failure: OperationFailure) {
        self.errors.push(failure);
    }

    /// Flush every buffered state into its storage and move on to saving
    pub fn create_save_session(self) -> SaveSession<'a> {
        let ExternalizationSession {
            manager,
            pending,
            mut errors,
            _guard,
        } = self;

        let mut storages = Vec::with_capacity(pending.len());
        for (key, entry) in pending {
            match lock_storage(&entry.storage) {
                Ok(mut storage) => {
                    for (component, state) in entry.writes {
                        let result = match state {
                            Some(state) => storage.set_element(&component, state),
                            None => storage.remove_element(&component).map(|_| ()),
                        };
                        if let Err(e) = result {
                            errors.push(OperationFailure::new(format!("{key}#{component}"), e));
                        }
                    }
                }
                Err(e) => {
                    errors.push(OperationFailure::new(key, e));
                    continue;
                }
            }
            storages.push((key, entry.template, entry.storage));
        }

        SaveSession {
            manager,
            storages,
            errors,
            _guard,
        }
    }
}

pub struct SaveSession<'a> {
    manager: &'a StateStorageManager,
    storages: Vec<(String, String, SharedStorage)>,
    errors: Vec<OperationFailure>,
    _guard: SessionGuard<'a>,
}

impl SaveSession<'_> {
    /// Cache keys of the storages touched during externalization
    pub fn storage_keys(&self) -> Vec<&str> {
        self.storages.iter().map(|(key, _, _)| key.as_str()).collect()
    }

    pub fn needs_save(&self) -> Result<bool> {
        for (_, _, storage) in &self.storages {
            if lock_storage(storage)?.needs_save()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Dry run: files a save would write or delete
    pub fn files_to_write(&self) -> Result<Vec<PathBuf>> {
        let mut files = BTreeSet::new();
        for (_, _, storage) in &self.storages {
            files.extend(lock_storage(storage)?.files_to_write()?);
        }
        Ok(files.into_iter().collect())
    }

    /// Macros referenced by the templates of the touched storages
    pub fn used_macros(&self) -> Result<BTreeSet<String>> {
        let mut used = BTreeSet::new();
        for (_, template, _) in &self.storages {
            used.extend(self.manager.used_macros(template)?);
        }
        Ok(used)
    }

    /// Save every storage that needs it. Failures are collected per storage.
    pub fn save(self) -> SaveOutcome {
        let mut outcome = SaveOutcome {
            saved_files: Vec::new(),
            errors: self.errors,
        };

        for (key, _, storage) in &self.storages {
            let saved = lock_storage(storage).and_then(|mut storage| storage.save());
            match saved {
                Ok(files) => outcome.saved_files.extend(files),
                Err(e) => {
                    warn!("Saving storage '{}' failed: {}", key, e);
                    outcome.errors.push(OperationFailure::new(key.clone(), e));
                }
            }
        }

        if !outcome.saved_files.is_empty() {
            info!(
                "Saved {} file(s) for <{}>",
                outcome.saved_files.len(),
                self.manager.root_name()
            );
        }
        outcome
    }
}
