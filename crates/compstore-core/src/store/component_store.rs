//! # Component Store
//!
//! Orchestrates one scope: component registration, load with format version
//! validation and confirmed migration, and save cycles through an
//! externalization session.
//!
//! A store is mutated through `&mut self` only, so load, registration and
//! save form one exclusive write section per scope.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use log::{debug, info, warn};

use crate::engine::config::EngineConfig;
use crate::engine::constants::{BACKUP_EXTENSION, VERSION_ATTR};
use crate::engine::error::{Error, OperationFailure, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::manager::StateStorageManager;
use crate::storage::provider::StorageProvider;
use crate::storage::session::SaveOutcome;
use crate::storage::spec::StorageSpec;
use crate::storage::state_storage::lock_storage;
use crate::store::collaborators::{MigrationHandler, ReadonlyStatusHandler};
use crate::store::component::{PersistentStateComponent, SharedComponent};
use crate::store::error::StoreError;
use crate::store::scope::ScopePolicy;
use crate::xml::element::Element;

/// Lifecycle of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Unloaded,
    Loaded,
    Disposed,
}

struct Registration {
    component: SharedComponent,
    specs: Vec<StorageSpec>,
    /// State as last loaded or externalized
    last_state: Option<Element>,
    /// Modification count observed together with `last_state`
    last_modification: Option<u64>,
    /// The loaded state was rejected; it is written back untouched on save
    load_failed: bool,
}

pub struct ComponentStore<P: ScopePolicy> {
    policy: P,
    manager: StateStorageManager,
    config: EngineConfig,
    state: StoreState,
    components: BTreeMap<String, Registration>,
}

fn lock_component(component: &SharedComponent) -> Result<MutexGuard<'_, dyn PersistentStateComponent + 'static>> {
    component
        .lock()
        .map_err(|_| StorageSystemError::LockPoisoned("component".to_string()).into())
}

impl<P: ScopePolicy> ComponentStore<P> {
    pub fn new(policy: P, provider: Arc<dyn StorageProvider>, config: EngineConfig) -> Self {
        let mut manager = StateStorageManager::from_config(policy.root_name(), provider, &config);
        if let Some(legacy) = policy.legacy_storage() {
            manager = manager.with_old_storage(legacy);
        }

        Self {
            policy,
            manager,
            config,
            state: StoreState::Unloaded,
            components: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn storage_manager(&self) -> &StateStorageManager {
        &self.manager
    }

    /// Bind a path macro for this scope
    pub fn add_macro(&self, name: &str, expansion: &str) -> Result<()> {
        self.manager.add_macro(name, expansion)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        match self.state {
            StoreState::Disposed => Err(StoreError::Disposed.into()),
            _ => Ok(()),
        }
    }

    fn ensure_loaded(&self) -> Result<()> {
        match self.state {
            StoreState::Loaded => Ok(()),
            StoreState::Unloaded => Err(StoreError::NotLoaded.into()),
            StoreState::Disposed => Err(StoreError::Disposed.into()),
        }
    }

    /// Validate the format version, then initialize every registered component.
    ///
    /// Returns the components whose state could not be applied; those keep
    /// their defaults and their stored state is preserved on save.
    pub fn load(&mut self, migration: &dyn MigrationHandler) -> Result<Vec<OperationFailure>> {
        self.ensure_not_disposed()?;
        if self.state == StoreState::Loaded {
            return Ok(Vec::new());
        }

        if self.policy.is_version_gated() {
            self.check_version(migration)?;
        }

        self.state = StoreState::Loaded;
        info!("Loaded <{}> store", self.policy.root_name());
        Ok(self.init_all())
    }

    fn init_all(&mut self) -> Vec<OperationFailure> {
        let names: Vec<String> = self.components.keys().cloned().collect();
        names
            .into_iter()
            .filter_map(|name| {
                self.init_component(&name)
                    .err()
                    .map(|e| OperationFailure::new(name, e))
            })
            .collect()
    }

    fn check_version(&mut self, migration: &dyn MigrationHandler) -> Result<()> {
        let supported = self.config.project_format_version;
        let spec = self.policy.default_storage();
        let Some(storage) = self.manager.resolve_storage(&spec)? else {
            warn!("Cannot validate format version: '{}' does not resolve", spec.file);
            return Ok(());
        };

        let (path, exists, version) = {
            let mut storage = lock_storage(&storage)?;
            let path = storage
                .list_files()?
                .into_iter()
                .next()
                .unwrap_or_else(|| PathBuf::from(storage.file_spec()));
            let exists = self.manager.provider().exists(&path);
            (path, exists, storage.root_attribute(VERSION_ATTR)?)
        };

        if !exists {
            debug!("New storage {}, stamping version {}", path.display(), supported);
            return lock_storage(&storage)?.set_root_attribute(VERSION_ATTR, &supported.to_string());
        }

        let found = match version {
            None => 0,
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|_| StoreError::InvalidVersion { path: path.clone(), value })?,
        };

        if found > supported {
            return Err(StoreError::VersionMismatch {
                path,
                found,
                supported,
            }
            .into());
        }
        if found == supported {
            return Ok(());
        }

        // Resolve every registered storage so the migration covers all owned files
        for registration in self.components.values() {
            for spec in &registration.specs {
                self.manager.resolve_storage(spec)?;
            }
        }
        let files: Vec<PathBuf> = self
            .manager
            .list_all_files()?
            .into_iter()
            .filter(|file| self.manager.provider().exists(file))
            .collect();

        if !migration.confirm(&files, found, supported) {
            warn!(
                "Migration of <{}> from version {} to {} declined",
                self.policy.root_name(),
                found,
                supported
            );
            return Err(StoreError::MigrationDeclined {
                files,
                from: found,
                to: supported,
            }
            .into());
        }

        if self.config.backup_before_migration {
            self.backup(&files)?;
        }
        lock_storage(&storage)?.set_root_attribute(VERSION_ATTR, &supported.to_string())?;
        info!(
            "Migrated <{}> from version {} to {}",
            self.policy.root_name(),
            found,
            supported
        );
        Ok(())
    }

    /// Copy every file to `<name>.<timestamp>.bak`
    fn backup(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let provider = self.manager.provider();
        let mut backups = Vec::with_capacity(files.len());

        for file in files {
            let Some(file_name) = file.file_name() else {
                continue;
            };
            let backup_name = format!("{}.{}.{}", file_name.to_string_lossy(), timestamp, BACKUP_EXTENSION);
            let dir = match &self.config.backup_dir {
                Some(dir) => dir.clone(),
                None => file.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            if !dir.as_os_str().is_empty() && !provider.is_dir(&dir) {
                provider.create_dir_all(&dir)?;
            }
            let backup = dir.join(backup_name);
            provider.copy(file, &backup)?;
            info!("Backed up {} to {}", file.display(), backup.display());
            backups.push(backup);
        }
        Ok(backups)
    }

    /// Register a component; once loaded, its state is applied immediately
    pub fn register_component(&mut self, component: SharedComponent) -> Result<()> {
        self.ensure_not_disposed()?;
        let (name, mut specs) = {
            let guard = lock_component(&component)?;
            (guard.component_name().to_string(), guard.storages())
        };
        if self.components.contains_key(&name) {
            return Err(StoreError::DuplicateComponent(name).into());
        }
        if specs.is_empty() {
            specs.push(self.policy.default_storage());
        }

        debug!("Registered component '{}' in <{}>", name, self.policy.root_name());
        self.components.insert(
            name.clone(),
            Registration {
                component,
                specs,
                last_state: None,
                last_modification: None,
                load_failed: false,
            },
        );

        if self.state == StoreState::Loaded {
            self.init_component(&name)?;
        }
        Ok(())
    }

    /// Register an owned component and hand back the shared handle
    pub fn register<C>(&mut self, component: C) -> Result<Arc<Mutex<C>>>
    where
        C: PersistentStateComponent + 'static,
    {
        let shared = Arc::new(Mutex::new(component));
        self.register_component(shared.clone())?;
        Ok(shared)
    }

    /// Find the stored fragment of `name`, consuming it from its storage
    fn read_state(&self, name: &str, specs: &[StorageSpec]) -> Result<Option<Element>> {
        for spec in specs {
            let Some(storage) = self.manager.resolve_storage(spec)? else {
                continue;
            };
            if let Some(state) = lock_storage(&storage)?.get_element(name)? {
                if spec.deprecated {
                    debug!("'{}' loaded from deprecated storage {}", name, spec.file);
                }
                return Ok(Some(state));
            }
        }

        let Some(legacy) = self.manager.old_storage_spec() else {
            return Ok(None);
        };
        if specs.iter().any(|spec| spec.cache_key() == legacy.cache_key()) {
            return Ok(None);
        }
        match self.manager.old_storage()? {
            Some(storage) => {
                let state = lock_storage(&storage)?.get_element(name)?;
                if state.is_some() {
                    warn!("'{}' loaded from legacy storage {}", name, legacy.file);
                }
                Ok(state)
            }
            None => Ok(None),
        }
    }

    /// Load the stored state of one registered component into it
    pub fn init_component(&mut self, name: &str) -> Result<()> {
        self.ensure_loaded()?;
        let (component, specs) = match self.components.get(name) {
            Some(registration) => (registration.component.clone(), registration.specs.clone()),
            None => return Err(StoreError::UnknownComponent(name.to_string()).into()),
        };

        let state = self.read_state(name, &specs)?;
        let (result, modification) = {
            let mut guard = lock_component(&component)?;
            let result = match &state {
                Some(state) => guard.load_state(state.clone()),
                None => {
                    guard.no_state_loaded();
                    Ok(())
                }
            };
            (result, guard.modification_count())
        };

        if let Some(registration) = self.components.get_mut(name) {
            registration.load_failed = result.is_err();
            registration.last_state = state;
            registration.last_modification = modification;
        }
        result.map_err(Error::from)
    }

    /// Re-read every storage from disk and re-initialize every component
    pub fn reload(&mut self) -> Result<Vec<OperationFailure>> {
        self.ensure_loaded()?;
        self.manager.reload_storages()?;
        Ok(self.init_all())
    }

    /// Externalize every component and write what changed.
    ///
    /// Read-only targets abort the whole cycle before any write. Failures of
    /// single components or storages are collected in the outcome.
    pub fn save(&mut self, readonly: &dyn ReadonlyStatusHandler) -> Result<SaveOutcome> {
        self.ensure_loaded()?;
        let manager = &self.manager;
        let mut session = manager.start_externalization()?;
        if self.policy.is_version_gated() {
            session.include_storage(&self.policy.default_storage())?;
        }

        for (name, registration) in self.components.iter_mut() {
            let state = match externalize(registration) {
                Ok(state) => state,
                Err(e) => {
                    session.report_failure(OperationFailure::new(name.clone(), e));
                    // Keep whatever was stored before
                    match registration.last_state.clone() {
                        Some(previous) => previous,
                        None => continue,
                    }
                }
            };
            if let Err(e) = session.set_state(&registration.specs, name, state) {
                session.report_failure(OperationFailure::new(name.clone(), e));
            }
        }

        let save_session = session.create_save_session();
        let provider = manager.provider();
        let not_writable: Vec<PathBuf> = save_session
            .files_to_write()?
            .into_iter()
            .filter(|file| !provider.is_writable(file))
            .collect();
        if !not_writable.is_empty() {
            let still_readonly = readonly.ensure_writable(provider.as_ref(), &not_writable);
            if !still_readonly.is_empty() {
                warn!("Save of <{}> aborted: read-only files", self.policy.root_name());
                return Err(StoreError::ReadOnlyFiles(still_readonly).into());
            }
        }

        let outcome = save_session.save();
        debug!(
            "Save of <{}> wrote {} file(s) with {} failure(s)",
            self.policy.root_name(),
            outcome.saved_files.len(),
            outcome.errors.len()
        );
        Ok(outcome)
    }

    /// Every file owned by a storage this store has resolved
    pub fn all_files(&self) -> Result<Vec<PathBuf>> {
        self.manager.list_all_files()
    }

    /// Release every component; the store cannot be used afterwards
    pub fn dispose(&mut self) {
        if self.state != StoreState::Disposed {
            debug!("Disposing <{}> store", self.policy.root_name());
        }
        self.components.clear();
        self.state = StoreState::Disposed;
    }
}

/// The element to write for one component this cycle
fn externalize(registration: &mut Registration) -> Result<Element> {
    if registration.load_failed {
        return Ok(registration.last_state.clone().unwrap_or_else(empty_state));
    }

    let guard = lock_component(&registration.component)?;
    let modification = guard.modification_count();
    if modification.is_some() && modification == registration.last_modification {
        return Ok(registration.last_state.clone().unwrap_or_else(empty_state));
    }

    let state = guard.get_state()?.unwrap_or_else(empty_state);
    drop(guard);
    registration.last_state = (!state.is_empty()).then(|| state.clone());
    registration.last_modification = modification;
    Ok(state)
}

fn empty_state() -> Element {
    Element::new("state")
}

impl<P: ScopePolicy> std::fmt::Debug for ComponentStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("manager", &self.manager)
            .finish()
    }
}
