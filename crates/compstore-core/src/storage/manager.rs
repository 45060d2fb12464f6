//! # State Storage Manager
//!
//! Resolves [`StorageSpec`]s to storage instances and owns the macro table
//! used for path expansion. Every resolution is cached under the spec's
//! cache key, including failed ones: a template with an unresolved macro is
//! remembered as absent instead of being re-expanded on every lookup.
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, warn};

use crate::engine::config::EngineConfig;
use crate::engine::error::Result;
use crate::storage::directory_based::DirectoryBasedStorage;
use crate::storage::error::StorageSystemError;
use crate::storage::file_based::FileBasedStorage;
use crate::storage::macros::{MacroTable, SharedMacros, normalize_name, read_macros, write_macros};
use crate::storage::provider::StorageProvider;
use crate::storage::session::ExternalizationSession;
use crate::storage::spec::StorageSpec;
use crate::storage::state_storage::{SharedStorage, lock_storage, share};

/// What a custom storage factory gets to build its backend
#[derive(Debug, Clone)]
pub struct StorageContext {
    /// `spec.file` with every macro expanded
    pub path: PathBuf,
    pub root_name: String,
    pub provider: Arc<dyn StorageProvider>,
    pub macros: SharedMacros,
    pub line_separator: String,
}

/// Builds a custom storage backend registered under a class name
pub type StorageFactory =
    Arc<dyn Fn(&StorageSpec, &StorageContext) -> Result<SharedStorage> + Send + Sync>;

struct CacheEntry {
    template: String,
    /// `None` marks a template that failed to resolve
    storage: Option<SharedStorage>,
}

pub struct StateStorageManager {
    root_name: String,
    provider: Arc<dyn StorageProvider>,
    macros: SharedMacros,
    line_separator: String,
    cache: Mutex<HashMap<String, CacheEntry>>,
    storage_classes: RwLock<HashMap<String, StorageFactory>>,
    pub(crate) session_open: AtomicBool,
    old_storage_spec: Option<StorageSpec>,
}

impl StateStorageManager {
    /// Create a manager whose file-based storages use `root_name` as root tag
    pub fn new(root_name: impl Into<String>, provider: Arc<dyn StorageProvider>, macros: MacroTable) -> Self {
        Self {
            root_name: root_name.into(),
            provider,
            macros: Arc::new(RwLock::new(macros)),
            line_separator: "\n".to_string(),
            cache: Mutex::new(HashMap::new()),
            storage_classes: RwLock::new(HashMap::new()),
            session_open: AtomicBool::new(false),
            old_storage_spec: None,
        }
    }

    /// Create a manager seeded from an engine configuration
    pub fn from_config(
        root_name: impl Into<String>,
        provider: Arc<dyn StorageProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(root_name, provider, config.macro_table())
            .with_line_separator(config.line_separator.clone())
    }

    pub fn with_line_separator(mut self, line_separator: impl Into<String>) -> Self {
        self.line_separator = line_separator.into();
        self
    }

    /// Legacy combined file used by `set_state_in_old_storage` and load fallback
    pub fn with_old_storage(mut self, spec: StorageSpec) -> Self {
        self.old_storage_spec = Some(spec);
        self
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    pub fn macros(&self) -> SharedMacros {
        self.macros.clone()
    }

    pub fn old_storage_spec(&self) -> Option<&StorageSpec> {
        self.old_storage_spec.as_ref()
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.cache
            .lock()
            .map_err(|_| StorageSystemError::LockPoisoned("storage cache".to_string()).into())
    }

    /// Resolve `spec` to its storage, creating it on first use.
    ///
    /// Returns `Ok(None)` when the path template has unresolved macros.
    pub fn resolve_storage(&self, spec: &StorageSpec) -> Result<Option<SharedStorage>> {
        let key = spec.cache_key().to_string();
        let mut cache = self.lock_cache()?;
        if let Some(entry) = cache.get(&key) {
            debug!("Storage cache hit for '{}'", key);
            return Ok(entry.storage.clone());
        }

        let storage = self.create_storage(spec)?;
        cache.insert(
            key,
            CacheEntry {
                template: spec.file.clone(),
                storage: storage.clone(),
            },
        );
        Ok(storage)
    }

    /// Storage for the legacy combined file, if one is configured
    pub fn old_storage(&self) -> Result<Option<SharedStorage>> {
        match &self.old_storage_spec {
            Some(spec) => self.resolve_storage(spec),
            None => Ok(None),
        }
    }

    fn create_storage(&self, spec: &StorageSpec) -> Result<Option<SharedStorage>> {
        let expanded = match read_macros(&self.macros)?.expand(&spec.file) {
            Ok(expanded) => expanded,
            Err(unresolved) => {
                warn!(
                    "Storage '{}' is unavailable: unresolved macro(s) {}",
                    spec.file,
                    unresolved.join(", ")
                );
                return Ok(None);
            }
        };
        let path = PathBuf::from(expanded);

        if let Some(class) = &spec.storage_class {
            let factory = {
                let classes = self.storage_classes.read().map_err(|_| {
                    StorageSystemError::LockPoisoned("storage class registry".to_string())
                })?;
                classes
                    .get(class)
                    .cloned()
                    .ok_or_else(|| StorageSystemError::UnknownStorageClass(class.clone()))?
            };
            let context = StorageContext {
                path,
                root_name: self.root_name.clone(),
                provider: self.provider.clone(),
                macros: self.macros.clone(),
                line_separator: self.line_separator.clone(),
            };
            debug!("Creating custom storage '{}' for {}", class, spec.file);
            return factory(spec, &context).map(Some);
        }

        let storage = match &spec.splitter {
            Some(splitter) => {
                debug!("Creating directory storage {} ({})", path.display(), splitter.name());
                share(
                    DirectoryBasedStorage::new(path, splitter.clone(), self.provider.clone(), self.macros.clone())
                        .with_line_separator(self.line_separator.clone()),
                )
            }
            None => {
                debug!("Creating file storage {}", path.display());
                share(
                    FileBasedStorage::new(path, self.root_name.clone(), self.provider.clone(), self.macros.clone())
                        .with_line_separator(self.line_separator.clone()),
                )
            }
        };
        Ok(Some(storage))
    }

    /// Register a custom backend, selected by specs naming `class`
    pub fn register_storage_class<F>(&self, class: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&StorageSpec, &StorageContext) -> Result<SharedStorage> + Send + Sync + 'static,
    {
        let mut classes = self
            .storage_classes
            .write()
            .map_err(|_| StorageSystemError::LockPoisoned("storage class registry".to_string()))?;
        classes.insert(class.into(), Arc::new(factory));
        Ok(())
    }

    /// Bind a macro. Cached storages whose template uses it are dropped.
    pub fn add_macro(&self, name: &str, expansion: &str) -> Result<()> {
        let changed = {
            let mut macros = write_macros(&self.macros)?;
            let previous = macros.add_macro(name, expansion);
            previous.as_deref() != macros.get(name)
        };
        if changed {
            self.invalidate_macro(&normalize_name(name))?;
        }
        Ok(())
    }

    pub fn remove_macro(&self, name: &str) -> Result<()> {
        let removed = write_macros(&self.macros)?.remove_macro(name).is_some();
        if removed {
            self.invalidate_macro(&normalize_name(name))?;
        }
        Ok(())
    }

    fn invalidate_macro(&self, token: &str) -> Result<()> {
        let mut cache = self.lock_cache()?;
        cache.retain(|key, entry| {
            let uses_macro = entry.template.contains(token);
            if uses_macro {
                debug!("Dropping cached storage '{}' after {} changed", key, token);
            }
            !uses_macro
        });
        Ok(())
    }

    /// Expand a template, failing on unresolved macros
    pub fn expand_macros(&self, template: &str) -> Result<String> {
        read_macros(&self.macros)?.expand(template).map_err(|unresolved| {
            StorageSystemError::PathResolutionFailed {
                template: template.to_string(),
                unresolved,
            }
            .into()
        })
    }

    pub fn collapse_macros(&self, path: &str) -> Result<String> {
        Ok(read_macros(&self.macros)?.collapse(path))
    }

    /// Known macros referenced by `template`
    pub fn used_macros(&self, template: &str) -> Result<BTreeSet<String>> {
        Ok(read_macros(&self.macros)?.used_macros(template))
    }

    /// Drop one cached resolution; true if there was one
    pub fn clear_cached_storage(&self, key: &str) -> Result<bool> {
        Ok(self.lock_cache()?.remove(key).is_some())
    }

    /// Snapshot of every successfully resolved storage, by cache key
    pub fn cached_storages(&self) -> Result<Vec<(String, SharedStorage)>> {
        let cache = self.lock_cache()?;
        let mut storages: Vec<(String, SharedStorage)> = cache
            .iter()
            .filter_map(|(key, entry)| entry.storage.clone().map(|storage| (key.clone(), storage)))
            .collect();
        storages.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(storages)
    }

    /// Cached storage owning `path`
    pub fn storage_for_file(&self, path: &Path) -> Result<Option<SharedStorage>> {
        for (_, storage) in self.cached_storages()? {
            let owns = lock_storage(&storage)?.list_files()?.iter().any(|file| file == path);
            if owns {
                return Ok(Some(storage));
            }
        }
        Ok(None)
    }

    /// Every file owned by a resolved storage
    pub fn list_all_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = BTreeSet::new();
        for (_, storage) in self.cached_storages()? {
            files.extend(lock_storage(&storage)?.list_files()?);
        }
        Ok(files.into_iter().collect())
    }

    /// Make every cached storage re-read the disk on next access
    pub fn reload_storages(&self) -> Result<()> {
        for (key, storage) in self.cached_storages()? {
            debug!("Reloading storage '{}'", key);
            lock_storage(&storage)?.reload();
        }
        Ok(())
    }

    /// Open the single externalization session of this manager.
    ///
    /// Fails with [`StorageSystemError::SessionInProgress`] while another
    /// session (or the save session it turned into) is alive.
    pub fn start_externalization(&self) -> Result<ExternalizationSession<'_>> {
        ExternalizationSession::open(self)
    }
}

impl fmt::Debug for StateStorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.cache.lock().map(|cache| cache.len()).unwrap_or_default();
        f.debug_struct("StateStorageManager")
            .field("root_name", &self.root_name)
            .field("provider", &self.provider.name())
            .field("cached_storages", &cached)
            .field("old_storage_spec", &self.old_storage_spec)
            .finish()
    }
}

