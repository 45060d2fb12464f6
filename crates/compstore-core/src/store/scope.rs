use std::fmt::Debug;

use crate::engine::constants::{
    APPLICATION_ROOT, DEFAULT_APP_STORAGE, MODULE_FILE_MACRO, MODULE_ROOT, PROJECT_CONFIG_DIR_MACRO,
    PROJECT_FILE_MACRO, PROJECT_ROOT,
};
use crate::storage::spec::StorageSpec;

/// What distinguishes the application, project and module stores.
pub trait ScopePolicy: Send + Sync + Debug {
    /// Root tag of this scope's file-based storages
    fn root_name(&self) -> &str;

    /// Storage for components that declare no specs; also carries the format version
    fn default_storage(&self) -> StorageSpec;

    /// Combined file consulted when a component's own storage has no entry
    fn legacy_storage(&self) -> Option<StorageSpec>;

    /// Whether load validates the on-disk format version
    fn is_version_gated(&self) -> bool;

    /// Whether stores of this scope own subordinate stores
    fn has_sub_scopes(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationScope;

impl ScopePolicy for ApplicationScope {
    fn root_name(&self) -> &str {
        APPLICATION_ROOT
    }

    fn default_storage(&self) -> StorageSpec {
        StorageSpec::new(DEFAULT_APP_STORAGE)
    }

    fn legacy_storage(&self) -> Option<StorageSpec> {
        Some(StorageSpec::new(DEFAULT_APP_STORAGE))
    }

    fn is_version_gated(&self) -> bool {
        false
    }

    fn has_sub_scopes(&self) -> bool {
        false
    }
}

/// On-disk layout of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectFormat {
    /// Everything in the project file
    #[default]
    File,
    /// A configuration directory with one file per concern
    Directory,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectScope {
    format: ProjectFormat,
}

impl ProjectScope {
    pub fn new(format: ProjectFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ProjectFormat {
        self.format
    }
}

impl ScopePolicy for ProjectScope {
    fn root_name(&self) -> &str {
        PROJECT_ROOT
    }

    fn default_storage(&self) -> StorageSpec {
        match self.format {
            ProjectFormat::File => StorageSpec::new(PROJECT_FILE_MACRO),
            ProjectFormat::Directory => StorageSpec::new(format!("{PROJECT_CONFIG_DIR_MACRO}/misc.xml")),
        }
    }

    fn legacy_storage(&self) -> Option<StorageSpec> {
        Some(StorageSpec::new(PROJECT_FILE_MACRO))
    }

    fn is_version_gated(&self) -> bool {
        true
    }

    fn has_sub_scopes(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleScope;

impl ScopePolicy for ModuleScope {
    fn root_name(&self) -> &str {
        MODULE_ROOT
    }

    fn default_storage(&self) -> StorageSpec {
        StorageSpec::new(MODULE_FILE_MACRO)
    }

    fn legacy_storage(&self) -> Option<StorageSpec> {
        Some(StorageSpec::new(MODULE_FILE_MACRO))
    }

    fn is_version_gated(&self) -> bool {
        true
    }

    fn has_sub_scopes(&self) -> bool {
        false
    }
}
