use std::collections::BTreeMap;

use log::{info, warn};

use crate::engine::error::{Error, OperationFailure, Result};
use crate::storage::session::SaveOutcome;
use crate::store::collaborators::{MigrationHandler, ReadonlyStatusHandler};
use crate::store::component_store::ComponentStore;
use crate::store::error::StoreError;
use crate::store::scope::{ModuleScope, ProjectScope, ScopePolicy};

/// A project store together with the stores of its modules.
///
/// Modules are saved before the project, so a failed project save can report
/// which module files were already written.
#[derive(Debug)]
pub struct ProjectStore {
    project: ComponentStore<ProjectScope>,
    modules: BTreeMap<String, ComponentStore<ModuleScope>>,
}

impl ProjectStore {
    pub fn new(project: ComponentStore<ProjectScope>) -> Self {
        Self {
            project,
            modules: BTreeMap::new(),
        }
    }

    pub fn project(&self) -> &ComponentStore<ProjectScope> {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut ComponentStore<ProjectScope> {
        &mut self.project
    }

    pub fn add_module(&mut self, name: impl Into<String>, module: ComponentStore<ModuleScope>) -> Result<()> {
        if !self.project.policy().has_sub_scopes() {
            return Err(Error::Other("project scope does not own module stores".to_string()));
        }
        let name = name.into();
        if self.modules.contains_key(&name) {
            return Err(Error::Other(format!("module '{name}' is already attached")));
        }
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn remove_module(&mut self, name: &str) -> Option<ComponentStore<ModuleScope>> {
        let mut module = self.modules.remove(name)?;
        module.dispose();
        Some(module)
    }

    pub fn module(&self, name: &str) -> Option<&ComponentStore<ModuleScope>> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ComponentStore<ModuleScope>> {
        self.modules.get_mut(name)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Load the project, then every module. Component failures are collected.
    pub fn load(&mut self, migration: &dyn MigrationHandler) -> Result<Vec<OperationFailure>> {
        let mut failures = self.project.load(migration)?;
        for (name, module) in self.modules.iter_mut() {
            for failure in module.load(migration)? {
                failures.push(OperationFailure::new(format!("{name}/{}", failure.target), failure.error));
            }
        }
        Ok(failures)
    }

    /// Save every module, then the project.
    ///
    /// A project save that aborts is reported as
    /// [`StoreError::ProjectSaveFailed`] carrying the module outcomes.
    pub fn save(&mut self, readonly: &dyn ReadonlyStatusHandler) -> Result<SaveOutcome> {
        let mut modules = SaveOutcome::default();
        for (name, module) in self.modules.iter_mut() {
            match module.save(readonly) {
                Ok(outcome) => modules.merge(outcome),
                Err(e) => {
                    warn!("Saving module '{}' failed: {}", name, e);
                    modules.errors.push(OperationFailure::new(name.clone(), e));
                }
            }
        }

        match self.project.save(readonly) {
            Ok(mut outcome) => {
                outcome.merge(modules);
                if !outcome.saved_files.is_empty() {
                    info!("Saved project with {} file(s) written", outcome.saved_files.len());
                }
                Ok(outcome)
            }
            Err(error) => Err(StoreError::ProjectSaveFailed {
                error: Box::new(error),
                modules,
            }
            .into()),
        }
    }

    pub fn dispose(&mut self) {
        for module in self.modules.values_mut() {
            module.dispose();
        }
        self.project.dispose();
    }
}
