//! Scope orchestration: component registration, load with version-gated
//! migration, and save cycles over a [`StateStorageManager`](crate::storage::StateStorageManager).
pub mod collaborators;
pub mod component;
pub mod component_store;
pub mod error;
pub mod project;
pub mod scope;

/// Re-export key types
pub use collaborators::{
    AcceptMigration, ClearReadonlyFlag, DeclineMigration, MigrationHandler, ReadonlyStatusHandler,
    ReportReadonly,
};
pub use component::{ElementComponent, PersistentStateComponent, SerdeComponent, SharedComponent};
pub use component_store::{ComponentStore, StoreState};
pub use error::StoreError;
pub use project::ProjectStore;
pub use scope::{ApplicationScope, ModuleScope, ProjectFormat, ProjectScope, ScopePolicy};

// Test module declaration
#[cfg(test)]
mod tests;
