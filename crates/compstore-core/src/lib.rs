//! # Compstore Core
//!
//! Persistence engine for named component states. Components hand their
//! state to a [`store::ComponentStore`], which resolves storage specs through
//! the [`storage::StateStorageManager`] (macro expansion, one storage per
//! template), buffers writes in an externalization session and only touches
//! files whose serialized bytes actually changed.
pub mod engine;
pub mod serialization;
pub mod storage;
pub mod store;
pub mod xml;

// Re-export key public types/traits for easier use by embedding applications
pub use engine::config::{ConfigFormat, EngineConfig};
pub use engine::error::{Error, OperationFailure, Result};
pub use serialization::{SerdeState, StateValue, XmlSerializer};
pub use storage::{
    DirectoryBasedStorage, FileBasedStorage, LocalStorageProvider, MacroTable, SaveOutcome,
    StateSplitter, StateStorage, StateStorageManager, StorageProvider, StorageSpec,
};
pub use store::{
    ComponentStore, PersistentStateComponent, ProjectStore, ScopePolicy, SerdeComponent,
};
pub use xml::Element;

#[cfg(test)]
mod tests;
