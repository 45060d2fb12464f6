pub mod directory_based;
pub mod error;
pub mod file_based;
pub mod local;
pub mod macros;
pub mod manager;
pub mod provider;
pub mod session;
pub mod spec;
pub mod splitter;
pub mod state_storage;

/// Re-export key types
pub use directory_based::DirectoryBasedStorage;
pub use error::StorageSystemError;
pub use file_based::FileBasedStorage;
pub use local::LocalStorageProvider;
pub use macros::MacroTable;
pub use manager::{StateStorageManager, StorageContext, StorageFactory};
pub use provider::StorageProvider;
pub use session::{ExternalizationSession, SaveOutcome, SaveSession};
pub use spec::StorageSpec;
pub use splitter::{ChildNameSplitter, SingleFileSplitter, StateSplitter};
pub use state_storage::{SharedStorage, StateStorage};

// Test module declaration
#[cfg(test)]
mod tests;
