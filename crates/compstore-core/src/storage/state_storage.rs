use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::constants::{COMPONENT_TAG, NAME_ATTR};
use crate::engine::error::Result;
use crate::storage::error::StorageSystemError;
use crate::xml::element::Element;

/// Contract shared by every storage backend.
///
/// `get_element` consumes: a component claims its fragment exactly once per
/// load cycle, and a second call without an intervening `set_element`
/// returns `None`.
pub trait StateStorage: Send + Debug {
    /// Expanded location this storage was created for
    fn file_spec(&self) -> &str;

    /// Detach and return the fragment stored for `component`
    fn get_element(&mut self, component: &str) -> Result<Option<Element>>;

    /// Non-consuming presence check
    fn has_element(&mut self, component: &str) -> Result<bool>;

    /// Replace the fragment stored for `component`
    fn set_element(&mut self, component: &str, state: Element) -> Result<()>;

    /// Drop the fragment stored for `component`; true if there was one
    fn remove_element(&mut self, component: &str) -> Result<bool>;

    /// Byte-exact comparison of the would-be output with the files on disk
    fn needs_save(&mut self) -> Result<bool>;

    /// Files `save` would write or delete, without touching anything
    fn files_to_write(&mut self) -> Result<Vec<PathBuf>>;

    /// Write what changed; returns the files actually written or deleted
    fn save(&mut self) -> Result<Vec<PathBuf>>;

    /// Files owned by this storage
    fn list_files(&mut self) -> Result<Vec<PathBuf>>;

    /// Forget in-memory state; the next access re-reads the disk
    fn reload(&mut self);

    /// Bookkeeping attribute on the storage root, for backends that have one
    fn root_attribute(&mut self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set_root_attribute(&mut self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }
}

/// Storage shared between the manager cache and open sessions
pub type SharedStorage = Arc<Mutex<dyn StateStorage>>;

pub fn share<S: StateStorage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

pub(crate) fn lock_storage(storage: &SharedStorage) -> Result<MutexGuard<'_, dyn StateStorage + 'static>> {
    storage
        .lock()
        .map_err(|_| StorageSystemError::LockPoisoned("state storage".to_string()).into())
}

/// Wrap a component state as a `<component name=...>` fragment
pub fn component_fragment(component: &str, mut state: Element) -> Element {
    let mut fragment = Element::new(COMPONENT_TAG).with_attribute(NAME_ATTR, component);
    for (key, value) in state.attributes() {
        if key != NAME_ATTR {
            fragment.set_attribute(key, value);
        }
    }
    if let Some(text) = state.take_text() {
        fragment.set_text(text);
    }
    for child in state.take_children() {
        fragment.add_child(child);
    }
    fragment
}

pub(crate) fn is_fragment_of(element: &Element, component: &str) -> bool {
    element.name() == COMPONENT_TAG && element.attribute(NAME_ATTR) == Some(component)
}
