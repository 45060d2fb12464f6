use std::sync::{Arc, Mutex};

use crate::serialization::error::SerializationError;
use crate::serialization::serializer::XmlSerializer;
use crate::serialization::{SerdeState, StateValue};
use crate::storage::spec::StorageSpec;
use crate::xml::element::Element;

/// Owner of one named piece of persisted state.
pub trait PersistentStateComponent: Send {
    /// Registration key; unique within a store
    fn component_name(&self) -> &str;

    /// Candidate storages in preference order; empty selects the scope default
    fn storages(&self) -> Vec<StorageSpec> {
        Vec::new()
    }

    /// Current state, or `None` when nothing needs persisting
    fn get_state(&self) -> Result<Option<Element>, SerializationError>;

    /// Apply a loaded state
    fn load_state(&mut self, state: Element) -> Result<(), SerializationError>;

    /// Called when no storage held a state for this component
    fn no_state_loaded(&mut self) {}

    /// Optional dirty tracking; an unchanged count lets the store skip `get_state`
    fn modification_count(&self) -> Option<u64> {
        None
    }
}

pub type SharedComponent = Arc<Mutex<dyn PersistentStateComponent>>;

/// Component whose state is a serde value merged onto a default.
///
/// Only fields that differ from the default are written.
#[derive(Debug, Clone)]
pub struct SerdeComponent<T> {
    name: String,
    storages: Vec<StorageSpec>,
    default: T,
    state: T,
    modifications: u64,
}

impl<T> SerdeComponent<T>
where
    T: SerdeState + Default + Clone + Send,
{
    pub fn new(name: impl Into<String>, storages: Vec<StorageSpec>) -> Self {
        Self::with_default(name, storages, T::default())
    }

    pub fn with_default(name: impl Into<String>, storages: Vec<StorageSpec>, default: T) -> Self {
        Self {
            name: name.into(),
            storages,
            state: default.clone(),
            default,
            modifications: 0,
        }
    }

    pub fn state(&self) -> &T {
        &self.state
    }

    pub fn set_state(&mut self, state: T) {
        self.state = state;
        self.modifications += 1;
    }

    pub fn update<F>(&mut self, change: F)
    where
        F: FnOnce(&mut T),
    {
        change(&mut self.state);
        self.modifications += 1;
    }

    pub fn into_shared(self) -> Arc<Mutex<Self>>
    where
        T: 'static,
    {
        Arc::new(Mutex::new(self))
    }
}

impl<T> PersistentStateComponent for SerdeComponent<T>
where
    T: SerdeState + Default + Clone + Send,
{
    fn component_name(&self) -> &str {
        &self.name
    }

    fn storages(&self) -> Vec<StorageSpec> {
        self.storages.clone()
    }

    fn get_state(&self) -> Result<Option<Element>, SerializationError> {
        let element = XmlSerializer::serialize_diff(&self.state, &self.default)?;
        Ok((!element.is_empty()).then_some(element))
    }

    fn load_state(&mut self, state: Element) -> Result<(), SerializationError> {
        self.state = T::deserialize_state(&state, Some(self.default.clone()))
            .map_err(|e| SerializationError::component(&self.name, e.to_string()))?;
        Ok(())
    }

    fn no_state_loaded(&mut self) {
        self.state = self.default.clone();
    }

    fn modification_count(&self) -> Option<u64> {
        Some(self.modifications)
    }
}

/// Component holding a raw element tree
#[derive(Debug, Clone)]
pub struct ElementComponent {
    name: String,
    storages: Vec<StorageSpec>,
    state: Option<Element>,
}

impl ElementComponent {
    pub fn new(name: impl Into<String>, storages: Vec<StorageSpec>) -> Self {
        Self {
            name: name.into(),
            storages,
            state: None,
        }
    }

    pub fn state(&self) -> Option<&Element> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: Option<Element>) {
        self.state = state;
    }
}

impl PersistentStateComponent for ElementComponent {
    fn component_name(&self) -> &str {
        &self.name
    }

    fn storages(&self) -> Vec<StorageSpec> {
        self.storages.clone()
    }

    fn get_state(&self) -> Result<Option<Element>, SerializationError> {
        self.state.as_ref().map(Element::serialize_state).transpose()
    }

    fn load_state(&mut self, state: Element) -> Result<(), SerializationError> {
        self.state = Some(Element::deserialize_state(&state, None)?);
        Ok(())
    }

    fn no_state_loaded(&mut self) {
        self.state = None;
    }
}
