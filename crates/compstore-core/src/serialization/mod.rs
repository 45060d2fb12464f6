//! Conversion between in-memory component state and [`Element`] trees.
//!
//! Storage backends only ever see elements. A state type either is an
//! `Element` already (identity) or opts into serde-backed conversion through
//! [`SerdeState`].
pub mod error;
mod lenient;
pub mod serializer;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::xml::Element;

/// Re-export key types
pub use error::SerializationError;
pub use serializer::XmlSerializer;

/// A value that can be stored as a component state.
pub trait StateValue: Sized {
    fn serialize_state(&self) -> Result<Element, SerializationError>;

    /// Build a value from `element`. With `merge_into`, the element is laid
    /// over that value and the result returned; otherwise a fresh value is
    /// constructed.
    fn deserialize_state(element: &Element, merge_into: Option<Self>) -> Result<Self, SerializationError>;
}

/// Marker for serde types persisted through [`XmlSerializer`].
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Default)]
/// struct EditorSettings { font_size: u32, theme: String }
///
/// impl SerdeState for EditorSettings {}
/// ```
pub trait SerdeState: Serialize + DeserializeOwned {}

/// Tree-shaped values pass through unchanged.
impl StateValue for Element {
    fn serialize_state(&self) -> Result<Element, SerializationError> {
        Ok(self.clone())
    }

    fn deserialize_state(element: &Element, _merge_into: Option<Self>) -> Result<Self, SerializationError> {
        Ok(element.clone())
    }
}

impl<T: SerdeState> StateValue for T {
    fn serialize_state(&self) -> Result<Element, SerializationError> {
        XmlSerializer::serialize(self)
    }

    fn deserialize_state(element: &Element, merge_into: Option<Self>) -> Result<Self, SerializationError> {
        match merge_into {
            Some(mut target) => {
                XmlSerializer::deserialize_into(element, &mut target)?;
                Ok(target)
            }
            None => XmlSerializer::deserialize(element),
        }
    }
}
