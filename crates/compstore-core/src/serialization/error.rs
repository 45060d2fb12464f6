use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    /// The element tree cannot represent the target type at `path`
    #[error("state at '{path}' has an unexpected shape: {message}")]
    ShapeMismatch { path: String, message: String },

    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode state from <{element}>: {source}")]
    Decode {
        element: String,
        #[source]
        source: serde_json::Error,
    },

    /// A hand-written component rejected its state
    #[error("component '{component}' rejected its state: {message}")]
    Component { component: String, message: String },
}

impl SerializationError {
    pub fn shape(path: impl Into<String>, message: impl Into<String>) -> Self {
        SerializationError::ShapeMismatch {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        SerializationError::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}
