//! Element tree shared by every storage backend, plus the reader/writer that
//! maps it to storage file bytes.
pub mod codec;
pub mod element;
pub mod error;

/// Re-export key types
pub use codec::{parse, to_bytes};
pub use element::Element;
pub use error::XmlError;
