use std::str::Utf8Error;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    /// Input held no markup at all; callers treat this like a missing file
    #[error("document is empty")]
    Empty,

    #[error("malformed XML near byte {position}: {source}")]
    Malformed {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("document has no root element")]
    NoRoot,

    #[error("unexpected content after the root element near byte {0}")]
    TrailingContent(usize),

    #[error("element <{0}> was never closed")]
    Unclosed(String),

    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] Utf8Error),
}
