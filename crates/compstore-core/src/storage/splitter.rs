//! Strategies mapping one component state onto several files of a
//! [`DirectoryBasedStorage`](crate::storage::DirectoryBasedStorage).
use std::collections::HashSet;
use std::fmt::Debug;

use crate::engine::constants::{NAME_ATTR, STATE_FILE_EXTENSION};
use crate::engine::error::Result;
use crate::storage::error::StorageSystemError;
use crate::xml::element::Element;

/// Splits a state into per-file fragments and merges them back.
pub trait StateSplitter: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Break `state` into `(fragment, file name)` pairs. An empty list is
    /// legal and leaves no files for the component.
    fn split(&self, state: Element) -> Result<Vec<(Element, String)>>;

    /// Rebuild a state into `target` from fragments ordered by file name.
    fn merge(&self, target: &mut Element, fragments: Vec<Element>) -> Result<()>;
}

/// One file per direct child, named after one of its attributes.
#[derive(Debug, Clone)]
pub struct ChildNameSplitter {
    attribute: String,
}

impl ChildNameSplitter {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl StateSplitter for ChildNameSplitter {
    fn name(&self) -> &str {
        "child-name"
    }

    /// Only the children are persisted, so a root carrying attributes
    /// (other than the component `name`) or text is refused.
    fn split(&self, mut state: Element) -> Result<Vec<(Element, String)>> {
        if let Some((key, _)) = state.attributes().find(|(key, _)| *key != NAME_ATTR) {
            return Err(StorageSystemError::splitter(
                self.name(),
                format!("root attribute '{key}' of <{}> cannot be split into files", state.name()),
            )
            .into());
        }
        if state.text().is_some_and(|text| !text.trim().is_empty()) {
            return Err(StorageSystemError::splitter(
                self.name(),
                format!("text of <{}> cannot be split into files", state.name()),
            )
            .into());
        }

        let mut used = HashSet::new();
        let mut result = Vec::new();

        for child in state.take_children() {
            let stem = sanitize_file_name(child.attribute(&self.attribute).unwrap_or(child.name()));
            let mut file_name = format!("{stem}.{STATE_FILE_EXTENSION}");
            let mut counter = 2;
            while !used.insert(file_name.to_lowercase()) {
                file_name = format!("{stem}_{counter}.{STATE_FILE_EXTENSION}");
                counter += 1;
            }
            result.push((child, file_name));
        }

        Ok(result)
    }

    fn merge(&self, target: &mut Element, fragments: Vec<Element>) -> Result<()> {
        for fragment in fragments {
            target.add_child(fragment);
        }
        Ok(())
    }
}

/// The whole state in one file with a fixed name.
#[derive(Debug, Clone)]
pub struct SingleFileSplitter {
    file_name: String,
}

impl SingleFileSplitter {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl StateSplitter for SingleFileSplitter {
    fn name(&self) -> &str {
        "single-file"
    }

    fn split(&self, state: Element) -> Result<Vec<(Element, String)>> {
        if state.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![(state, self.file_name.clone())])
    }

    fn merge(&self, target: &mut Element, fragments: Vec<Element>) -> Result<()> {
        let mut fragments = fragments.into_iter();
        let Some(mut state) = fragments.next() else {
            return Ok(());
        };
        if fragments.next().is_some() {
            return Err(StorageSystemError::splitter(
                self.name(),
                format!("expected a single file named '{}'", self.file_name),
            )
            .into());
        }

        for (key, value) in state.attributes() {
            if target.attribute(key).is_none() {
                target.set_attribute(key, value);
            }
        }
        if let Some(text) = state.take_text() {
            target.set_text(text);
        }
        for child in state.take_children() {
            target.add_child(child);
        }
        Ok(())
    }
}

/// Replace characters that are unsafe in file names; never yields an empty name.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized.to_string()
    }
}
