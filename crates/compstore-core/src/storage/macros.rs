//! # Macro Table
//!
//! Path virtualization for storage specs. A template such as
//! `$APP_CONFIG$/editor.xml` is expanded textually before a storage is
//! created; absolute paths written into storage content are collapsed back
//! to their macro form on save so files stay portable between machines.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::error::Result;
use crate::storage::error::StorageSystemError;
use crate::xml::element::Element;

/// Macro table shared by a manager and the storages it creates
pub type SharedMacros = Arc<RwLock<MacroTable>>;

pub(crate) fn read_macros(macros: &SharedMacros) -> Result<RwLockReadGuard<'_, MacroTable>> {
    macros
        .read()
        .map_err(|_| StorageSystemError::LockPoisoned("macro table".to_string()).into())
}

pub(crate) fn write_macros(macros: &SharedMacros) -> Result<RwLockWriteGuard<'_, MacroTable>> {
    macros
        .write()
        .map_err(|_| StorageSystemError::LockPoisoned("macro table".to_string()).into())
}

const DELIMITER: char = '$';

/// Mapping from `$NAME$` tokens to their expansions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    macros: BTreeMap<String, String>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, expansion)` pairs; names may omit the `$` delimiters
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut table = Self::new();
        for (name, expansion) in pairs {
            table.add_macro(name, expansion);
        }
        table
    }

    /// Bind (or rebind) a macro. Returns the previous expansion, if any.
    pub fn add_macro(&mut self, name: &str, expansion: &str) -> Option<String> {
        self.macros
            .insert(normalize_name(name), normalize_expansion(expansion))
    }

    pub fn remove_macro(&mut self, name: &str) -> Option<String> {
        self.macros.remove(&normalize_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.macros.get(&normalize_name(name)).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.macros.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Substitute every known token.
    ///
    /// Fails with the list of tokens that have no binding; a path with an
    /// unresolved macro must never reach a storage backend.
    pub fn expand(&self, template: &str) -> std::result::Result<String, Vec<String>> {
        let mut unresolved = Vec::new();
        let expanded = self.substitute(template, &mut |token| unresolved.push(token.to_string()));
        if unresolved.is_empty() {
            Ok(expanded)
        } else {
            unresolved.dedup();
            Err(unresolved)
        }
    }

    /// Substitute every known token, leaving unknown ones in place
    pub fn expand_lenient(&self, text: &str) -> String {
        self.substitute(text, &mut |_| {})
    }

    /// Rewrite absolute paths back to macro form.
    ///
    /// The longest expansion wins, and a match only counts when it ends at a
    /// path boundary, so `/home/me` does not collapse inside `/home/meg`.
    pub fn collapse(&self, text: &str) -> String {
        let mut candidates: Vec<(&str, &str)> = self
            .macros
            .iter()
            .filter(|(_, expansion)| !expansion.is_empty() && expansion.as_str() != "/")
            .map(|(name, expansion)| (name.as_str(), expansion.as_str()))
            .collect();
        if candidates.is_empty() {
            return text.to_string();
        }
        candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        let mut previous: Option<char> = None;

        'scan: while !rest.is_empty() {
            if previous.is_none_or(|c| !is_path_char(c)) {
                for (name, expansion) in &candidates {
                    if let Some(after) = rest.strip_prefix(expansion) {
                        let at_boundary = after
                            .chars()
                            .next()
                            .is_none_or(|c| c == '/' || c == '\\' || !is_path_char(c));
                        if at_boundary {
                            result.push_str(name);
                            previous = expansion.chars().last();
                            rest = after;
                            continue 'scan;
                        }
                    }
                }
            }

            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                result.push(c);
                previous = Some(c);
            }
            rest = chars.as_str();
        }

        result
    }

    /// Known macros referenced by `template`, in name order
    pub fn used_macros(&self, template: &str) -> BTreeSet<String> {
        tokens(template)
            .filter(|token| self.macros.contains_key(*token))
            .map(str::to_string)
            .collect()
    }

    /// Expand known macros in every attribute value and text node
    pub fn expand_element(&self, element: &mut Element) {
        if self.macros.is_empty() {
            return;
        }
        element.for_each_string_mut(&mut |value| {
            if value.contains(DELIMITER) {
                *value = self.expand_lenient(value);
            }
        });
    }

    /// Collapse absolute paths in every attribute value and text node
    pub fn collapse_element(&self, element: &mut Element) {
        if self.macros.is_empty() {
            return;
        }
        element.for_each_string_mut(&mut |value| {
            let collapsed = self.collapse(value);
            if collapsed != *value {
                *value = collapsed;
            }
        });
    }

    fn substitute(&self, text: &str, on_unknown: &mut dyn FnMut(&str)) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(DELIMITER) {
            result.push_str(&rest[..start]);
            let candidate = &rest[start..];
            match token_len(candidate) {
                Some(len) => {
                    let token = &candidate[..len];
                    match self.macros.get(token) {
                        Some(expansion) => result.push_str(expansion),
                        None => {
                            on_unknown(token);
                            result.push_str(token);
                        }
                    }
                    rest = &candidate[len..];
                }
                None => {
                    result.push(DELIMITER);
                    rest = &candidate[1..];
                }
            }
        }

        result.push_str(rest);
        result
    }
}

/// Length of the `$NAME$` token at the start of `text`, if there is one
fn token_len(text: &str) -> Option<usize> {
    let body = text.strip_prefix(DELIMITER)?;
    let end = body.find(DELIMITER)?;
    let name = &body[..end];
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(end + 2)
    } else {
        None
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        loop {
            let start = rest.find(DELIMITER)?;
            let candidate = &rest[start..];
            match token_len(candidate) {
                Some(len) => {
                    rest = &candidate[len..];
                    return Some(&candidate[..len]);
                }
                None => rest = &candidate[1..],
            }
        }
    })
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub(crate) fn normalize_name(name: &str) -> String {
    let bare = name.trim_matches(DELIMITER);
    format!("{DELIMITER}{bare}{DELIMITER}")
}

fn normalize_expansion(expansion: &str) -> String {
    let trimmed = expansion.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() && !expansion.is_empty() {
        // Keep a bare root as-is
        expansion[..1].to_string()
    } else {
        trimmed.to_string()
    }
}
