use std::cmp::Ordering;

/// One node of a storage document.
///
/// Attributes keep insertion order and unique keys; children keep insertion
/// order. A tree has exactly one owner at a time: moving a fragment between a
/// storage root and a caller goes through [`Element::detach_child`] or
/// [`Element::take_children`], never through shared references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Set an attribute. An existing key keeps its position.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Element> {
        &mut self.children
    }

    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// First child with the given tag
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn position_of_child<F>(&self, predicate: F) -> Option<usize>
    where
        F: FnMut(&Element) -> bool,
    {
        self.children.iter().position(predicate)
    }

    /// Move the child at `index` out of this tree.
    ///
    /// Panics if `index` is out of bounds, like `Vec::remove`.
    pub fn detach_child(&mut self, index: usize) -> Element {
        self.children.remove(index)
    }

    /// Remove every child matching `predicate`, returning them in order
    pub fn remove_children_where<F>(&mut self, mut predicate: F) -> Vec<Element>
    where
        F: FnMut(&Element) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            if predicate(&child) {
                removed.push(child);
            } else {
                kept.push(child);
            }
        }
        self.children = kept;
        removed
    }

    pub fn take_children(&mut self) -> Vec<Element> {
        std::mem::take(&mut self.children)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn take_text(&mut self) -> Option<String> {
        self.text.take()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// No attributes, no children and no text
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.children.is_empty()
            && self.text.as_deref().is_none_or(str::is_empty)
    }

    /// Stable sort of the direct children
    pub fn sort_children_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Element, &Element) -> Ordering,
    {
        self.children.sort_by(compare);
    }

    /// Visit every attribute value and text node of this subtree.
    pub fn for_each_string(&self, visit: &mut dyn FnMut(&str)) {
        for (_, value) in &self.attributes {
            visit(value);
        }
        if let Some(text) = &self.text {
            visit(text);
        }
        for child in &self.children {
            child.for_each_string(visit);
        }
    }

    /// Rewrite every attribute value and text node of this subtree in place.
    pub fn for_each_string_mut(&mut self, visit: &mut dyn FnMut(&mut String)) {
        for (_, value) in &mut self.attributes {
            visit(value);
        }
        if let Some(text) = &mut self.text {
            visit(text);
        }
        for child in &mut self.children {
            child.for_each_string_mut(visit);
        }
    }
}
