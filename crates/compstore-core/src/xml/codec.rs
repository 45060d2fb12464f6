//! Reading and writing storage documents.
//!
//! The writer is hand-formatted rather than driven through a generic XML
//! writer: its output must be a pure function of the tree, because the
//! needs-save check compares bytes.
use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::xml::element::Element;
use crate::xml::error::XmlError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const INDENT: &str = "  ";

/// Parse a storage document into its root element.
///
/// Whitespace-only text is dropped. Text of a leaf element is kept verbatim;
/// text mixed with child elements loses its surrounding whitespace, which is
/// indentation. Comments, processing instructions and the XML declaration are
/// skipped.
pub fn parse(bytes: &[u8]) -> Result<Element, XmlError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)?;
    if text.trim().is_empty() {
        return Err(XmlError::Empty);
    }

    let mut reader = Reader::from_str(text);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(source) => return Err(XmlError::Malformed { position, source }),
        };

        match event {
            Event::Start(start) => {
                stack.push(start_element(&start, position)?);
            }
            Event::Empty(start) => {
                let element = start_element(&start, position)?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::End(_) => {
                // quick-xml already verified that the end tag matches
                if let Some(mut element) = stack.pop() {
                    settle_text(&mut element);
                    attach(&mut stack, &mut root, element, position)?;
                }
            }
            Event::Text(content) => {
                let content = content
                    .unescape()
                    .map_err(|source| XmlError::Malformed { position, source })?;
                if stack.is_empty() && content.trim().is_empty() {
                    continue;
                }
                append_text(&mut stack, &content, position)?;
            }
            Event::CData(content) => {
                let content = String::from_utf8_lossy(&content).into_owned();
                append_text(&mut stack, &content, position)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name().to_string()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn start_element(start: &BytesStart<'_>, position: usize) -> Result<Element, XmlError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| XmlError::Malformed {
            position,
            source: quick_xml::Error::from(e),
        })?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|source| XmlError::Malformed { position, source })?;
        element.set_attribute(key, value.into_owned());
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: usize,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.add_child(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::TrailingContent(position)),
    }
}

fn append_text(stack: &mut [Element], content: &str, position: usize) -> Result<(), XmlError> {
    if content.is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(parent) => {
            let mut text = parent.take_text().unwrap_or_default();
            text.push_str(content);
            parent.set_text(text);
            Ok(())
        }
        None => Err(XmlError::TrailingContent(position)),
    }
}

fn settle_text(element: &mut Element) {
    let Some(text) = element.take_text() else {
        return;
    };
    if text.trim().is_empty() {
        return;
    }
    if element.children().is_empty() {
        element.set_text(text);
    } else {
        element.set_text(text.trim());
    }
}

/// Serialize an element tree to bytes.
///
/// Two-space indentation, attributes in insertion order, childless and
/// textless elements written as `<tag />`, no trailing line separator.
pub fn to_bytes(element: &Element, line_separator: &str) -> Vec<u8> {
    let mut out = String::new();
    write_element(&mut out, element, 0, line_separator);
    out.into_bytes()
}

/// Serialize to a `String`, mostly useful for diagnostics and tests
pub fn to_string(element: &Element) -> String {
    let mut out = String::new();
    write_element(&mut out, element, 0, "\n");
    out
}

fn write_element(out: &mut String, element: &Element, depth: usize, line_separator: &str) {
    push_indent(out, depth);
    out.push('<');
    out.push_str(element.name());
    for (key, value) in element.attributes() {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attribute(value));
        out.push('"');
    }

    let text = element.text().filter(|t| !t.is_empty());
    if element.children().is_empty() && text.is_none() {
        out.push_str(" />");
        return;
    }

    out.push('>');
    if let Some(text) = text {
        out.push_str(&partial_escape(text));
    }
    if !element.children().is_empty() {
        for child in element.children() {
            out.push_str(line_separator);
            write_element(out, child, depth + 1, line_separator);
        }
        out.push_str(line_separator);
        push_indent(out, depth);
    }
    out.push_str("</");
    out.push_str(element.name());
    out.push('>');
}

fn escape_attribute(value: &str) -> Cow<'_, str> {
    escape(value)
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
