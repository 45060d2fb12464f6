//! Serde-backed state serializer.
//!
//! Element grammar, with `holder` being any of `state`, `option`, `item`:
//!
//! ```text
//! <state>                              object at the root: options inline
//!   <option name="font" value="Mono" /> scalar field
//!   <option name="window">              nested object
//!     <object>
//!       <option name="width" value="800" />
//!     </object>
//!   </option>
//!   <option name="recent">              sequence
//!     <list>
//!       <item value="a.txt" />
//!     </list>
//!   </option>
//! </state>
//! ```
//!
//! `null` fields are omitted, except in a diff against a default whose
//! value is not `null`: there a bare `<option name="x" />` records that the
//! field was cleared. Scalars are text, so decoding goes through a lenient
//! deserializer that parses numbers and booleans on demand.
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::serialization::error::SerializationError;
use crate::serialization::lenient::LenientValue;
use crate::xml::Element;

pub const STATE_TAG: &str = "state";
pub const OPTION_TAG: &str = "option";
pub const OBJECT_TAG: &str = "object";
pub const LIST_TAG: &str = "list";
pub const ITEM_TAG: &str = "item";
pub const NAME_ATTR: &str = "name";
pub const VALUE_ATTR: &str = "value";

/// Converts serde values to and from state elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSerializer;

impl XmlSerializer {
    pub fn serialize<T: Serialize + ?Sized>(state: &T) -> Result<Element, SerializationError> {
        let value = serde_json::to_value(state).map_err(SerializationError::Encode)?;
        Ok(value_to_state(&value, false))
    }

    /// Serialize only the fields of `state` that differ from `default`.
    ///
    /// Nested objects are diffed recursively; sequences and scalars are
    /// written whole when they differ.
    pub fn serialize_diff<T: Serialize + ?Sized>(state: &T, default: &T) -> Result<Element, SerializationError> {
        let value = serde_json::to_value(state).map_err(SerializationError::Encode)?;
        let base = serde_json::to_value(default).map_err(SerializationError::Encode)?;
        Ok(value_to_state(&diff_values(value, &base), true))
    }

    pub fn deserialize<T: DeserializeOwned>(element: &Element) -> Result<T, SerializationError> {
        let value = state_to_value(element)?;
        T::deserialize(LenientValue(value)).map_err(|source| SerializationError::Decode {
            element: element.name().to_string(),
            source,
        })
    }

    /// Lay `element` over the current value of `target`.
    ///
    /// Fields the element does not mention keep their current value, which
    /// is what lets a component load a partial (non-default-only) state on
    /// top of its defaults.
    pub fn deserialize_into<T>(element: &Element, target: &mut T) -> Result<(), SerializationError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut base = serde_json::to_value(&*target).map_err(SerializationError::Encode)?;
        merge_values(&mut base, state_to_value(element)?);
        *target = T::deserialize(LenientValue(base)).map_err(|source| SerializationError::Decode {
            element: element.name().to_string(),
            source,
        })?;
        Ok(())
    }
}

/// With `keep_nulls`, `null` fields are written as bare options
fn value_to_state(value: &Value, keep_nulls: bool) -> Element {
    let mut root = Element::new(STATE_TAG);
    match value {
        Value::Object(map) => append_options(&mut root, map, keep_nulls),
        other => write_holder(&mut root, other, keep_nulls),
    }
    root
}

fn append_options(parent: &mut Element, map: &Map<String, Value>, keep_nulls: bool) {
    for (key, value) in map {
        if value.is_null() && !keep_nulls {
            continue;
        }
        let mut option = Element::new(OPTION_TAG).with_attribute(NAME_ATTR, key.as_str());
        write_holder(&mut option, value, keep_nulls);
        parent.add_child(option);
    }
}

fn write_holder(holder: &mut Element, value: &Value, keep_nulls: bool) {
    match value {
        Value::Null => {}
        Value::Bool(b) => holder.set_attribute(VALUE_ATTR, b.to_string()),
        Value::Number(n) => holder.set_attribute(VALUE_ATTR, n.to_string()),
        Value::String(s) => holder.set_attribute(VALUE_ATTR, s.as_str()),
        Value::Array(items) => {
            let mut list = Element::new(LIST_TAG);
            for item in items {
                let mut item_element = Element::new(ITEM_TAG);
                write_holder(&mut item_element, item, keep_nulls);
                list.add_child(item_element);
            }
            holder.add_child(list);
        }
        Value::Object(map) => {
            let mut object = Element::new(OBJECT_TAG);
            append_options(&mut object, map, keep_nulls);
            holder.add_child(object);
        }
    }
}

/// Decode a root element. Attributes other than `value` (such as the
/// `name` of a component fragment) are ignored.
fn state_to_value(element: &Element) -> Result<Value, SerializationError> {
    let path = element.name().to_string();
    let is_list_root = matches!(element.children(), [only] if only.name() == LIST_TAG);
    if element.attribute(VALUE_ATTR).is_some() || is_list_root {
        read_holder(element, &path)
    } else {
        read_options(element, &path)
    }
}

fn read_options(parent: &Element, path: &str) -> Result<Value, SerializationError> {
    let mut map = Map::new();
    for child in parent.children() {
        if child.name() != OPTION_TAG {
            return Err(SerializationError::shape(
                path,
                format!("expected <{OPTION_TAG}>, found <{}>", child.name()),
            ));
        }
        let name = child.attribute(NAME_ATTR).ok_or_else(|| {
            SerializationError::shape(path, format!("<{OPTION_TAG}> without a '{NAME_ATTR}' attribute"))
        })?;
        let value = read_holder(child, &format!("{path}/{name}"))?;
        map.insert(name.to_string(), value);
    }
    Ok(Value::Object(map))
}

fn read_holder(holder: &Element, path: &str) -> Result<Value, SerializationError> {
    match (holder.attribute(VALUE_ATTR), holder.children()) {
        (Some(value), []) => Ok(Value::String(value.to_string())),
        (Some(_), _) => Err(SerializationError::shape(
            path,
            "a value attribute and child elements cannot be combined",
        )),
        (None, []) => Ok(Value::Null),
        (None, [child]) => match child.name() {
            OBJECT_TAG => read_options(child, path),
            LIST_TAG => read_list(child, path),
            other => Err(SerializationError::shape(
                path,
                format!("expected <{OBJECT_TAG}> or <{LIST_TAG}>, found <{other}>"),
            )),
        },
        (None, _) => Err(SerializationError::shape(
            path,
            format!("expected a single <{OBJECT_TAG}> or <{LIST_TAG}> child"),
        )),
    }
}

fn read_list(list: &Element, path: &str) -> Result<Value, SerializationError> {
    let items = list
        .children()
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let item_path = format!("{path}[{index}]");
            if item.name() != ITEM_TAG {
                return Err(SerializationError::shape(
                    &item_path,
                    format!("expected <{ITEM_TAG}>, found <{}>", item.name()),
                ));
            }
            read_holder(item, &item_path)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(items))
}

/// A `null` field in the overlay clears the base field; a `null` overlay
/// as a whole changes nothing
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if !value.is_null() => merge_values(existing, value),
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn diff_values(value: Value, base: &Value) -> Value {
    match (value, base) {
        (Value::Object(map), Value::Object(base_map)) => {
            let mut out = Map::new();
            for (key, field) in map {
                match base_map.get(&key) {
                    Some(default) if *default == field => {}
                    None if field.is_null() => {}
                    Some(default) if default.is_object() && field.is_object() => {
                        out.insert(key, diff_values(field, default));
                    }
                    _ => {
                        out.insert(key, field);
                    }
                }
            }
            Value::Object(out)
        }
        (value, _) => value,
    }
}
