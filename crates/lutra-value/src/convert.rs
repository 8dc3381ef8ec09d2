//! Marshalling between [`Value`] trees and JSON.
//!
//! `from_json` is total: every JSON document has a value form. `to_json` is
//! the one genuinely fallible surface in the value layer — symbols and
//! non-finite numbers have no JSON form, and cyclic structures are detected
//! rather than recursed into. Proxies serialize through their raw container
//! and cells through their boxed value, so a virtualized tree and its raw
//! counterpart produce the same document.

use thiserror::Error;

use crate::object::{ObjectKind, PropertyKey, RawObject};
use crate::value::Value;

/// Marshalling failures.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// `NaN` and infinities have no JSON representation.
    #[error("non-finite number {0} has no JSON representation")]
    NonFiniteNumber(f64),

    /// Symbols have no JSON representation.
    #[error("symbol values have no JSON representation")]
    Symbol,

    /// Map and set containers have no canonical JSON representation.
    #[error("{0:?} containers have no JSON representation")]
    Collection(ObjectKind),

    /// The value graph contains a cycle.
    #[error("cyclic structure cannot be converted to JSON")]
    Cycle,
}

/// Build a value tree from a JSON document. Objects become plain containers
/// with string keys, arrays become sequences.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if let Ok(i) = i32::try_from(i) {
                    return Value::Int(i);
                }
            }
            Value::number(n.as_f64().unwrap_or(f64::NAN))
        }
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => {
            Value::Object(RawObject::sequence_from(items.iter().map(from_json)))
        }
        serde_json::Value::Object(map) => {
            let obj = RawObject::new_object();
            for (key, value) in map {
                obj.define_data(PropertyKey::string(key), from_json(value));
            }
            Value::Object(obj)
        }
    }
}

/// Serialize a value tree to JSON. Undefined serializes as `null`.
pub fn to_json(value: &Value) -> Result<serde_json::Value, ConvertError> {
    let mut visiting = Vec::new();
    to_json_inner(value, &mut visiting)
}

fn to_json_inner(
    value: &Value,
    visiting: &mut Vec<usize>,
) -> Result<serde_json::Value, ConvertError> {
    match value {
        Value::Undefined | Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Int(n) => Ok(serde_json::Value::from(*n)),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or(ConvertError::NonFiniteNumber(*n)),
        Value::String(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::Symbol(_) => Err(ConvertError::Symbol),
        Value::Cell(c) => to_json_inner(&c.get(), visiting),
        Value::Proxy(p) => to_json_inner(&Value::Object(p.raw()), visiting),
        Value::Object(obj) => object_to_json(obj, visiting),
    }
}

fn object_to_json(
    obj: &RawObject,
    visiting: &mut Vec<usize>,
) -> Result<serde_json::Value, ConvertError> {
    let id = obj.ptr_id();
    if visiting.contains(&id) {
        return Err(ConvertError::Cycle);
    }
    visiting.push(id);

    let result = match obj.kind() {
        ObjectKind::Sequence => {
            let mut items = Vec::with_capacity(obj.seq_len());
            for element in obj.elements_snapshot() {
                items.push(to_json_inner(&element, visiting)?);
            }
            Ok(serde_json::Value::Array(items))
        }
        ObjectKind::Plain => {
            let mut map = serde_json::Map::new();
            for key in obj.own_keys() {
                let entry = obj.plain_get(&key);
                map.insert(key.to_string(), to_json_inner(&entry, visiting)?);
            }
            Ok(serde_json::Value::Object(map))
        }
        kind @ (ObjectKind::Map | ObjectKind::Set) => Err(ConvertError::Collection(kind)),
    };

    visiting.pop();
    result
}
