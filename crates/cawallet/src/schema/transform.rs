//! Friendly-shape rewrites applied around protobuf JSON.
//!
//! Inputs: `aelf.Address` as a base58 string, `aelf.Hash` as hex, and map fields as
//! `[{key, value}]` arrays are rewritten into the canonical protobuf JSON shapes. Values that
//! don't fit a rule pass through untouched and are left for the decoder to accept or reject.
//!
//! Outputs get the reverse: addresses back to base58, hashes back to hex.

use crate::chain::address::{decode_address, encode_address};
use base64::Engine as _;
use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};
use serde_json::{json, Map, Value};

const ADDRESS: &str = "aelf.Address";
const HASH: &str = "aelf.Hash";

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

fn find_field(desc: &MessageDescriptor, key: &str) -> Option<FieldDescriptor> {
    desc.get_field_by_json_name(key)
        .or_else(|| desc.get_field_by_name(key))
}

pub fn shape_input(desc: &MessageDescriptor, v: Value) -> Value {
    match (desc.full_name(), &v) {
        (ADDRESS, Value::String(s)) => {
            return decode_address(s).map_or(v.clone(), |raw| json!({ "value": b64().encode(raw) }));
        }
        (HASH, Value::String(s)) => {
            let trimmed = s.trim().trim_start_matches("0x");
            return hex::decode(trimmed).map_or(v.clone(), |raw| json!({ "value": b64().encode(raw) }));
        }
        _ => {}
    }

    let Value::Object(map) = v else {
        return v;
    };
    map.into_iter()
        .map(|(k, fv)| match find_field(desc, &k) {
            Some(field) => {
                let shaped = shape_field_input(&field, fv);
                (k, shaped)
            }
            None => (k, fv),
        })
        .collect::<Map<_, _>>()
        .into()
}

fn map_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// `[{key, value}, ...]` -> `{key: value, ...}`; `None` if any element lacks a scalar key.
fn entries_to_object(items: &[Value]) -> Option<Map<String, Value>> {
    items
        .iter()
        .map(|item| {
            let key = map_key(item.get("key")?)?;
            let value = item.get("value").cloned().unwrap_or(Value::Null);
            Some((key, value))
        })
        .collect()
}

fn shape_field_input(field: &FieldDescriptor, v: Value) -> Value {
    if field.is_map() {
        let Kind::Message(entry) = field.kind() else {
            return v;
        };
        let value_kind = entry.map_entry_value_field().kind();
        let obj = match v {
            Value::Object(m) => m,
            Value::Array(items) => match entries_to_object(&items) {
                Some(m) => m,
                None => return Value::Array(items),
            },
            other => return other,
        };
        return obj
            .into_iter()
            .map(|(k, item)| (k, shape_kind_input(&value_kind, item)))
            .collect::<Map<_, _>>()
            .into();
    }
    if field.is_list() {
        return match v {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| shape_kind_input(&field.kind(), item))
                    .collect(),
            ),
            other => other,
        };
    }
    shape_kind_input(&field.kind(), v)
}

fn shape_kind_input(kind: &Kind, v: Value) -> Value {
    match kind {
        Kind::Message(m) => shape_input(m, v),
        _ => v,
    }
}

pub fn shape_output(desc: &MessageDescriptor, v: Value) -> Value {
    let raw_value = || {
        v.get("value")
            .and_then(Value::as_str)
            .and_then(|s| b64().decode(s).ok())
    };
    match desc.full_name() {
        ADDRESS => {
            return raw_value()
                .filter(|raw| !raw.is_empty())
                .map_or(v.clone(), |raw| Value::String(encode_address(&raw)));
        }
        HASH => {
            return raw_value().map_or(v.clone(), |raw| Value::String(hex::encode(raw)));
        }
        _ => {}
    }

    let Value::Object(map) = v else {
        return v;
    };
    map.into_iter()
        .map(|(k, fv)| match find_field(desc, &k) {
            Some(field) => {
                let shaped = shape_field_output(&field, fv);
                (k, shaped)
            }
            None => (k, fv),
        })
        .collect::<Map<_, _>>()
        .into()
}

fn shape_field_output(field: &FieldDescriptor, v: Value) -> Value {
    if field.is_map() {
        let Kind::Message(entry) = field.kind() else {
            return v;
        };
        let value_kind = entry.map_entry_value_field().kind();
        return match v {
            Value::Object(m) => m
                .into_iter()
                .map(|(k, item)| (k, shape_kind_output(&value_kind, item)))
                .collect::<Map<_, _>>()
                .into(),
            other => other,
        };
    }
    if field.is_list() {
        return match v {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| shape_kind_output(&field.kind(), item))
                    .collect(),
            ),
            other => other,
        };
    }
    shape_kind_output(&field.kind(), v)
}

fn shape_kind_output(kind: &Kind, v: Value) -> Value {
    match kind {
        Kind::Message(m) => shape_output(m, v),
        _ => v,
    }
}
