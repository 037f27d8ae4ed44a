//! JSON value helpers: owned copies and canonical serialization.
//!
//! Canonical serialization is what the memoize strategy keys its cache on, so
//! two structurally equal values must always produce the same string no matter
//! in which order their object keys were inserted.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Number, Value};

use crate::core::JobError;

/// Convert any serializable value into an owned JSON tree.
///
/// The value's `Serialize` implementation acts as its custom serialization
/// hook. The resulting tree shares nothing with the caller's data, so jobs can
/// never observe later mutations of the original input.
pub fn to_owned_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, JobError> {
    serde_json::to_value(value).map_err(JobError::from)
}

/// Serialize a value canonically. See [`canonical_json`].
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String, JobError> {
    Ok(canonical_json(&to_owned_value(value)?))
}

/// Compact JSON with object keys sorted lexicographically at every level.
///
/// Non-finite floats cannot be stored in a [`Value`]; serde already maps them
/// to `null` while building the tree.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // `Map` is already sorted unless serde_json's `preserve_order`
            // feature is enabled somewhere in the build.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

/// Integral numbers print as integers whether they were stored as `1` or
/// `1.0`; every other float uses its shortest round-trip form.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn write_number(n: &Number, out: &mut String) {
    if n.is_i64() || n.is_u64() {
        let _ = write!(out, "{n}");
        return;
    }
    let Some(f) = n.as_f64() else {
        let _ = write!(out, "{n}");
        return;
    };
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        let _ = write!(out, "{}", f as i64);
    } else if f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64 {
        let _ = write!(out, "{}", f as u64);
    } else {
        let _ = write!(out, "{f:?}");
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}
