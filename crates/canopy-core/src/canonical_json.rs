//! Canonical JSON rendering for deterministic fingerprinting.
//!
//! A spec document is rendered to pretty-printed JSON with object keys
//! sorted lexicographically (UTF-8 byte order) before it is hashed. Two
//! submissions that differ only in formatting or key order therefore
//! produce the same fingerprint, which removes formatting noise as a
//! source of spurious change detection.
//!
//! Unlike identity-signing canonicalizations, floats are allowed: OpenAPI
//! documents legitimately carry numeric examples and bounds. `serde_json`
//! formats floats with the shortest round-trippable representation, which
//! is stable across runs of the same build.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

const INDENT: &str = "  ";

/// Errors that can occur during canonical JSON rendering.
#[derive(Debug, Error)]
pub enum CanonicalJsonError {
    /// Serde JSON conversion failed (e.g. a non-finite float).
    #[error("serde_json error: {0}")]
    Serde(#[from] serde_json::Error),

    /// IO error during writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 encoding error (should never happen with valid JSON).
    #[error("UTF-8 encoding error")]
    Utf8Error,
}

/// Renders `value` into canonical pretty-printed JSON bytes.
///
/// Canonical rendering has:
/// - Object keys sorted lexicographically (UTF-8 byte order)
/// - Two-space indentation, one member per line
/// - UTF-8 output with a trailing newline-free body
///
/// # Errors
///
/// Returns `CanonicalJsonError::Serde` if the value cannot be converted
/// to a JSON tree (e.g. NaN or infinite floats).
#[must_use = "canonical bytes should be used for hashing or artifact content"]
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    let v = serde_json::to_value(value)?;
    let mut out = Vec::<u8>::new();
    write_value(&v, &mut out, 0)?;
    Ok(out)
}

/// Same as [`to_canonical_bytes`], but returns a UTF-8 String.
///
/// # Errors
///
/// Returns `CanonicalJsonError::Serde` if serialization fails, or
/// `CanonicalJsonError::Utf8Error` if UTF-8 conversion fails.
#[must_use = "canonical string should be used for hashing or artifact content"]
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CanonicalJsonError> {
    let bytes = to_canonical_bytes(value)?;
    String::from_utf8(bytes).map_err(|_| CanonicalJsonError::Utf8Error)
}

/// Returns a copy of `value` with all object keys recursively sorted.
///
/// Used when a value must pass through a serializer that preserves map
/// insertion order (e.g. the YAML artifact writer) and the output still
/// has to be deterministic.
#[must_use]
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for k in keys {
                if let Some(v) = map.get(k) {
                    sorted.insert(k.clone(), sort_keys(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn write_value(v: &Value, out: &mut Vec<u8>, depth: usize) -> Result<(), CanonicalJsonError> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => serde_json::to_writer(&mut *out, n)?,
        Value::String(s) => serde_json::to_writer(&mut *out, s)?,
        Value::Array(arr) => {
            if arr.is_empty() {
                out.extend_from_slice(b"[]");
                return Ok(());
            }
            out.extend_from_slice(b"[\n");
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b",\n");
                }
                write_indent(out, depth + 1);
                write_value(item, out, depth + 1)?;
            }
            out.push(b'\n');
            write_indent(out, depth);
            out.push(b']');
        }
        Value::Object(map) => write_object(map, out, depth)?,
    }
    Ok(())
}

fn write_object(
    map: &Map<String, Value>,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<(), CanonicalJsonError> {
    if map.is_empty() {
        out.extend_from_slice(b"{}");
        return Ok(());
    }

    // Keys sorted deterministically by UTF-8 byte order.
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.extend_from_slice(b"{\n");
    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(b",\n");
        }
        write_indent(out, depth + 1);
        serde_json::to_writer(&mut *out, *k)?;
        out.extend_from_slice(b": ");
        if let Some(val) = map.get(*k) {
            write_value(val, out, depth + 1)?;
        }
    }
    out.push(b'\n');
    write_indent(out, depth);
    out.push(b'}');
    Ok(())
}

fn write_indent(out: &mut Vec<u8>, depth: usize) {
    for _ in 0..depth {
        out.extend_from_slice(INDENT.as_bytes());
    }
}
