//! # Payload Canonicalization
//!
//! Deterministic serialization of structured payloads into the bytes that
//! get signed and hashed. Two semantically identical payloads produce
//! byte-identical output regardless of field insertion order:
//!
//! - object keys sorted lexicographically, recursively
//! - UTF-8, no insignificant whitespace
//! - integers only (floats rejected at construction; money travels as
//!   integer minor units)
//!
//! Canonicalization is a pure function with no failure modes beyond
//! "unsupported payload shape", which is rejected when the
//! [`CanonicalPayload`] is constructed, not when bytes are produced.

use crate::errors::CanonicalError;
use serde_json::Value;

/// A payload validated for canonical serialization.
///
/// Construction walks the value once and rejects unsupported shapes;
/// afterwards [`bytes`](Self::bytes) is infallible and stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload {
    value: Value,
    bytes: Vec<u8>,
}

impl CanonicalPayload {
    /// Validate and canonicalize a payload.
    pub fn new(value: Value) -> Result<Self, CanonicalError> {
        validate(&value)?;
        let mut bytes = Vec::new();
        write_canonical(&value, &mut bytes)?;
        Ok(Self { value, bytes })
    }

    /// The canonical bytes (what gets signed).
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the canonical bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The structured payload.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Reject shapes that cannot canonicalize deterministically.
fn validate(value: &Value) -> Result<(), CanonicalError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Ok(())
            } else {
                Err(CanonicalError::UnsupportedNumber(n.to_string()))
            }
        }
        Value::Array(items) => items.iter().try_for_each(validate),
        Value::Object(map) => map.values().try_for_each(validate),
    }
}

/// Emit compact JSON with recursively sorted object keys.
fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => {
            let escaped = serde_json::to_string(s)
                .map_err(|e| CanonicalError::Serialization(e.to_string()))?;
            out.extend_from_slice(escaped.as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                let escaped = serde_json::to_string(key)
                    .map_err(|e| CanonicalError::Serialization(e.to_string()))?;
                out.extend_from_slice(escaped.as_bytes());
                out.push(b':');
                // Key came from the map, value must exist
                if let Some(v) = map.get(key.as_str()) {
                    write_canonical(v, out)?;
                }
            }
            out.push(b'}');
        }
    }
    Ok(())
}
