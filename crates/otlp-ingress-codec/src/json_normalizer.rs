//! Normalizes canonical OTLP JSON (camelCase, stringified 64-bit integers,
//! hex trace/span ids) into the shape `serde_json` needs to deserialize
//! directly into the prost-generated structs (snake_case, real numbers,
//! byte arrays).
//!
//! Missing fields are *not* filled in here: every generated field carries
//! `#[serde(default)]` (see `otlp-ingress-proto/build.rs`), so an absent key
//! just takes the zero value. This module only fixes up keys and value
//! shapes that differ between canonical OTLP JSON and prost's derived
//! `Deserialize` impl.

use serde_json::Value as JsonValue;

// int64/uint64/fixed64 fields are encoded as JSON strings in canonical OTLP
// JSON (to avoid precision loss in JS clients); prost's generated fields are
// plain numbers and need the string peeled off.
const STRING_ENCODED_INT_FIELDS: &[&str] = &[
    "time_unix_nano",
    "observed_time_unix_nano",
    "start_time_unix_nano",
    "end_time_unix_nano",
    "int_value",
    "as_int",
    "count",
    "zero_count",
];

// trace_id/span_id are hex strings in canonical OTLP JSON; prost's `bytes`
// fields deserialize from a JSON array of byte values.
const HEX_BYTES_FIELDS: &[&str] = &["trace_id", "span_id", "parent_span_id"];

// AnyValue is a oneof; serde's externally-tagged enum representation keys
// on the PascalCase variant name, not the snake_case proto field name.
const ANY_VALUE_VARIANTS: &[&str] = &[
    "string_value",
    "bool_value",
    "int_value",
    "double_value",
    "array_value",
    "kvlist_value",
    "bytes_value",
];

/// Recursively rewrite `value` in place. `key_hint` is the JSON key this
/// value was reached under, used to decide field-specific coercions.
pub fn normalize(value: &mut JsonValue, key_hint: Option<&str>) {
    match value {
        JsonValue::Object(map) => {
            let original = std::mem::take(map);
            for (key, mut child) in original {
                let snake = camel_to_snake(&key);
                normalize(&mut child, Some(snake.as_str()));

                let is_any_value_variant = ANY_VALUE_VARIANTS.contains(&snake.as_str());
                let final_key = if is_any_value_variant {
                    snake_to_pascal(&snake)
                } else {
                    snake
                };
                map.insert(final_key, child);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                normalize(item, key_hint);
            }
        }
        JsonValue::String(s) => {
            if let Some(key) = key_hint {
                if HEX_BYTES_FIELDS.contains(&key) {
                    if let Ok(bytes) = hex_decode(s) {
                        *value = JsonValue::Array(
                            bytes.into_iter().map(|b| JsonValue::from(b as u64)).collect(),
                        );
                    }
                } else if STRING_ENCODED_INT_FIELDS.contains(&key) {
                    if let Ok(n) = s.parse::<i64>() {
                        *value = JsonValue::from(n);
                    } else if let Ok(n) = s.parse::<u64>() {
                        *value = JsonValue::from(n);
                    }
                }
            }
        }
        _ => {}
    }
}

fn camel_to_snake(s: &str) -> String {
    if !s.chars().any(|c| c.is_ascii_uppercase()) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn snake_to_pascal(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
