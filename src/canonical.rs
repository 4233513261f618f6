//! Canonical JSON text for hashing and signing.
//!
//! The layout is fixed so that digests and signatures stay byte-identical
//! between the issuing and the validating machine, and with licenses
//! minted by earlier tooling:
//!
//! - object keys sorted by code point, recursively
//! - `", "` between items and `": "` between key and value
//! - every character outside printable ASCII escaped as `\uXXXX`
//!   (surrogate pairs above the BMP)

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};

use crate::errors::LicenseResult;

/// Serialize any value into canonical JSON text.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> LicenseResult<String> {
    let value = serde_json::to_value(value)?;
    canonical_json_value(&value)
}

/// Serialize an already-built JSON value into canonical JSON text.
pub fn canonical_json_value(value: &Value) -> LicenseResult<String> {
    let sorted = sort_keys(value);
    let mut out = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    sorted.serialize(&mut ser)?;
    // The formatter only ever emits ASCII.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Rebuild every object with keys in sorted order, independent of whether
/// `serde_json` keeps insertion order.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_recursively_with_spaced_separators() {
        let value = json!({"b": {"z": "1", "a": "2"}, "a": ["x", "y"]});
        let text = canonical_json_value(&value).unwrap();
        assert_eq!(text, r#"{"a": ["x", "y"], "b": {"a": "2", "z": "1"}}"#);
    }

    #[test]
    fn escapes_non_ascii_as_utf16_units() {
        let value = json!({"name": "Zoë 😀"});
        let text = canonical_json_value(&value).unwrap();
        assert_eq!(text, r#"{"name": "Zo\u00eb \ud83d\ude00"}"#);
    }

    #[test]
    fn escapes_delete_and_control_characters() {
        let value = json!({"k": "a\u{7f}b\nc\u{1}"});
        let text = canonical_json_value(&value).unwrap();
        assert_eq!(text, r#"{"k": "a\u007fb\nc\u0001"}"#);
    }

    #[test]
    fn empty_containers() {
        let value = json!({"list": [], "map": {}});
        let text = canonical_json_value(&value).unwrap();
        assert_eq!(text, r#"{"list": [], "map": {}}"#);
    }

    #[test]
    fn same_content_different_insertion_order_is_identical() {
        let mut first = Map::new();
        first.insert("one".into(), json!("1"));
        first.insert("two".into(), json!("2"));
        let mut second = Map::new();
        second.insert("two".into(), json!("2"));
        second.insert("one".into(), json!("1"));

        assert_eq!(
            canonical_json_value(&Value::Object(first)).unwrap(),
            canonical_json_value(&Value::Object(second)).unwrap()
        );
    }
}
