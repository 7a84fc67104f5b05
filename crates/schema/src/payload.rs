//! Raw evidentiary content and its canonical byte encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Captured content of an evidence item.
///
/// On the wire the payload is an object `{"encoding": ..., "data": ...}`
/// where binary content travels base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data")]
pub enum Payload {
    /// Opaque bytes (screenshot pixels, archived pages).
    #[serde(rename = "base64")]
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
    /// UTF-8 text (HTML, console output).
    #[serde(rename = "text")]
    Text(String),
    /// Structured data (HAR logs, cookie arrays, storage maps).
    #[serde(rename = "json")]
    Structured(Value),
}

impl Payload {
    /// The bytes the content hash is computed over.
    ///
    /// Binary and text payloads hash their raw bytes; structured payloads
    /// hash their JCS canonical form (sorted keys, normalized numbers), so two
    /// captures of the same data always agree.
    pub fn canonical_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Payload::Binary(bytes) => Cow::Borrowed(bytes.as_slice()),
            Payload::Text(text) => Cow::Borrowed(text.as_bytes()),
            Payload::Structured(value) => Cow::Owned(custodian_common::hash::canonical_json(value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Binary(bytes) => bytes.is_empty(),
            Payload::Text(text) => text.is_empty(),
            Payload::Structured(value) => match value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                _ => false,
            },
        }
    }

    /// Size of the canonical encoding in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.canonical_bytes().len() as u64
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            Payload::Binary(_) => "base64",
            Payload::Text(_) => "text",
            Payload::Structured(_) => "json",
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Structured(value)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_binary_payload_wire_format() {
        let payload = Payload::Binary(b"<png-bytes>".to_vec());
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({"encoding": "base64", "data": "PHBuZy1ieXRlcz4="}));

        let parsed: Payload = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_structured_payload_hash_ignores_key_order() {
        let a = Payload::Structured(json!({"name": "session", "value": "abc"}));
        let b = Payload::Structured(json!({"value": "abc", "name": "session"}));
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn test_empty_payloads() {
        assert!(Payload::Binary(vec![]).is_empty());
        assert!(Payload::Text(String::new()).is_empty());
        assert!(Payload::Structured(Value::Null).is_empty());
        assert!(Payload::Structured(json!([])).is_empty());
        assert!(Payload::Structured(json!({})).is_empty());
        assert!(!Payload::Structured(json!(0)).is_empty());
        assert!(!Payload::Text("x".into()).is_empty());
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result: Result<Payload, _> =
            serde_json::from_value(json!({"encoding": "base64", "data": "!!!"}));
        assert!(result.is_err());
    }
}
