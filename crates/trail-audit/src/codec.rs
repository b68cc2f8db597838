//! Detail payload codec.
//!
//! Audit details are carried as canonical JSON text. Callers hand in a
//! [`DetailValue`], a closed tagged value type, and the codec turns it into
//! that text (and back). Text that is already JSON is passed through as-is so
//! re-encoding never double-wraps a payload.

use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Canonical encoding of an absent payload.
pub const EMPTY_DETAILS: &str = "{}";

/// Key used when wrapping free text that is not JSON.
pub const WRAP_KEY: &str = "value";

/// The payload could not be represented as JSON.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// NaN and infinities have no JSON representation.
    #[error("non-finite number {0} cannot be encoded")]
    NonFiniteNumber(f64),

    /// Serializer failure.
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The text is not valid JSON.
#[derive(Debug, Error)]
#[error("details are not valid JSON: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// A structured detail value.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<DetailValue>),
    Map(DetailMap),
}

/// An insertion-ordered string-keyed map of detail values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailMap {
    entries: Vec<(String, DetailValue)>,
    // Key -> position in `entries`.
    index: HashMap<String, usize>,
}

impl DetailMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DetailValue>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key).copied() {
            Some(pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&DetailValue> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DetailValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<DetailValue>> FromIterator<(K, V)> for DetailMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = DetailMap::with_capacity(iter.size_hint().0);
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl DetailValue {
    /// Borrow the map form, if this is a map.
    pub fn as_map(&self) -> Option<&DetailMap> {
        match self {
            DetailValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Convert into a `serde_json::Value`.
    pub fn to_json(&self) -> Result<Value, EncodeError> {
        Ok(match self {
            DetailValue::Null => Value::Null,
            DetailValue::Bool(b) => Value::Bool(*b),
            DetailValue::Int(i) => Value::Number((*i).into()),
            DetailValue::UInt(u) => Value::Number((*u).into()),
            DetailValue::Float(f) => {
                Value::Number(Number::from_f64(*f).ok_or(EncodeError::NonFiniteNumber(*f))?)
            }
            DetailValue::Text(s) => Value::String(s.clone()),
            DetailValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(DetailValue::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            DetailValue::Map(map) => {
                let mut obj = Map::with_capacity(map.len());
                for (k, v) in map.iter() {
                    obj.insert(k.to_string(), v.to_json()?);
                }
                Value::Object(obj)
            }
        })
    }
}

impl From<Value> for DetailValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => DetailValue::Null,
            Value::Bool(b) => DetailValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DetailValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    DetailValue::UInt(u)
                } else {
                    DetailValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => DetailValue::Text(s),
            Value::Array(items) => DetailValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(obj) => DetailValue::Map(obj.into_iter().collect()),
        }
    }
}

impl From<&str> for DetailValue {
    fn from(s: &str) -> Self {
        DetailValue::Text(s.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        DetailValue::Text(s)
    }
}

impl From<i64> for DetailValue {
    fn from(i: i64) -> Self {
        DetailValue::Int(i)
    }
}

impl From<u32> for DetailValue {
    fn from(i: u32) -> Self {
        DetailValue::Int(i64::from(i))
    }
}

impl From<u64> for DetailValue {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(DetailValue::UInt(u), DetailValue::Int)
    }
}

impl From<f64> for DetailValue {
    fn from(f: f64) -> Self {
        DetailValue::Float(f)
    }
}

impl From<bool> for DetailValue {
    fn from(b: bool) -> Self {
        DetailValue::Bool(b)
    }
}

impl From<DetailMap> for DetailValue {
    fn from(map: DetailMap) -> Self {
        DetailValue::Map(map)
    }
}

impl From<Vec<DetailValue>> for DetailValue {
    fn from(items: Vec<DetailValue>) -> Self {
        DetailValue::List(items)
    }
}

impl<T: Into<DetailValue>> From<Option<T>> for DetailValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DetailValue::Null, Into::into)
    }
}

/// Encode a payload into canonical JSON text.
///
/// - `None` and `Null` become `{}`.
/// - Text that already parses as JSON is returned unchanged.
/// - Other text is wrapped as `{"value": text}`.
/// - Everything else is serialized directly.
pub fn encode(value: Option<&DetailValue>) -> Result<String, EncodeError> {
    match value {
        None | Some(DetailValue::Null) => Ok(EMPTY_DETAILS.to_string()),
        Some(DetailValue::Text(text)) => {
            if is_json(text) {
                Ok(text.clone())
            } else {
                let mut obj = Map::new();
                obj.insert(WRAP_KEY.to_string(), Value::String(text.clone()));
                Ok(serde_json::to_string(&Value::Object(obj))?)
            }
        }
        Some(other) => Ok(serde_json::to_string(&other.to_json()?)?),
    }
}

/// Decode JSON text into a detail value.
pub fn decode(text: &str) -> Result<DetailValue, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(value.into())
}

fn is_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_encodes_to_empty_object() {
        assert_eq!(encode(None).unwrap(), "{}");
        assert_eq!(encode(Some(&DetailValue::Null)).unwrap(), "{}");
    }

    #[test]
    fn json_text_passes_through_unchanged() {
        let text = DetailValue::from(r#"{"b": 1,  "a": [true]}"#);
        assert_eq!(encode(Some(&text)).unwrap(), r#"{"b": 1,  "a": [true]}"#);
    }

    #[test]
    fn plain_text_is_wrapped() {
        let text = DetailValue::from("order shipped");
        assert_eq!(encode(Some(&text)).unwrap(), r#"{"value":"order shipped"}"#);
    }

    #[test]
    fn reencoding_is_idempotent() {
        let first = encode(Some(&DetailValue::from("hello"))).unwrap();
        let second = encode(Some(&DetailValue::from(first.clone()))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn map_encodes_in_insertion_order() {
        let map = DetailMap::new()
            .with("zeta", 1i64)
            .with("alpha", "x")
            .with("nested", DetailMap::new().with("ok", true));
        let text = encode(Some(&map.into())).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":"x","nested":{"ok":true}}"#);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut map = DetailMap::new().with("a", 1i64).with("b", 2i64);
        map.insert("a", 3i64);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&DetailValue::Int(3)));
    }

    #[test]
    fn non_finite_float_is_an_encode_error() {
        let map = DetailMap::new().with("ratio", f64::NAN);
        let err = encode(Some(&map.into())).unwrap_err();
        assert!(matches!(err, EncodeError::NonFiniteNumber(_)));
    }

    #[test]
    fn decode_keeps_key_order() {
        let value = decode(r#"{"b":1,"a":{"c":2.5}}"#).unwrap();
        let map = value.as_map().unwrap();
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(
            map.get("a").and_then(DetailValue::as_map).and_then(|m| m.get("c")),
            Some(&DetailValue::Float(2.5))
        );
    }

    #[test]
    fn large_unsigned_survives_decode_encode() {
        let text = r#"{"traceId":18446744073709551615,"small":7,"neg":-3}"#;
        let value = decode(text).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("traceId"), Some(&DetailValue::UInt(u64::MAX)));
        assert_eq!(map.get("small"), Some(&DetailValue::Int(7)));
        assert_eq!(encode(Some(&value)).unwrap(), text);
    }

    #[test]
    fn from_u64_prefers_signed_when_it_fits() {
        assert_eq!(DetailValue::from(5u64), DetailValue::Int(5));
        assert_eq!(DetailValue::from(u64::MAX), DetailValue::UInt(u64::MAX));
    }

    #[test]
    fn wide_object_decodes_with_unique_lookup() {
        let text = format!(
            "{{{}}}",
            (0..20_000)
                .map(|i| format!(r#""k{}":{}"#, i, i))
                .collect::<Vec<_>>()
                .join(",")
        );
        let value = decode(&text).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 20_000);
        assert_eq!(map.get("k19999"), Some(&DetailValue::Int(19_999)));
        assert_eq!(map.iter().next().map(|(k, _)| k), Some("k0"));
        assert_eq!(encode(Some(&value)).unwrap(), text);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("{not json").is_err());
    }
}
