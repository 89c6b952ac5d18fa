//! Ordered parameter sets.
//!
//! A [`ParamSet`] backs the query string, the upload body and the explicit
//! headers of a [`Request`](crate::Request). It serializes either as a
//! URL-encoded `key=value&...` string or as a JSON object, and can carry a
//! pre-serialized override that wins over both.

use serde_json::{Map, Value};
use std::fmt;
use url::form_urlencoded;

/// Ordered key/value parameters with URL-encoded or JSON serialization.
///
/// Absent values (`None`, `null` or an empty string) are never stored, so a
/// set only becomes non-empty through a real value or an override.
///
/// ```
/// use conduit_http::ParamSet;
///
/// let mut params = ParamSet::new();
/// params.put("q", "rust lang");
/// params.put("page", 2);
/// params.put("filter", None::<String>);
///
/// assert_eq!(params.serialize(), "q=rust+lang&page=2");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    entries: Vec<(String, Value)>,
    json: bool,
    raw: Option<String>,
}

impl ParamSet {
    /// Create an empty set that serializes as a URL-encoded string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set that serializes as a JSON object.
    pub fn json() -> Self {
        Self {
            json: true,
            ..Self::default()
        }
    }

    /// Switch between JSON and URL-encoded serialization.
    pub fn set_json(&mut self, json: bool) {
        self.json = json;
    }

    /// Whether this set serializes as a JSON object.
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Store a value under `key`.
    ///
    /// Absent values are ignored. Putting an existing key replaces its value
    /// and keeps its original position.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        if is_absent(&value) {
            return;
        }

        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`put`](Self::put).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    /// Set a pre-serialized payload that replaces the entries on the wire.
    pub fn set_raw(&mut self, raw: impl Into<String>) {
        self.raw = Some(raw.into());
    }

    /// The pre-serialized override, if any.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Number of stored entries (the override does not count).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries and no override.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.raw.is_none()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Serialize the set for the wire.
    ///
    /// Returns the override when set, otherwise a JSON object or a
    /// `key=value` list joined by `&`. An empty set serializes to `""` in
    /// both modes.
    pub fn serialize(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        if self.entries.is_empty() {
            return String::new();
        }

        if self.json {
            let object: Map<String, Value> = self.entries.iter().cloned().collect();
            Value::Object(object).to_string()
        } else {
            self.entries
                .iter()
                .map(|(key, value)| {
                    let encoded: String =
                        form_urlencoded::byte_serialize(scalar_text(value).as_bytes()).collect();
                    format!("{key}={encoded}")
                })
                .collect::<Vec<_>>()
                .join("&")
        }
    }

    /// UTF-8 bytes of [`serialize`](Self::serialize), used as upload payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize().into_bytes()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl<K, V> FromIterator<(K, V)> for ParamSet
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = ParamSet::new();
        for (key, value) in iter {
            params.put(key, value);
        }
        params
    }
}

/// Plain-text form of a value, as used in query strings and header values.
///
/// Strings are taken verbatim; everything else uses its JSON text.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_values_are_ignored() {
        let mut params = ParamSet::new();
        params.put("a", None::<i64>);
        params.put("b", "");
        params.put("c", Value::Null);

        assert!(params.is_empty());
        assert_eq!(params.len(), 0);
        assert_eq!(params.serialize(), "");
    }

    #[test]
    fn test_absent_values_leave_existing_entries_alone() {
        let mut params = ParamSet::new().with("page", 2).with("q", "shoes");
        let before = params.serialize();

        params.put("filter", None::<String>);
        params.put("sort", "");
        params.put("q", "");
        params.put("page", Value::Null);

        assert_eq!(params.len(), 2);
        assert_eq!(params.serialize(), before);
        assert_eq!(params.get("q"), Some(&Value::from("shoes")));
    }

    #[test]
    fn test_raw_override_counts_as_content() {
        let mut params = ParamSet::new();
        assert!(params.is_empty());

        params.set_raw(r#"{"prebuilt":true}"#);
        params.put("ignored", "value");

        assert!(!params.is_empty());
        assert_eq!(params.serialize(), r#"{"prebuilt":true}"#);
    }

    #[test]
    fn test_url_encoding() {
        let params = ParamSet::new()
            .with("q", "a b&c=d")
            .with("lang", "ру")
            .with("limit", 10)
            .with("strict", true);

        assert_eq!(
            params.serialize(),
            "q=a+b%26c%3Dd&lang=%D1%80%D1%83&limit=10&strict=true"
        );
    }

    #[test]
    fn test_json_mode_keeps_native_types() {
        let mut params = ParamSet::json();
        params.put("name", "widget");
        params.put("count", 5);
        params.put("ratio", 0.5);
        params.put("active", false);
        params.put("tags", json!(["a", "b"]));

        let parsed: Value = serde_json::from_str(&params.serialize()).unwrap();
        assert_eq!(
            parsed,
            json!({"name": "widget", "count": 5, "ratio": 0.5, "active": false, "tags": ["a", "b"]})
        );
    }

    #[test]
    fn test_empty_json_set_serializes_to_empty_string() {
        assert_eq!(ParamSet::json().serialize(), "");
    }

    #[test]
    fn test_put_replaces_in_place() {
        let mut params = ParamSet::new();
        params.put("a", 1);
        params.put("b", 2);
        params.put("a", 3);

        assert_eq!(params.len(), 2);
        assert_eq!(params.serialize(), "a=3&b=2");
        assert_eq!(params.get("a"), Some(&json!(3)));
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let params: ParamSet = [("z", "1"), ("a", "2"), ("m", "3")].into_iter().collect();

        assert_eq!(params.serialize(), params.serialize());
        assert_eq!(params.to_string(), "z=1&a=2&m=3");

        let mut json = params.clone();
        json.set_json(true);
        assert_eq!(json.serialize(), json.serialize());
    }

    #[test]
    fn test_iter_preserves_insertion_order() {
        let params = ParamSet::new().with("second", 2).with("first", 1);
        let keys: Vec<&str> = params.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["second", "first"]);
    }
}
