//! Server-reported error envelopes.
//!
//! APIs behind this layer report application errors inside the response body,
//! either wrapped as `{"error": {...}}` or as a bare object carrying `name`,
//! `status` and `message`. Decoding is lenient: missing or mistyped fields
//! fall back to empty defaults and only a body that is not a JSON object is
//! rejected.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Name used when an `error` key is present but carries no object.
pub const UNKNOWN_ERROR_NAME: &str = "UNKNOWN";

/// A decoded application-level error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("{name} ({status}): {message}")]
pub struct ServerError {
    /// Symbolic error name, e.g. `NOT_FOUND`.
    pub name: String,
    /// Status code reported by the server (0 when absent).
    pub status: i64,
    /// Human-readable message.
    pub message: String,
    /// Localized variants of the message, empty when not provided.
    pub localized: LocalizedMessage,
}

/// Localized message pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalizedMessage {
    pub ru: String,
    pub en: String,
}

impl LocalizedMessage {
    /// True when neither variant is set.
    pub fn is_empty(&self) -> bool {
        self.ru.is_empty() && self.en.is_empty()
    }

    /// Variant for a language tag such as `ru` or `en-US`.
    pub fn get(&self, language: &str) -> Option<&str> {
        let primary = language.split(['-', '_']).next().unwrap_or_default();
        let text = match primary.to_ascii_lowercase().as_str() {
            "ru" => &self.ru,
            "en" => &self.en,
            _ => return None,
        };
        (!text.is_empty()).then_some(text.as_str())
    }
}

impl ServerError {
    /// Create an error without localized variants.
    pub fn new(name: impl Into<String>, status: i64, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            localized: LocalizedMessage::default(),
        }
    }

    /// Fallback used when the `error` key does not hold an object.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ERROR_NAME, -1, "Exception occurred")
    }

    /// Decode any JSON object as an error body.
    ///
    /// Returns `None` only when `raw` is not a JSON object.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        decode_object(raw).map(|object| Self::from_object(&object))
    }

    /// Decode `raw` only when it explicitly carries an `error` key.
    ///
    /// This is the check applied to every completed response: a body such as
    /// `{"name": "x"}` is a regular payload, `{"error": ...}` is not.
    pub fn from_envelope(raw: &[u8]) -> Option<Self> {
        decode_object(raw)
            .filter(|object| object.contains_key("error"))
            .map(|object| Self::from_object(&object))
    }

    /// Build an error from a decoded JSON object.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let body = match object.get("error") {
            Some(Value::Object(inner)) => inner,
            Some(_) => return Self::unknown(),
            None => object,
        };

        let (message, localized) = match body.get("message") {
            Some(Value::Object(variants)) => {
                let localized = LocalizedMessage {
                    ru: opt_string(variants.get("ru")),
                    en: opt_string(variants.get("en")),
                };
                let message = if localized.en.is_empty() {
                    localized.ru.clone()
                } else {
                    localized.en.clone()
                };
                (message, localized)
            }
            other => (opt_string(other), LocalizedMessage::default()),
        };

        Self {
            name: opt_string(body.get("name")),
            status: opt_int(body.get("status")),
            message,
            localized,
        }
    }

    /// Message in the requested language, falling back to [`message`](Self::message).
    pub fn localized_message(&self, language: &str) -> &str {
        self.localized
            .get(language)
            .unwrap_or(self.message.as_str())
    }
}

fn decode_object(raw: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice(raw) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn opt_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn opt_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|n| n as i64))
            .unwrap_or_default(),
        Some(Value::String(text)) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|n| n as i64))
                .unwrap_or_default()
        }
        _ => 0,
    }
}
