//! Inbound provider notification as seen by the processor.

use std::collections::BTreeMap;

use serde_json::Value;

/// A raw provider notification: the JSON body exactly as received plus the
/// request headers, keyed by lower-cased header name.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub payload: Value,
    pub headers: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// String field from the top level of the payload.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }

    /// Raw JSON field from the top level of the payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
