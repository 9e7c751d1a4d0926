//! Application message model.
//!
//! A message is an ordered sequence of named fields, each either a JSON
//! value or a raw byte buffer. Order matters: blob descriptors are emitted
//! in insertion order, and the peer rebuilds the message in wire order.

use bytes::Bytes;
use serde_json::Value;

/// One field of a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A JSON-serialisable value, transmitted as UTF-8 JSON.
    Json(Value),
    /// An opaque byte buffer, transmitted verbatim.
    Buffer(Bytes),
}

impl FieldValue {
    /// The JSON value, if this field is JSON.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Buffer(_) => None,
        }
    }

    /// The raw bytes, if this field is a buffer.
    #[must_use]
    pub fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            Self::Buffer(bytes) => Some(bytes),
            Self::Json(_) => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for FieldValue {
    fn from(bytes: Bytes) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(Bytes::from(bytes))
    }
}

/// An ordered map of field id to [`FieldValue`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    fields: Vec<(String, FieldValue)>,
}

impl Message {
    /// Create an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any existing field with the same id in
    /// place (the original position is kept).
    pub fn insert(&mut self, id: impl Into<String>, value: impl Into<FieldValue>) {
        let id = id.into();
        let value = value.into();

        if let Some(slot) = self.fields.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = value;
        } else {
            self.fields.push((id, value));
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(id, value);
        self
    }

    /// Look up a field by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(existing, _)| existing == id).map(|(_, value)| value)
    }

    /// Look up a JSON field by id.
    #[must_use]
    pub fn get_json(&self, id: &str) -> Option<&Value> {
        self.get(id).and_then(FieldValue::as_json)
    }

    /// Look up a buffer field by id.
    #[must_use]
    pub fn get_buffer(&self, id: &str) -> Option<&Bytes> {
        self.get(id).and_then(FieldValue::as_buffer)
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(id, value)| (id.as_str(), value))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the message has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Message {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut message = Self::new();
        for (id, value) in iter {
            message.insert(id, value);
        }
        message
    }
}
