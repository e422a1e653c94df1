//! Generic settings documents.
//!
//! A [`Document`] is the ordered tree form of one settings file: field
//! names mapped to JSON values, in insertion order. Documents are the
//! common currency between the codec, the migration engine, and the
//! versioned-document codec. They are created per read/write call and
//! never cached.
//!
//! The version marker lives inside the document as an ordinary field;
//! [`Document::extract_version`] pulls it out (removing it from the tree)
//! and [`Document::stamp_version`] writes it back before persisting.

pub mod codec;
mod rename;

pub use codec::DocumentCodec;

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Ordered field tree of a single settings file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from raw JSON text.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::Decode(format!(
                "settings document root must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Consume the document back into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Pretty-printed JSON in field insertion order.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.fields)?)
    }

    /// Remove and parse the version marker field.
    ///
    /// Returns `Ok(None)` when the field is absent or null. Markers may be
    /// stored as JSON numbers or numeric strings; anything else is a
    /// decode error. The field is removed from the document either way so
    /// that structural binding never sees it.
    pub fn extract_version(&mut self, field: &str) -> Result<Option<u32>> {
        match self.fields.remove(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| {
                    Error::Decode(format!("field `{field}` is not a valid version: {n}"))
                }),
            Some(Value::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| {
                Error::Decode(format!("field `{field}` is not a valid version: {s:?}"))
            }),
            Some(other) => Err(Error::Decode(format!(
                "field `{field}` is not a valid version: {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Write the version marker field as a JSON number.
    pub fn stamp_version(&mut self, field: &str, version: u32) {
        self.fields.insert(field.to_string(), Value::from(version));
    }

    /// Look up a field by its on-disk name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Remove a field, returning its value if present.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Whether a field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// On-disk field names in document order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Human name of a JSON value's type for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
