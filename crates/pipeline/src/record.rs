//! Row-oriented record model moved one at a time through duct stages.

use serde::{Deserialize, Serialize};

/// One typed field of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer value.
    Int(i64),
    /// 64-bit floating point value.
    Float(f64),
    /// UTF-8 string value.
    Str(String),
}

/// Ordered tuple of typed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: Vec<FieldValue>,
}

impl Record {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record over the given values.
    pub fn from_values(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    /// Field at `index`.
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a field.
    pub fn push(&mut self, value: FieldValue) {
        self.values.push(value);
    }

    /// Iterate fields in order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> {
        self.values.iter()
    }

    /// Consume into the underlying values.
    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }
}

impl From<Vec<FieldValue>> for Record {
    fn from(values: Vec<FieldValue>) -> Self {
        Self::from_values(values)
    }
}

/// Ordered field names describing record shape in transform descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fields {
    names: Vec<String>,
}

impl Fields {
    /// Fields over the given names, in order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Field names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the shape has no fields.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}
