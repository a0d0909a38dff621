//! Attribute bags for building and updating models
//!
//! `Attrs` carries plain values alongside model references, so a single
//! call can set `title`, `authorId` and `tags` at once:
//!
//! ```rust,ignore
//! let post = schema.create(
//!     "post",
//!     Attrs::new().set("title", "Lorem").with_one("author", &author),
//! )?;
//! ```

use crate::model::Model;
use serde_json::Value;

/// One attribute value
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// A plain JSON value (including foreign keys)
    Value(Value),
    /// A model, or null, for a belongsTo association
    One(Option<Model>),
    /// Models for a hasMany association
    Many(Vec<Model>),
}

impl AttrValue {
    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            AttrValue::Value(value) => value.to_string(),
            AttrValue::One(Some(model)) => model.to_string(),
            AttrValue::One(None) => "null".to_string(),
            AttrValue::Many(models) => format!(
                "collection[{}]",
                models.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(",")
            ),
        }
    }
}

/// Ordered attribute bag
#[derive(Debug, Clone, Default)]
pub struct Attrs {
    entries: Vec<(String, AttrValue)>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a plain value
    pub fn set(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key.into(), AttrValue::Value(value.into()))
    }

    /// Set a belongsTo association to a model
    pub fn with_one(self, key: impl Into<String>, model: &Model) -> Self {
        self.push(key.into(), AttrValue::One(Some(model.clone())))
    }

    /// Clear a belongsTo association
    pub fn with_none(self, key: impl Into<String>) -> Self {
        self.push(key.into(), AttrValue::One(None))
    }

    /// Set a hasMany association to these models
    pub fn with_many(self, key: impl Into<String>, models: impl IntoIterator<Item = Model>) -> Self {
        self.push(key.into(), AttrValue::Many(models.into_iter().collect()))
    }

    fn push(mut self, key: String, value: AttrValue) -> Self {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The plain values only, as a query record
    pub fn plain_values(&self) -> decoy_core::Record {
        self.entries
            .iter()
            .filter_map(|(k, v)| match v {
                AttrValue::Value(value) => Some((k.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

impl IntoIterator for Attrs {
    type Item = (String, AttrValue);
    type IntoIter = std::vec::IntoIter<(String, AttrValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl From<decoy_core::Record> for Attrs {
    fn from(record: decoy_core::Record) -> Self {
        Self {
            entries: record
                .into_iter()
                .map(|(k, v)| (k, AttrValue::Value(v)))
                .collect(),
        }
    }
}

/// Objects become plain attributes; anything else is an empty bag
impl From<Value> for Attrs {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(record) => record.into(),
            _ => Self::default(),
        }
    }
}
