//! Core types used throughout Decoy
//!
//! This module contains the value types shared by the record store and the
//! model layer: records, association kinds, `(type, id)` keys and the
//! `{ id, type }` pairs stored by polymorphic foreign keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Records
// ============================================================================

/// A plain record: attribute name to JSON value
///
/// Records are owned by the record store; everything handed out is a copy.
pub type Record = Map<String, Value>;

/// Normalize an id value to its string form
///
/// Ids are always stored as strings, even when supplied as numbers.
/// Returns `None` for values that cannot be an id (null, objects, arrays).
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read the string id out of a record, if it has one
pub fn record_id(record: &Record) -> Option<String> {
    record.get("id").and_then(normalize_id)
}

// ============================================================================
// Association Kinds
// ============================================================================

/// The two declarable association shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssociationKind {
    /// The owner stores a single foreign key (`authorId`)
    BelongsTo,
    /// The owner stores an array of foreign keys (`postIds`)
    HasMany,
}

impl AssociationKind {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            AssociationKind::BelongsTo => "belongsTo",
            AssociationKind::HasMany => "hasMany",
        }
    }

    /// Suffix appended to the camelized key to build the foreign key name
    pub fn foreign_key_suffix(&self) -> &'static str {
        match self {
            AssociationKind::BelongsTo => "Id",
            AssociationKind::HasMany => "Ids",
        }
    }

    /// Whether this side holds many associates
    pub fn is_many(&self) -> bool {
        matches!(self, AssociationKind::HasMany)
    }

    /// The value a freshly built record carries for this foreign key
    pub fn empty_foreign_key(&self) -> Value {
        match self {
            AssociationKind::BelongsTo => Value::Null,
            AssociationKind::HasMany => Value::Array(Vec::new()),
        }
    }
}

impl std::fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Model Keys
// ============================================================================

/// Identity of a persisted row: model type name plus id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    pub model_name: String,
    pub id: String,
}

impl ModelKey {
    /// Create a new key
    pub fn new(model_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model:{}({})", self.model_name, self.id)
    }
}

// ============================================================================
// Polymorphic Ids
// ============================================================================

/// The `{ id, type }` pair a polymorphic foreign key stores
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolymorphicId {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl PolymorphicId {
    /// Create a new pair
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
        }
    }

    /// Parse a pair out of a JSON value, accepting numeric ids
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let id = object.get("id").and_then(normalize_id)?;
        let type_name = object.get("type")?.as_str()?.to_string();
        Some(Self { id, type_name })
    }

    /// Convert into the JSON shape stored on records
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("type".to_string(), Value::String(self.type_name.clone()));
        Value::Object(object)
    }
}

impl From<ModelKey> for PolymorphicId {
    fn from(key: ModelKey) -> Self {
        Self {
            id: key.id,
            type_name: key.model_name,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
