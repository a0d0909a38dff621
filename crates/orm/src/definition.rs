//! Declarative model definitions
//!
//! A `SchemaDefinition` lists every model type and the associations it
//! declares. Definitions can be built in code or loaded from JSON:
//!
//! ```json
//! {
//!   "models": [
//!     { "name": "author", "associations": [{ "kind": "hasMany", "name": "posts" }] },
//!     { "name": "post", "associations": [{ "kind": "belongsTo", "name": "author" }] }
//!   ]
//! }
//! ```

use crate::association::Association;
use decoy_core::{OrmError, OrmResult, Validatable, is_valid_identifier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ============================================================================
// ModelDefinition
// ============================================================================

/// One model type and its declared associations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    /// Model type name, camelCase singular (e.g. "blogPost")
    pub name: String,

    /// Declared associations, in declaration order
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl ModelDefinition {
    /// Create a definition with no associations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            associations: Vec::new(),
        }
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Add a belongsTo association with default options
    pub fn belongs_to(self, name: impl Into<String>) -> Self {
        self.with(Association::belongs_to(name))
    }

    /// Add a hasMany association with default options
    pub fn has_many(self, name: impl Into<String>) -> Self {
        self.with(Association::has_many(name))
    }

    /// Add a fully configured association
    pub fn with(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Find a declared association by name
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }
}

impl Validatable for ModelDefinition {
    fn validate(&self) -> OrmResult<()> {
        if !is_valid_identifier(&self.name) {
            return Err(OrmError::InvalidDefinition(format!(
                "Model name '{}' is not a valid identifier",
                self.name
            )));
        }

        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for association in &self.associations {
            association.validate()?;
            if !names.insert(association.name.as_str()) {
                return Err(OrmError::InvalidDefinition(format!(
                    "'{}' declares the association '{}' more than once",
                    self.name, association.name
                )));
            }
            if !keys.insert(association.foreign_key()) {
                return Err(OrmError::InvalidDefinition(format!(
                    "'{}.{}' would reuse the foreign key '{}'",
                    self.name,
                    association.name,
                    association.foreign_key()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SchemaDefinition
// ============================================================================

/// Every model type of a schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model definition
    pub fn model(mut self, model: ModelDefinition) -> Self {
        self.models.push(model);
        self
    }

    /// Find a model definition by name
    pub fn find(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.iter().find(|m| m.name == name)
    }
}

impl Validatable for SchemaDefinition {
    fn validate(&self) -> OrmResult<()> {
        let mut names = HashSet::new();
        for model in &self.models {
            model.validate()?;
            if !names.insert(model.name.as_str()) {
                return Err(OrmError::DuplicateModel(model.name.clone()));
            }
        }
        Ok(())
    }

    fn validation_errors(&self) -> Vec<String> {
        let mut errors: Vec<String> = self
            .models
            .iter()
            .filter_map(|m| m.validate().err())
            .map(|e| e.to_string())
            .collect();

        let mut names = HashSet::new();
        for model in &self.models {
            if !names.insert(model.name.as_str()) {
                errors.push(OrmError::DuplicateModel(model.name.clone()).to_string());
            }
        }
        errors
    }
}

// ============================================================================
// Load Functions
// ============================================================================

/// Load a schema definition from a JSON file
pub fn load_definition(path: impl AsRef<Path>) -> OrmResult<SchemaDefinition> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| OrmError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    load_definition_from_string(&json).map_err(|e| match e {
        OrmError::Json(je) => OrmError::FileRead {
            path: path.to_path_buf(),
            message: format!("Invalid schema definition: {}", je),
        },
        other => other,
    })
}

/// Parse and validate a schema definition from a JSON string
pub fn load_definition_from_string(json: &str) -> OrmResult<SchemaDefinition> {
    let definition: SchemaDefinition = serde_json::from_str(json)?;
    definition.validate()?;
    Ok(definition)
}

// ============================================================================
// Tests
// ============================================================================
