//! Association descriptors
//!
//! An `Association` is the declaration a model type makes about one of its
//! relationships (`belongsTo` or `hasMany`). Once the owning model is
//! registered it becomes a `ResolvedAssociation`, which adds the owner type
//! and the concrete foreign key name.

use decoy_core::inflector::{camelize, singularize};
use decoy_core::{AssociationKind, OrmError, OrmResult, Validatable, is_valid_identifier};
use serde::{Deserialize, Serialize};

// ============================================================================
// InverseSpec
// ============================================================================

/// What an association says about its inverse
///
/// In JSON definitions an absent `inverse` key is `Implicit`, `null` is
/// `Disabled` and a string is `Named`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum InverseSpec {
    /// Look for a unique matching association on the target
    #[default]
    Implicit,
    /// Use this association on the target
    Named(String),
    /// One-way: never has an inverse
    Disabled,
}

impl InverseSpec {
    /// Whether no inverse hint was given
    pub fn is_implicit(&self) -> bool {
        matches!(self, InverseSpec::Implicit)
    }

    /// The explicit inverse name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            InverseSpec::Named(name) => Some(name),
            _ => None,
        }
    }
}

mod inverse_serde {
    use super::InverseSpec;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(spec: &InverseSpec, serializer: S) -> Result<S::Ok, S::Error> {
        match spec {
            InverseSpec::Named(name) => serializer.serialize_str(name),
            InverseSpec::Implicit | InverseSpec::Disabled => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<InverseSpec, D::Error> {
        Ok(match Option::<String>::deserialize(deserializer)? {
            Some(name) => InverseSpec::Named(name),
            None => InverseSpec::Disabled,
        })
    }
}

// ============================================================================
// Association
// ============================================================================

/// A declared relationship on a model type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    /// belongsTo or hasMany
    pub kind: AssociationKind,

    /// Property name on the owner (e.g. "author", "posts")
    pub name: String,

    /// Explicit target model type; inferred from `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Inverse hint
    #[serde(
        default,
        skip_serializing_if = "InverseSpec::is_implicit",
        with = "inverse_serde"
    )]
    pub inverse: InverseSpec,

    /// Whether the target type varies per record
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub polymorphic: bool,
}

impl Association {
    /// Create a new association
    pub fn new(kind: AssociationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            model_name: None,
            inverse: InverseSpec::Implicit,
            polymorphic: false,
        }
    }

    /// Declare a belongsTo association
    pub fn belongs_to(name: impl Into<String>) -> Self {
        Self::new(AssociationKind::BelongsTo, name)
    }

    /// Declare a hasMany association
    pub fn has_many(name: impl Into<String>) -> Self {
        Self::new(AssociationKind::HasMany, name)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Set the target model type
    pub fn model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// Name the inverse association on the target
    pub fn inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = InverseSpec::Named(inverse.into());
        self
    }

    /// Declare this association one-way
    pub fn no_inverse(mut self) -> Self {
        self.inverse = InverseSpec::Disabled;
        self
    }

    /// Mark the association polymorphic
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    // ========================================================================
    // Derived names
    // ========================================================================

    /// Target model type, explicit or inferred from the property name
    pub fn target_model_name(&self) -> String {
        match &self.model_name {
            Some(name) => camelize(name),
            None => match self.kind {
                AssociationKind::BelongsTo => camelize(&self.name),
                AssociationKind::HasMany => singularize(&camelize(&self.name)),
            },
        }
    }

    /// Foreign key stored on the owner (`authorId`, `postIds`)
    pub fn foreign_key(&self) -> String {
        let key = camelize(&self.name);
        match self.kind {
            AssociationKind::BelongsTo => format!("{}{}", key, self.kind.foreign_key_suffix()),
            AssociationKind::HasMany => {
                format!("{}{}", singularize(&key), self.kind.foreign_key_suffix())
            }
        }
    }

    /// Resolve against the owner type
    pub fn resolve(&self, owner_model_name: &str) -> ResolvedAssociation {
        ResolvedAssociation {
            kind: self.kind,
            name: self.name.clone(),
            owner_model_name: owner_model_name.to_string(),
            model_name: self.target_model_name(),
            foreign_key: self.foreign_key(),
            inverse: self.inverse.clone(),
            polymorphic: self.polymorphic,
        }
    }
}

impl Validatable for Association {
    fn validate(&self) -> OrmResult<()> {
        if !is_valid_identifier(&self.name) {
            return Err(OrmError::InvalidDefinition(format!(
                "Association name '{}' is not a valid identifier",
                self.name
            )));
        }
        if let Some(model_name) = &self.model_name {
            if !is_valid_identifier(model_name) {
                return Err(OrmError::InvalidDefinition(format!(
                    "Association '{}' targets '{}', which is not a valid model name",
                    self.name, model_name
                )));
            }
        }
        if let InverseSpec::Named(inverse) = &self.inverse {
            if !is_valid_identifier(inverse) {
                return Err(OrmError::InvalidDefinition(format!(
                    "Association '{}' names '{}' as its inverse, which is not a valid identifier",
                    self.name, inverse
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// ResolvedAssociation
// ============================================================================

/// An association bound to its owner type with a concrete foreign key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAssociation {
    pub kind: AssociationKind,
    pub name: String,
    /// Model type that declares the association
    pub owner_model_name: String,
    /// Target model type (meaningless for polymorphic associations)
    pub model_name: String,
    pub foreign_key: String,
    pub inverse: InverseSpec,
    pub polymorphic: bool,
}

impl ResolvedAssociation {
    pub fn is_belongs_to(&self) -> bool {
        self.kind == AssociationKind::BelongsTo
    }

    pub fn is_has_many(&self) -> bool {
        self.kind == AssociationKind::HasMany
    }

    /// Whether the association points back at its own owner type
    pub fn is_reflexive(&self) -> bool {
        !self.polymorphic && self.model_name == self.owner_model_name
    }

    /// Whether records of `model_name` can be the target
    pub fn accepts(&self, model_name: &str) -> bool {
        self.polymorphic || self.model_name == model_name
    }
}

impl std::fmt::Display for ResolvedAssociation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.owner_model_name, self.name)
    }
}

// ============================================================================
// Tests
// ============================================================================
