//! Error types for Decoy
//!
//! This module provides unified error handling across the record store,
//! the association resolver and the model layer. Every failure names the
//! offending model and association so schema mistakes surface loudly.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Decoy
#[derive(Debug, Error)]
pub enum OrmError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A model type was referenced but never registered
    #[error("Model not registered: '{0}'")]
    UnknownModel(String),

    /// An association name was referenced that the model does not declare
    #[error("The '{model}' model has no association named '{association}'")]
    UnknownAssociation { model: String, association: String },

    /// A model or collection was passed under a key that is not an association
    #[error(
        "You're trying to create a '{model}' model and you passed in {value} under the '{key}' key, but you haven't defined that key as an association on your model"
    )]
    UndefinedAssociationKey {
        model: String,
        key: String,
        value: String,
    },

    /// The value passed for an association (or its foreign key) has the wrong shape
    #[error("Invalid value for '{model}.{key}': {message}")]
    InvalidAssociationValue {
        model: String,
        key: String,
        message: String,
    },

    /// A model of the wrong type was assigned to a non-polymorphic association
    #[error(
        "Cannot assign a '{given}' model to '{model}.{association}', which expects '{expected}'"
    )]
    AssociationTypeMismatch {
        model: String,
        association: String,
        expected: String,
        given: String,
    },

    /// An explicit inverse does not exist or does not point back at its owner
    #[error("Invalid inverse for '{model}.{association}': {message}")]
    InverseMismatch {
        model: String,
        association: String,
        message: String,
    },

    /// Two associations claim the same association as their explicit inverse
    #[error(
        "The '{model}' model has defined multiple explicit inverse associations for the '{owner}.{association}' association"
    )]
    MultipleExplicitInverses {
        model: String,
        owner: String,
        association: String,
    },

    /// The same model name was registered twice
    #[error("Duplicate model name: '{0}' is already registered")]
    DuplicateModel(String),

    /// A schema definition failed validation
    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(String),

    // ========================================================================
    // Inverse Resolution Errors
    // ========================================================================
    /// Several implicit inverse candidates exist and none is explicit
    #[error(
        "The '{model}' model has multiple possible inverse associations for the '{owner}.{association}' association"
    )]
    AmbiguousInverse {
        model: String,
        owner: String,
        association: String,
    },

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// A single referenced record does not exist
    #[error("Couldn't find '{model}' with id = {id}")]
    RecordNotFound { model: String, id: String },

    /// Some of a list of referenced records do not exist
    #[error("Couldn't find all '{model}' records with ids: {} (missing: {})", .ids.join(","), .missing.join(","))]
    RecordsNotFound {
        model: String,
        ids: Vec<String>,
        missing: Vec<String>,
    },

    /// A record store collection does not exist
    #[error("Collection not found: '{0}'")]
    CollectionNotFound(String),

    // ========================================================================
    // Immutability Errors
    // ========================================================================
    /// Attempt to change the id of a persisted record
    #[error("Cannot change the id of the persisted '{model}' record '{id}'")]
    ImmutableId { model: String, id: String },

    // ========================================================================
    // Identity Errors
    // ========================================================================
    /// An externally supplied id collides with one already allocated
    #[error("Attempting to use the id '{id}' in '{collection}', but it's already been used")]
    DuplicateId { collection: String, id: String },

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// File IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File read error
    #[error("Failed to read file '{path}': {message}")]
    FileRead { path: PathBuf, message: String },

    /// File write error
    #[error("Failed to write file '{path}': {message}")]
    FileWrite { path: PathBuf, message: String },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fixture data did not have the expected shape
    #[error("Invalid fixture data: {0}")]
    InvalidFixture(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },
}

impl OrmError {
    /// Create an unknown association error
    pub fn unknown_association(model: impl Into<String>, association: impl Into<String>) -> Self {
        OrmError::UnknownAssociation {
            model: model.into(),
            association: association.into(),
        }
    }

    /// Create an invalid association value error
    pub fn invalid_value(
        model: impl Into<String>,
        key: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        OrmError::InvalidAssociationValue {
            model: model.into(),
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an inverse mismatch error
    pub fn inverse_mismatch(
        model: impl Into<String>,
        association: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        OrmError::InverseMismatch {
            model: model.into(),
            association: association.into(),
            message: msg.into(),
        }
    }

    /// Create a record-not-found error
    pub fn not_found(model: impl Into<String>, id: impl Into<String>) -> Self {
        OrmError::RecordNotFound {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        OrmError::Internal(msg.into())
    }

    /// Create an error with context
    pub fn with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        OrmError::WithContext {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Check if this error is a schema configuration mistake
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OrmError::UnknownModel(_)
                | OrmError::UnknownAssociation { .. }
                | OrmError::UndefinedAssociationKey { .. }
                | OrmError::InvalidAssociationValue { .. }
                | OrmError::AssociationTypeMismatch { .. }
                | OrmError::InverseMismatch { .. }
                | OrmError::MultipleExplicitInverses { .. }
                | OrmError::DuplicateModel(_)
                | OrmError::InvalidDefinition(_)
        )
    }

    /// Check if this error is an ambiguous inverse error
    pub fn is_ambiguous_inverse(&self) -> bool {
        matches!(self, OrmError::AmbiguousInverse { .. })
    }

    /// Check if this error is a lookup error
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            OrmError::RecordNotFound { .. }
                | OrmError::RecordsNotFound { .. }
                | OrmError::CollectionNotFound(_)
        )
    }

    /// Check if this error is an immutability error
    pub fn is_immutability(&self) -> bool {
        matches!(self, OrmError::ImmutableId { .. })
    }

    /// Check if this error is an identity collision
    pub fn is_identity(&self) -> bool {
        matches!(self, OrmError::DuplicateId { .. })
    }

    /// Check if this error is an IO error
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            OrmError::Io(_) | OrmError::FileRead { .. } | OrmError::FileWrite { .. }
        )
    }
}

/// Result type alias using OrmError
pub type OrmResult<T> = Result<T, OrmError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> OrmResult<T>;
}

impl<T, E: Into<OrmError>> ResultExt<T> for Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> OrmResult<T> {
        self.map_err(|e| {
            let err: OrmError = e.into();
            OrmError::WithContext {
                context: context.into(),
                message: err.to_string(),
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
