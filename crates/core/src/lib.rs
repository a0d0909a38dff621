//! # Decoy Core
//!
//! Core types, traits, and error handling for Decoy.
//!
//! This crate provides the foundational building blocks used by the record
//! store and the model layer, including:
//!
//! - **Types**: Records, association kinds, `(type, id)` keys, polymorphic ids
//! - **Traits**: `Validatable` for declarative definitions
//! - **Errors**: Unified error handling with `OrmError` and `OrmResult`
//! - **Inflector**: camelize / pluralize / singularize for derived names
//!

pub mod error;
pub mod inflector;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{OrmError, OrmResult, ResultExt};
pub use traits::{Validatable, is_valid_identifier};
pub use types::{AssociationKind, ModelKey, PolymorphicId, Record, normalize_id, record_id};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
