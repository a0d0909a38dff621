//! # Decoy
//!
//! An in-memory ORM for simulating a backend data layer during front-end
//! development and testing.
//!
//! Model types declare `belongsTo` and `hasMany` associations; Decoy keeps
//! both sides of every relationship consistent as models are assigned,
//! saved, and destroyed.
//!
//! ```rust,ignore
//! use decoy::prelude::*;
//! use serde_json::json;
//!
//! decoy::init_logging("info");
//!
//! let definition = SchemaDefinition::new()
//!     .model(ModelDefinition::new("author").has_many("posts"))
//!     .model(ModelDefinition::new("post").belongs_to("author"));
//! let schema = Schema::from_definition(&definition, Db::new())?;
//!
//! let author = schema.create("author", json!({ "name": "Zelda" }))?;
//! author.create_related("posts", json!({ "title": "Lorem" }))?;
//! assert_eq!(schema.db().dump()["posts"][0]["authorId"], json!("1"));
//! ```

pub use decoy_core::{OrmError, OrmResult, ResultExt};
pub use decoy_db::{Db, DbConfig, IdentityStrategy};
pub use decoy_orm::{
    Association, Attrs, Collection, Model, ModelDefinition, Schema, SchemaDefinition,
};

use tracing_subscriber::EnvFilter;

/// Commonly used types
pub mod prelude {
    pub use decoy_core::{AssociationKind, ModelKey, OrmError, OrmResult, PolymorphicId, Record};
    pub use decoy_db::{Db, DbConfig, IdentityStrategy};
    pub use decoy_orm::{
        Association, AttrValue, Attrs, Collection, InverseSpec, Model, ModelDefinition,
        ResolvedAssociation, Schema, SchemaDefinition,
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a formatted `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `default_level`. Does nothing if a
/// global subscriber is already set.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Build a schema from a JSON definition file over an empty record store
pub fn schema_from_file(path: impl AsRef<std::path::Path>) -> OrmResult<Schema> {
    let definition = decoy_orm::load_definition(path)?;
    let schema = Schema::from_definition(&definition, Db::new())?;
    tracing::info!(models = definition.models.len(), "schema loaded");
    Ok(schema)
}
