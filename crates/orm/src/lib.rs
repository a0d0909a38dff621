//! # Decoy Orm
//!
//! Models, associations and inverse resolution over the Decoy record store.
//!
//! ## Core Concepts
//!
//! - **Schema**: Registered model types plus the shared record store
//! - **Association**: A declared `belongsTo` or `hasMany` relationship
//! - **Inverse**: The association on the other side that mirrors one
//! - **Model**: A handle to one record, with pending association changes
//! - **Collection**: An ordered list of models
//!
//! ## Example
//!
//! ```rust,ignore
//! use decoy_db::Db;
//! use decoy_orm::{ModelDefinition, Schema, SchemaDefinition};
//! use serde_json::json;
//!
//! let definition = SchemaDefinition::new()
//!     .model(ModelDefinition::new("author").has_many("posts"))
//!     .model(ModelDefinition::new("post").belongs_to("author"));
//! let schema = Schema::from_definition(&definition, Db::new())?;
//!
//! let author = schema.create("author", json!({ "name": "Zelda" }))?;
//! let post = author.create_related("posts", json!({ "title": "Lorem" }))?;
//! assert_eq!(post.attr("authorId"), json!("1"));
//! ```

pub mod association;
pub mod attrs;
pub mod collection;
pub mod definition;
pub mod model;
pub mod resolver;
pub mod schema;

// Re-export commonly used types at crate root
pub use association::{Association, InverseSpec, ResolvedAssociation};
pub use attrs::{AttrValue, Attrs};
pub use collection::Collection;
pub use definition::{
    ModelDefinition, SchemaDefinition, load_definition, load_definition_from_string,
};
pub use model::Model;
pub use resolver::{AssociationResolver, ModelClass};
pub use schema::Schema;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
