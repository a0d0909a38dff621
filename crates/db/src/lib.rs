//! # Decoy Db
//!
//! The flat record store underneath the Decoy model layer.
//!
//! ## Core Concepts
//!
//! - **Db**: A set of named collections (`posts`, `blogPosts`)
//! - **DbCollection**: Ordered schema-less records keyed by string `id`
//! - **IdentityManager**: Per-collection id allocation and reservation
//! - **DbConfig**: Which identity strategy each collection uses
//!
//! Reads always return copies of the stored records.
//!

pub mod collection;
pub mod config;
pub mod db;
pub mod identity;
pub mod serialization;

// Re-export commonly used types at crate root
pub use collection::{DbCollection, Target, matches_attrs};
pub use config::{DbConfig, IdentityStrategy};
pub use db::Db;
pub use identity::{CounterIdentity, IdentityManager, UuidIdentity};
pub use serialization::{
    load_fixtures, load_fixtures_from_string, load_fixtures_into, save_snapshot,
    save_snapshot_to_string,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
