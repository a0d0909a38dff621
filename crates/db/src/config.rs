//! Record store configuration
//!
//! Configuration is plain serde data so it can sit next to fixtures in a
//! JSON file:
//!
//! ```json
//! { "defaultIdentity": "counter", "identities": { "sessions": "uuid" } }
//! ```

use crate::identity::{CounterIdentity, IdentityManager, UuidIdentity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// IdentityStrategy
// ============================================================================

/// How a collection allocates ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// Numeric ids as strings: "1", "2", ...
    #[default]
    Counter,
    /// Random v4 uuids
    Uuid,
}

impl IdentityStrategy {
    /// Build the identity manager for a collection
    pub fn build(&self, collection: &str) -> Box<dyn IdentityManager> {
        match self {
            IdentityStrategy::Counter => Box::new(CounterIdentity::new(collection)),
            IdentityStrategy::Uuid => Box::new(UuidIdentity::new(collection)),
        }
    }
}

impl std::fmt::Display for IdentityStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityStrategy::Counter => write!(f, "counter"),
            IdentityStrategy::Uuid => write!(f, "uuid"),
        }
    }
}

// ============================================================================
// DbConfig
// ============================================================================

/// Record store configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    /// Strategy used by collections without an override
    #[serde(default)]
    pub default_identity: IdentityStrategy,

    /// Per-collection strategy overrides, keyed by collection name
    #[serde(default)]
    pub identities: BTreeMap<String, IdentityStrategy>,
}

impl DbConfig {
    /// Create a configuration with counter ids everywhere
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default strategy
    pub fn with_default_identity(mut self, strategy: IdentityStrategy) -> Self {
        self.default_identity = strategy;
        self
    }

    /// Override the strategy for one collection
    pub fn with_identity(mut self, collection: impl Into<String>, strategy: IdentityStrategy) -> Self {
        self.identities.insert(collection.into(), strategy);
        self
    }

    /// Strategy that applies to a collection
    pub fn identity_for(&self, collection: &str) -> IdentityStrategy {
        self.identities
            .get(collection)
            .copied()
            .unwrap_or(self.default_identity)
    }
}

// ============================================================================
// Tests
// ============================================================================
