//! The record store
//!
//! `Db` owns every named collection and the identity manager of each. It is
//! the single shared mutable resource of a schema; models only ever hold
//! copies of its rows.

use crate::collection::DbCollection;
use crate::config::DbConfig;
use decoy_core::{OrmError, OrmResult, Record};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============================================================================
// Db
// ============================================================================

/// An in-memory database of named collections
#[derive(Debug, Default)]
pub struct Db {
    config: DbConfig,
    collections: BTreeMap<String, DbCollection>,
}

impl Db {
    /// Create an empty database with counter ids
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty database with the given configuration
    pub fn with_config(config: DbConfig) -> Self {
        Self {
            config,
            collections: BTreeMap::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    // ========================================================================
    // Collection Management
    // ========================================================================

    /// Create a collection if it does not exist yet
    pub fn create_collection(&mut self, name: &str) -> &mut DbCollection {
        let strategy = self.config.identity_for(name);
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| DbCollection::new(name, strategy.build(name)))
    }

    /// Check if a collection exists
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Get a collection by name
    pub fn collection(&self, name: &str) -> OrmResult<&DbCollection> {
        self.collections
            .get(name)
            .ok_or_else(|| OrmError::CollectionNotFound(name.to_string()))
    }

    /// Get a mutable collection by name
    pub fn collection_mut(&mut self, name: &str) -> OrmResult<&mut DbCollection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| OrmError::CollectionNotFound(name.to_string()))
    }

    /// Names of every collection, sorted
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    // ========================================================================
    // Bulk Data
    // ========================================================================

    /// Load `{ collectionName: [records] }` data, creating collections as needed
    pub fn load_data(&mut self, data: &Map<String, Value>) -> OrmResult<()> {
        for (name, records) in data {
            let records = records.as_array().ok_or_else(|| {
                OrmError::InvalidFixture(format!("'{}' must be an array of records", name))
            })?;
            let records = records
                .iter()
                .map(|r| {
                    r.as_object().cloned().ok_or_else(|| {
                        OrmError::InvalidFixture(format!("'{}' contains a non-object record", name))
                    })
                })
                .collect::<OrmResult<Vec<Record>>>()?;

            let count = records.len();
            self.create_collection(name).insert_many(records)?;
            tracing::info!(collection = %name, count, "loaded records");
        }
        Ok(())
    }

    /// Dump every collection as `{ collectionName: [records] }`
    pub fn dump(&self) -> Map<String, Value> {
        self.collections
            .iter()
            .map(|(name, collection)| {
                let records = collection.all().into_iter().map(Value::Object).collect();
                (name.clone(), Value::Array(records))
            })
            .collect()
    }

    /// Remove every record from every collection, keeping the collections
    pub fn empty_data(&mut self) {
        for collection in self.collections.values_mut() {
            collection.clear();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityStrategy;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_create_collection_is_idempotent() {
        let mut db = Db::new();
        db.create_collection("posts")
            .insert(Map::new())
            .unwrap();
        db.create_collection("posts");
        assert_eq!(db.collection("posts").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_collection() {
        let db = Db::new();
        let err = db.collection("ghosts").unwrap_err();
        assert!(err.is_lookup());
    }

    #[test]
    fn test_load_and_dump() {
        let mut db = Db::new();
        let data = json!({
            "authors": [{ "id": 1, "name": "Zelda" }],
            "posts": [{ "title": "Lorem", "authorId": "1" }]
        });
        db.load_data(data.as_object().unwrap()).unwrap();

        assert_eq!(
            Value::Object(db.dump()),
            json!({
                "authors": [{ "id": "1", "name": "Zelda" }],
                "posts": [{ "id": "1", "title": "Lorem", "authorId": "1" }]
            })
        );
        assert_eq!(db.collection_names(), vec!["authors", "posts"]);
    }

    #[test]
    fn test_load_rejects_bad_shape() {
        let mut db = Db::new();
        let err = db.load_data(json!({ "posts": { "id": 1 } }).as_object().unwrap());
        assert!(matches!(err, Err(OrmError::InvalidFixture(_))));
    }

    #[test]
    fn test_empty_data_resets_identity() {
        let mut db = Db::new();
        db.load_data(json!({ "posts": [{}, {}] }).as_object().unwrap())
            .unwrap();
        db.empty_data();
        assert!(db.collection("posts").unwrap().is_empty());
        let record = db.collection_mut("posts").unwrap().insert(Map::new()).unwrap();
        assert_eq!(record["id"], json!("1"));
    }

    #[test]
    fn test_configured_identity_strategy() {
        let mut db = Db::with_config(DbConfig::new().with_identity("sessions", IdentityStrategy::Uuid));
        let record = db.create_collection("sessions").insert(Map::new()).unwrap();
        assert_eq!(record["id"].as_str().unwrap().len(), 36);
    }
}
