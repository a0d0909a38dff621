//! Record store collections
//!
//! A `DbCollection` is an ordered list of schema-less records keyed by a
//! string `id`. Every read returns copies so callers can never alias the
//! stored rows.

use crate::identity::IdentityManager;
use decoy_core::{OrmError, OrmResult, Record, normalize_id, record_id};
use serde_json::Value;

// ============================================================================
// Target
// ============================================================================

/// Selects the records an `update` or `remove` applies to
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Every record in the collection
    All,
    /// The record with this id
    Id(String),
    /// Every record whose id is in the list
    Ids(Vec<String>),
    /// Every record whose attributes equal all of these
    Attrs(Record),
}

impl Target {
    /// Target a single id
    pub fn id(id: impl Into<String>) -> Self {
        Target::Id(id.into())
    }

    fn matches(&self, record: &Record) -> bool {
        match self {
            Target::All => true,
            Target::Id(id) => record_id(record).as_deref() == Some(id.as_str()),
            Target::Ids(ids) => record_id(record).is_some_and(|rid| ids.contains(&rid)),
            Target::Attrs(query) => matches_attrs(record, query),
        }
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Target::Id(id.to_string())
    }
}

impl From<String> for Target {
    fn from(id: String) -> Self {
        Target::Id(id)
    }
}

/// Check whether a record carries every attribute in the query
pub fn matches_attrs(record: &Record, query: &Record) -> bool {
    query.iter().all(|(key, expected)| {
        let actual = record.get(key).unwrap_or(&Value::Null);
        if key == "id" {
            return normalize_id(actual) == normalize_id(expected);
        }
        actual == expected
    })
}

// ============================================================================
// DbCollection
// ============================================================================

/// One named collection of records
#[derive(Debug)]
pub struct DbCollection {
    name: String,
    records: Vec<Record>,
    identity: Box<dyn IdentityManager>,
}

impl DbCollection {
    /// Create an empty collection using the given identity manager
    pub fn new(name: impl Into<String>, identity: Box<dyn IdentityManager>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            identity,
        }
    }

    /// Collection name (e.g. "blogPosts")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert one record, assigning an id if it has none
    ///
    /// Numeric ids are stored as strings. Returns a copy of the stored record.
    pub fn insert(&mut self, mut record: Record) -> OrmResult<Record> {
        let supplied = record.get("id").filter(|v| !v.is_null()).cloned();
        let id = match supplied {
            Some(value) => {
                let id = normalize_id(&value).ok_or_else(|| {
                    OrmError::invalid_value(&self.name, "id", format!("{} is not a valid id", value))
                })?;
                self.identity.set(&id)?;
                id
            }
            None => self.identity.fetch(),
        };
        record.insert("id".to_string(), Value::String(id));
        tracing::trace!(collection = %self.name, record = ?record, "insert");
        self.records.push(record.clone());
        Ok(record)
    }

    /// Insert several records in order
    pub fn insert_many(&mut self, records: Vec<Record>) -> OrmResult<Vec<Record>> {
        records.into_iter().map(|r| self.insert(r)).collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every record, in insertion order
    pub fn all(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// Find a record by id
    pub fn find(&self, id: &str) -> Option<Record> {
        self.records
            .iter()
            .find(|r| record_id(r).as_deref() == Some(id))
            .cloned()
    }

    /// Find the records for a list of ids, in the order of the list
    ///
    /// Ids without a record are skipped.
    pub fn find_many(&self, ids: &[String]) -> Vec<Record> {
        ids.iter().filter_map(|id| self.find(id)).collect()
    }

    /// First record matching every attribute in the query
    pub fn find_by(&self, query: &Record) -> Option<Record> {
        self.records
            .iter()
            .find(|r| matches_attrs(r, query))
            .cloned()
    }

    /// Records matching every attribute in the query
    pub fn where_attrs(&self, query: &Record) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| matches_attrs(r, query))
            .cloned()
            .collect()
    }

    /// Records accepted by a predicate
    pub fn where_fn(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Find the first record matching the query, or insert the query as a new record
    pub fn first_or_create(&mut self, query: Record) -> OrmResult<Record> {
        match self.find_by(&query) {
            Some(record) => Ok(record),
            None => self.insert(query),
        }
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Merge attributes into every targeted record
    ///
    /// Changing a record's id is rejected; an `id` equal to the current one
    /// is ignored. Returns copies of the updated records.
    pub fn update(&mut self, target: &Target, attrs: &Record) -> OrmResult<Vec<Record>> {
        let requested_id = attrs.get("id").and_then(normalize_id);
        let mut updated = Vec::new();

        for record in self.records.iter_mut().filter(|r| target.matches(r)) {
            let current_id = record_id(record).unwrap_or_default();
            if let Some(requested) = &requested_id {
                if *requested != current_id {
                    return Err(OrmError::ImmutableId {
                        model: self.name.clone(),
                        id: current_id,
                    });
                }
            }
            for (key, value) in attrs.iter().filter(|(k, _)| k.as_str() != "id") {
                record.insert(key.clone(), value.clone());
            }
            tracing::trace!(collection = %self.name, id = %current_id, "update");
            updated.push(record.clone());
        }

        Ok(updated)
    }

    /// Update a single record by id
    ///
    /// Fails with a lookup error when the record does not exist.
    pub fn update_one(&mut self, id: &str, attrs: &Record) -> OrmResult<Record> {
        self.update(&Target::id(id), attrs)?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found(&self.name, id))
    }

    /// Remove every targeted record, returning how many were removed
    pub fn remove(&mut self, target: &Target) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !target.matches(r));
        let removed = before - self.records.len();
        tracing::trace!(collection = %self.name, removed, "remove");
        removed
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Reserve an id without inserting a record
    pub fn reserve_id(&mut self, id: &str) -> OrmResult<()> {
        self.identity.set(id)
    }

    /// Allocate the next id without inserting a record
    pub fn next_id(&mut self) -> String {
        self.identity.fetch()
    }

    /// Remove every record and reset the identity manager
    pub fn clear(&mut self) {
        self.records.clear();
        self.identity.reset();
    }
}

// ============================================================================
// Tests
// ============================================================================
