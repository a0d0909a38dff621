//! Identity registry
//!
//! Every record store collection owns one identity manager. It hands out
//! fresh ids and remembers externally supplied ones so they are never
//! handed out twice.

use decoy_core::{OrmError, OrmResult};
use std::collections::HashSet;
use uuid::Uuid;

// ============================================================================
// IdentityManager Trait
// ============================================================================

/// Allocates and reserves ids for one collection
pub trait IdentityManager: std::fmt::Debug {
    /// Allocate a fresh id
    fn fetch(&mut self) -> String;

    /// Reserve an externally supplied id
    ///
    /// Fails with `OrmError::DuplicateId` if the id was already used.
    fn set(&mut self, id: &str) -> OrmResult<()>;

    /// Forget every allocated id
    fn reset(&mut self);
}

// ============================================================================
// CounterIdentity
// ============================================================================

/// Monotonic numeric ids rendered as strings ("1", "2", ...)
///
/// Reserving a numeric id at or past the counter advances the counter, so
/// loading `{ id: "10" }` makes the next fetched id "11".
#[derive(Debug, Clone)]
pub struct CounterIdentity {
    collection: String,
    next_id: u64,
    used: HashSet<String>,
}

impl CounterIdentity {
    /// Create a new counter for a collection
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            next_id: 1,
            used: HashSet::new(),
        }
    }

    /// Peek at the id the next `fetch` will try
    pub fn peek(&self) -> u64 {
        self.next_id
    }
}

impl IdentityManager for CounterIdentity {
    fn fetch(&mut self) -> String {
        // Ids reserved through `set` are skipped
        loop {
            let id = self.next_id.to_string();
            self.next_id += 1;
            if self.used.insert(id.clone()) {
                return id;
            }
        }
    }

    fn set(&mut self, id: &str) -> OrmResult<()> {
        if !self.used.insert(id.to_string()) {
            return Err(OrmError::DuplicateId {
                collection: self.collection.clone(),
                id: id.to_string(),
            });
        }
        // The largest id leaves the counter where it is
        if let Some(next) = id.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
            if next > self.next_id {
                self.next_id = next;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.next_id = 1;
        self.used.clear();
    }
}

// ============================================================================
// UuidIdentity
// ============================================================================

/// Random v4 uuid ids
#[derive(Debug, Clone)]
pub struct UuidIdentity {
    collection: String,
    used: HashSet<String>,
}

impl UuidIdentity {
    /// Create a new uuid allocator for a collection
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            used: HashSet::new(),
        }
    }
}

impl IdentityManager for UuidIdentity {
    fn fetch(&mut self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.used.insert(id.clone()) {
                return id;
            }
        }
    }

    fn set(&mut self, id: &str) -> OrmResult<()> {
        if !self.used.insert(id.to_string()) {
            return Err(OrmError::DuplicateId {
                collection: self.collection.clone(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.used.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_fetch_is_monotonic() {
        let mut ids = CounterIdentity::new("posts");
        assert_eq!(ids.fetch(), "1");
        assert_eq!(ids.fetch(), "2");
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_counter_set_advances_past_numeric_ids() {
        let mut ids = CounterIdentity::new("posts");
        ids.set("10").unwrap();
        assert_eq!(ids.fetch(), "11");
    }

    #[test]
    fn test_counter_set_rejects_duplicates() {
        let mut ids = CounterIdentity::new("posts");
        let first = ids.fetch();
        let err = ids.set(&first).unwrap_err();
        assert!(err.is_identity());
    }

    #[test]
    fn test_counter_skips_reserved_ids() {
        let mut ids = CounterIdentity::new("posts");
        ids.set("abc").unwrap();
        ids.set("1").unwrap();
        assert_eq!(ids.fetch(), "2");
    }

    #[test]
    fn test_counter_set_largest_id() {
        let mut ids = CounterIdentity::new("posts");
        ids.set(&u64::MAX.to_string()).unwrap();
        assert_eq!(ids.peek(), 1);
        assert_eq!(ids.fetch(), "1");
        assert!(ids.set(&u64::MAX.to_string()).unwrap_err().is_identity());
    }

    #[test]
    fn test_counter_reset() {
        let mut ids = CounterIdentity::new("posts");
        ids.fetch();
        ids.fetch();
        ids.reset();
        assert_eq!(ids.fetch(), "1");
    }

    #[test]
    fn test_uuid_identity() {
        let mut ids = UuidIdentity::new("users");
        let id = ids.fetch();
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(ids.set(&id).is_err());
        ids.reset();
        assert!(ids.set(&id).is_ok());
    }
}
