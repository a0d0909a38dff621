//! Fixture and snapshot files
//!
//! Fixtures are JSON objects mapping collection names to arrays of
//! records, the same shape `Db::dump` produces:
//!
//! ```json
//! { "authors": [{ "id": "1", "name": "Zelda" }], "posts": [] }
//! ```

use crate::db::Db;
use decoy_core::{OrmError, OrmResult};
use serde_json::{Map, Value};
use std::path::Path;

// ============================================================================
// Load Functions
// ============================================================================

/// Read fixture data from a JSON file
pub fn load_fixtures(path: impl AsRef<Path>) -> OrmResult<Map<String, Value>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| OrmError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    load_fixtures_from_string(&json).map_err(|e| match e {
        OrmError::Json(je) => OrmError::FileRead {
            path: path.to_path_buf(),
            message: format!("Invalid fixture file: {}", je),
        },
        other => other,
    })
}

/// Parse fixture data from a JSON string
pub fn load_fixtures_from_string(json: &str) -> OrmResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(data) => Ok(data),
        other => Err(OrmError::InvalidFixture(format!(
            "expected an object of collections, found {}",
            json_kind(&other)
        ))),
    }
}

/// Read a fixture file straight into a database
pub fn load_fixtures_into(db: &mut Db, path: impl AsRef<Path>) -> OrmResult<()> {
    let data = load_fixtures(path)?;
    db.load_data(&data)
}

// ============================================================================
// Save Functions
// ============================================================================

/// Write every collection of a database to a JSON file
pub fn save_snapshot(db: &Db, path: impl AsRef<Path>) -> OrmResult<()> {
    let path = path.as_ref();
    let json = save_snapshot_to_string(db)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| OrmError::FileWrite {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }
    }

    std::fs::write(path, json).map_err(|e| OrmError::FileWrite {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Serialize every collection of a database to pretty JSON
pub fn save_snapshot_to_string(db: &Db) -> OrmResult<String> {
    Ok(serde_json::to_string_pretty(&Value::Object(db.dump()))?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Tests
// ============================================================================
