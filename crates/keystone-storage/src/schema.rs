//! Result cache schema — one table per simulation kind.

use keystone_core::errors::StorageError;
use rusqlite::Connection;

/// Idempotent DDL. One table per simulation kind, identical layout:
/// integer key, JSON value, insertion timestamp. Inserts always go through
/// INSERT OR IGNORE, so a key is written at most once.
pub const SCHEMA_SQL: &str = r#"
-- Vaccination simulations: key = repository rank.
CREATE TABLE IF NOT EXISTS vaccination_results (
    key INTEGER PRIMARY KEY,
    value_json TEXT NOT NULL,
    inserted_at INTEGER NOT NULL
) STRICT;

-- Policy simulations: key = injected developer count (nb_devs).
CREATE TABLE IF NOT EXISTS policy_results (
    key INTEGER PRIMARY KEY,
    value_json TEXT NOT NULL,
    inserted_at INTEGER NOT NULL
) STRICT;
"#;

/// Apply the schema to a connection. Safe to call on every open.
pub fn apply_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| StorageError::SqliteError {
            message: e.to_string(),
        })
}
