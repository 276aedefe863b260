//! Durable key → JSON result cache with insert-if-absent semantics.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use keystone_core::errors::StorageError;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::schema::apply_schema;

/// Which simulation a cache row belongs to.
///
/// Keys are repository ranks (vaccination) or `nb_devs` values (policy).
/// Ranks are only stable across runs if the caller rebuilds the rank index
/// identically; the cache makes no attempt to detect a remapped index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Vaccination,
    Policy,
}

impl CacheKind {
    fn table(self) -> &'static str {
        match self {
            CacheKind::Vaccination => "vaccination_results",
            CacheKind::Policy => "policy_results",
        }
    }
}

/// Append-only key → JSON store backing resumable simulation batches.
///
/// `get` never computes; `put_if_absent` never overwrites. Values for a
/// given key are deterministic given identical inputs, so a lost insert
/// race is harmless.
pub struct ResultCache {
    conn: Connection,
}

impl ResultCache {
    /// Open (or create) a cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::SqliteError {
            message: e.to_string(),
        })?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory cache, for tests and one-shot runs.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::SqliteError {
            message: e.to_string(),
        })?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Read a cached value. A malformed JSON row is treated as a miss:
    /// the caller recomputes, and the row stays until a manual sweep.
    pub fn get<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        key: i64,
    ) -> Result<Option<T>, StorageError> {
        let sql = format!(
            "SELECT value_json FROM {} WHERE key = ?1",
            kind.table()
        );
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| StorageError::SqliteError {
                message: e.to_string(),
            })?;
        let row: Option<String> = stmt
            .query_row(params![key], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StorageError::SqliteError {
                    message: other.to_string(),
                }),
            })?;
        match row {
            None => Ok(None),
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(
                        table = kind.table(),
                        key, error = %e,
                        "corrupt cache row, treating as miss"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// Insert a value unless the key already exists.
    ///
    /// Returns `true` if the row was inserted, `false` if an earlier value
    /// won. Racing writers on the same key never error.
    pub fn put_if_absent<T: Serialize>(
        &self,
        kind: CacheKind,
        key: i64,
        value: &T,
    ) -> Result<bool, StorageError> {
        let json = serde_json::to_string(value).map_err(|e| StorageError::SerializationError {
            message: e.to_string(),
        })?;
        let sql = format!(
            "INSERT OR IGNORE INTO {} (key, value_json, inserted_at) VALUES (?1, ?2, ?3)",
            kind.table()
        );
        let inserted = self
            .conn
            .execute(&sql, params![key, json, unix_now()])
            .map_err(|e| StorageError::SqliteError {
                message: e.to_string(),
            })?;
        Ok(inserted > 0)
    }

    /// Number of cached rows for a kind.
    pub fn count(&self, kind: CacheKind) -> Result<i64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        self.conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| StorageError::SqliteError {
                message: e.to_string(),
            })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
