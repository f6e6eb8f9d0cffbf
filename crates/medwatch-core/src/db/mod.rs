//! Database layer for medwatch.

mod schema;
mod drugs;
mod prescriptions;
mod side_effects;
mod interactions;
mod alerts;

pub use schema::SCHEMA;
pub use side_effects::SideEffectFilter;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Unrecognized timestamp: {0}")]
    Timestamp(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Cheap connectivity probe, used by the orchestrator before a pass.
    pub fn ping(&self) -> DbResult<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

/// Canonical timestamp encoding for storage: RFC 3339 UTC with millisecond
/// precision, so stored values compare lexicographically.
pub fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize any accepted timestamp representation into `DateTime<Utc>`.
///
/// This is the single point where storage timestamp shapes are interpreted:
/// RFC 3339 (what this layer writes) and SQLite's `datetime('now')` form are
/// accepted, anything else is an error. Analytics code never branches on
/// timestamp shape.
pub fn normalize_timestamp(raw: &str) -> DbResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    Err(DbError::Timestamp(raw.to_string()))
}
