//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored column could not be decoded into its domain type.
    #[error("Corrupt value in column '{column}': {reason}")]
    Decode { column: &'static str, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// True when SQLite reported the database as busy or locked by another
    /// writer. These are the only errors worth retrying.
    pub fn is_busy(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// True when an insert collided with an existing primary or unique key.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> DatabaseError {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            Some("simulated".to_string()),
        ))
    }

    #[test]
    fn test_busy_and_locked_are_retriable() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_busy());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_busy());
    }

    #[test]
    fn test_other_failures_are_not_retriable() {
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT).is_busy());
        assert!(!DatabaseError::LockPoisoned.is_busy());
    }

    #[test]
    fn test_constraint_violation_detected() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_constraint_violation());
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_constraint_violation());
    }
}
