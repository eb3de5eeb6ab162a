//! Error types for database operations.
//!
//! [`DbError`] covers every failure surfaced by connections, pools,
//! introspection, reconciliation and table transfer. Driver failures always
//! carry the SQL text that triggered them.

use std::path::PathBuf;

use pxdb_config::ConfigError;
use pxdb_core::SpecError;
use thiserror::Error;

/// Failure reported by the underlying database driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    MySql(#[from] mysql::Error),
}

/// Errors that can occur while talking to a database.
#[derive(Debug, Error)]
pub enum DbError {
    /// Invalid spec, locked spec, or driver without a mapping.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// Unknown pool or invalid pool configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every connection is leased and the pool is at its limit.
    #[error("pool '{pool}' exhausted: all {max} connections are leased")]
    ResourceExhausted { pool: String, max: usize },

    /// A connection was locked twice.
    #[error("connection to pool '{pool}' is already locked")]
    AlreadyLocked { pool: String },

    /// The database could not be opened.
    #[error("cannot connect to {dsn}: {source}")]
    Connect { dsn: String, source: DriverError },

    /// Statement failed to prepare or execute.
    #[error("query failed: {source}\n  SQL: {sql}")]
    Query { sql: String, source: DriverError },

    /// `execute` was called with nothing prepared.
    #[error("no statement prepared")]
    NoStatement,

    /// Stored table definition could not be understood.
    #[error("cannot parse schema of table '{table}' at: {fragment}")]
    SchemaParse { table: String, fragment: String },

    /// A reconciliation step failed; earlier statements stay applied.
    #[error("schema update failed at {pool}:{table}:{field}: {source}")]
    Schema {
        pool: String,
        table: String,
        field: String,
        source: Box<DbError>,
    },

    /// Reconciliation kept finding changes.
    #[error("{pool}:{table} did not converge after {passes} passes")]
    NotConverged {
        pool: String,
        table: String,
        passes: usize,
    },

    /// Table is not present in the live database.
    #[error("table {pool}:{table} does not exist")]
    MissingTable { pool: String, table: String },

    /// Export file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Export file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export file is not a table export.
    #[error("{} is not a table export: {reason}", path.display())]
    InvalidExport { path: PathBuf, reason: String },

    /// Export rows do not match their recorded checksum.
    #[error("checksum mismatch in {}: expected {expected}, found {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl From<pxdb_core::ValidationError> for DbError {
    fn from(err: pxdb_core::ValidationError) -> Self {
        Self::Spec(err.into())
    }
}

/// Convenience alias for results with [`DbError`].
pub type Result<T> = std::result::Result<T, DbError>;
