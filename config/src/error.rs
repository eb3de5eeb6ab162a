//! Error types for configuration loading.

use std::path::PathBuf;

use pxdb_core::SpecError;
use thiserror::Error;

/// Errors raised while reading pool configuration or resolving a pool.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or directory could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON pool file failed to parse.
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// YAML pool file failed to parse.
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Pool file has no `driver` entry.
    #[error("{}: missing driver", path.display())]
    MissingDriver { path: PathBuf },

    /// Driver, pool name or declared table is invalid.
    #[error("pool '{pool}': {source}")]
    InvalidPool { pool: String, source: SpecError },

    /// Table prefix contains characters other than alphanumerics and `_`.
    #[error("pool '{pool}': invalid prefix '{prefix}': must contain only alphanumeric characters and underscores")]
    InvalidPrefix { pool: String, prefix: String },

    /// `max_connections` is zero.
    #[error("pool '{0}': max_connections must be at least 1")]
    InvalidMaxConnections(String),

    /// Two files configure the same pool name.
    #[error("pool '{0}' is configured more than once")]
    DuplicatePool(String),

    /// No pool with this name is configured.
    #[error("unknown pool: {0}")]
    UnknownPool(String),
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
