//! Database access and schema reconciliation for pxdb.
//!
//! - [`Connection`] — one lazily opened rusqlite or mysql handle with a
//!   prepare → execute → fetch cycle, bound parameters, dry-run and
//!   `__TABLE__` prefix substitution.
//! - [`Pool`] / [`PoolRegistry`] — bounded connection leasing per named
//!   database, loaded from a configuration directory.
//! - [`SchemaIntrospector`] — reads the live schema back (`DESCRIBE` on
//!   MySQL, parsed `CREATE TABLE` text on SQLite).
//! - [`SchemaReconciler`] — creates missing tables and adds or changes
//!   fields until the database matches the declared [`TableSpec`]s.
//! - [`export_table`] / [`import_table`] — checksummed JSON table dumps.
//!
//! # Example
//!
//! ```no_run
//! use pxdb_sql::{PoolRegistry, SchemaReconciler};
//!
//! let registry = PoolRegistry::load_all("config/db").unwrap();
//! let pool = registry.default_pool().unwrap();
//!
//! let report = SchemaReconciler::new(pool).dry_run(true).reconcile_all().unwrap();
//! for line in &report.messages {
//!     println!("{line}");
//! }
//! ```
//!
//! [`TableSpec`]: pxdb_core::TableSpec

mod connection;
mod error;
mod introspect;
mod pool;
mod reconcile;
mod transfer;
mod value;

pub use connection::{ConnectParams, Connection};
pub use error::{DbError, DriverError, Result};
pub use introspect::{
    LiveTable, MySqlIntrospector, SchemaCache, SchemaIntrospector, SqliteIntrospector,
    StoredDefinition, introspector_for, parse_create_table,
};
pub use pool::{Pool, PoolRegistry, PooledConnection};
pub use reconcile::{
    DEFAULT_MAX_PASSES, FieldCheck, FieldStatus, ReconcileReport, SchemaReconciler, TableCheck,
};
pub use transfer::{
    EXPORT_FORMAT, EXPORT_VERSION, TableExport, export_table, import_table, read_export,
    rows_checksum,
};
pub use value::{Row, Value};
