//! Declarative table schemas and their SQL rendering.
//!
//! This crate holds the pure, I/O-free half of pxdb:
//!
//! - [`FieldSpec`] — one column: type, size, nullability, default, and
//!   auto-increment/primary/unique flags, with a validate → fill → lock
//!   lifecycle.
//! - [`TableSpec`] — an ordered list of fields; [`TableSchema`] lets code
//!   declare a table once.
//! - [`FieldDecl`] / [`TableDecl`] — the serializable declaration form used
//!   in pool configuration files.
//! - [`Driver`] — MySQL or SQLite, rendering column DDL, `CREATE TABLE`,
//!   `ALTER TABLE` and introspection queries.
//! - [`check_field_needs_changes`] — the field diff driving reconciliation.
//!
//! # Example
//!
//! ```
//! use pxdb_core::*;
//!
//! let table = TableDecl {
//!     name: "users".into(),
//!     fields: vec![
//!         FieldDecl::new("id", "increment"),
//!         FieldDecl::new("name", "varchar"),
//!     ],
//! }
//! .to_spec()
//! .unwrap();
//!
//! let create = Driver::Sqlite.create_table_sql(table.name(), table.first_field().unwrap());
//! assert!(create.contains("AUTOINCREMENT"));
//!
//! let add = Driver::Sqlite.add_field_sql("users", &table.fields()[1], Some("id")).unwrap();
//! assert_eq!(add[0], "ALTER TABLE `__TABLE__users` ADD COLUMN `name` VARCHAR(255) NOT NULL DEFAULT ''");
//! ```

mod decl;
mod dialect;
mod diff;
mod error;
mod field;
mod table;
mod types;
mod validate;

pub use decl::{FieldDecl, Scalar, TableDecl};
pub use dialect::{quote_ident, quote_literal, quote_table, rebuild_table_name};
pub use diff::{FieldChange, check_field_needs_changes};
pub use error::{Result, SpecError};
pub use field::FieldSpec;
pub use table::{TableSchema, TableSpec};
pub use types::{Driver, FieldType, TABLE_TOKEN};
pub use validate::{ValidationError, validate_name};
