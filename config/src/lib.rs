//! Pool configuration for pxdb.
//!
//! Each pool is configured by one file in a configuration directory (YAML
//! or JSON). A record names the driver, connection details, the table
//! prefix, the connection limit, and optionally the tables the pool
//! declares:
//!
//! - [`PoolConfig`] — the raw file record.
//! - [`PoolSettings`] — a resolved pool with a parsed [`Driver`] and
//!   validated [`TableSpec`]s; [`PoolSettings::dsn`] renders its data source
//!   name.
//! - [`ConfigLoader`] / [`load_all`] — directory scanning, producing a
//!   [`ConfigSet`] with the default pool identified.
//!
//! [`Driver`]: pxdb_core::Driver
//! [`TableSpec`]: pxdb_core::TableSpec
//!
//! # Quick start
//!
//! ```no_run
//! use pxdb_config::load_all;
//!
//! let config = load_all("config/db/").unwrap();
//! let main = config.get(config.default_pool()).unwrap();
//! println!("{} declares {} tables", main.name, main.tables.len());
//! ```

mod error;
mod loader;
mod pool;

pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, ConfigSet, DEFAULT_POOL, load_all};
pub use pool::{DEFAULT_MAX_CONNECTIONS, MYSQL_DEFAULT_PORT, PoolConfig, PoolSettings};
