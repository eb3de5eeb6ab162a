//! Pool configuration records.
//!
//! A [`PoolConfig`] is the raw content of one pool file; absent entries
//! default to empty or zero. Resolving it yields [`PoolSettings`], with the
//! driver parsed, the pool named, declared tables validated and SQLite paths
//! made absolute.
//!
//! # Example YAML
//!
//! ```yaml
//! driver: mysql
//! host: db.internal
//! port: 3307
//! user: app
//! pass: secret
//! database: shop
//! prefix: shop_
//! max_connections: 8
//! tables:
//!   - name: orders
//!     fields:
//!       - { name: id, type: increment }
//!       - { name: total, type: decimal, size: "12,2" }
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use pxdb_core::{Driver, SpecError, TableDecl, TableSpec, validate_name};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Connections a pool may open when the file does not say.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// MySQL's default port, omitted from DSNs.
pub const MYSQL_DEFAULT_PORT: u16 = 3306;

/// Raw pool file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool name; the file stem is used when absent.
    pub name: Option<String>,
    pub driver: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Database name (MySQL) or database file path (SQLite).
    pub database: String,
    /// Prefix substituted for `__TABLE__` in every statement.
    pub prefix: String,
    pub max_connections: usize,
    /// Tables this pool declares, in reconciliation order.
    pub tables: Vec<TableDecl>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: None,
            driver: None,
            host: String::new(),
            port: 0,
            user: String::new(),
            pass: String::new(),
            database: String::new(),
            prefix: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            tables: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// Reads a `.json`, `.yml` or `.yaml` pool file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);

        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_reader(reader).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Resolves the record into [`PoolSettings`].
    ///
    /// `fallback_name` names the pool when the record does not, `data_dir`
    /// anchors relative SQLite paths, and `path` is only used in errors.
    pub fn resolve(self, fallback_name: &str, data_dir: &Path, path: &Path) -> Result<PoolSettings> {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let invalid = |source: SpecError| ConfigError::InvalidPool {
            pool: name.clone(),
            source,
        };

        validate_name(&name).map_err(|e| invalid(e.into()))?;
        let driver = match self.driver.as_deref() {
            Some(driver) if !driver.trim().is_empty() => driver.parse::<Driver>().map_err(invalid)?,
            _ => {
                return Err(ConfigError::MissingDriver {
                    path: path.to_path_buf(),
                });
            }
        };
        if !self.prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidPrefix {
                pool: name.clone(),
                prefix: self.prefix,
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(name.clone()));
        }

        let mut tables: Vec<TableSpec> = Vec::with_capacity(self.tables.len());
        for decl in &self.tables {
            let table = decl.to_spec().map_err(invalid)?;
            if tables.iter().any(|t| t.name() == table.name()) {
                return Err(invalid(
                    pxdb_core::ValidationError::DuplicateTable(table.name().to_string()).into(),
                ));
            }
            tables.push(table);
        }

        let database = match driver {
            Driver::Sqlite => resolve_sqlite_path(&self.database, data_dir),
            Driver::MySql => self.database,
        };

        Ok(PoolSettings {
            name,
            driver,
            host: self.host,
            port: self.port,
            user: self.user,
            pass: self.pass,
            database,
            prefix: self.prefix,
            max_connections: self.max_connections,
            tables,
        })
    }
}

fn resolve_sqlite_path(database: &str, data_dir: &Path) -> String {
    if database.is_empty() || database == ":memory:" {
        return database.to_string();
    }
    let path = Path::new(database);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    };
    std::path::absolute(&joined)
        .unwrap_or(joined)
        .to_string_lossy()
        .into_owned()
}

/// A resolved pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub name: String,
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Database name, or the absolute database file path for SQLite.
    pub database: String,
    pub prefix: String,
    pub max_connections: usize,
    pub tables: Vec<TableSpec>,
}

impl PoolSettings {
    /// Settings for a SQLite pool at `path` with no declared tables.
    pub fn sqlite(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            driver: Driver::Sqlite,
            host: String::new(),
            port: 0,
            user: String::new(),
            pass: String::new(),
            database: path.into().to_string_lossy().into_owned(),
            prefix: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            tables: Vec::new(),
        }
    }

    /// Data source name identifying the database.
    ///
    /// # Examples
    ///
    /// ```
    /// use pxdb_config::PoolSettings;
    /// use pxdb_core::Driver;
    ///
    /// let mut settings = PoolSettings::sqlite("main", "/var/lib/app/main.db");
    /// assert_eq!(settings.dsn(), "sqlite:/var/lib/app/main.db");
    ///
    /// settings.driver = Driver::MySql;
    /// settings.host = "db.internal".into();
    /// settings.port = 3306;
    /// settings.database = "shop".into();
    /// assert_eq!(settings.dsn(), "mysql:host=db.internal;dbname=shop;charset=utf8mb4");
    ///
    /// settings.host = "/run/mysqld/mysqld.sock".into();
    /// assert_eq!(
    ///     settings.dsn(),
    ///     "mysql:unix_socket=/run/mysqld/mysqld.sock;dbname=shop;charset=utf8mb4"
    /// );
    /// ```
    pub fn dsn(&self) -> String {
        match self.driver {
            Driver::Sqlite => format!("sqlite:{}", self.database),
            Driver::MySql => {
                let mut dsn = if self.host.starts_with('/') {
                    format!("mysql:unix_socket={}", self.host)
                } else {
                    let mut dsn = format!("mysql:host={}", self.host);
                    if self.port != 0 && self.port != MYSQL_DEFAULT_PORT {
                        dsn.push_str(&format!(";port={}", self.port));
                    }
                    dsn
                };
                dsn.push_str(&format!(";dbname={};charset=utf8mb4", self.database));
                dsn
            }
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(yaml: &str) -> Result<PoolSettings> {
        let config: PoolConfig = serde_yaml::from_str(yaml).unwrap();
        config.resolve("fallback", Path::new("/data"), Path::new("fallback.yml"))
    }

    #[test]
    fn test_absent_fields_default() {
        let settings = resolve("driver: mysql\n").unwrap();
        assert_eq!(settings.name, "fallback");
        assert_eq!(settings.host, "");
        assert_eq!(settings.port, 0);
        assert_eq!(settings.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(settings.tables.is_empty());
    }

    #[test]
    fn test_missing_driver() {
        let err = resolve("host: localhost\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingDriver { .. }));
    }

    #[test]
    fn test_unsupported_driver() {
        let err = resolve("driver: postgres\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPool {
                source: SpecError::UnsupportedDriver { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_mysql_port_in_dsn() {
        let settings = resolve("driver: mysql\nhost: db\nport: 3307\ndatabase: app\n").unwrap();
        assert_eq!(settings.dsn(), "mysql:host=db;port=3307;dbname=app;charset=utf8mb4");
    }

    #[test]
    fn test_sqlite_relative_path_uses_data_dir() {
        let settings = resolve("driver: sqlite\ndatabase: app.db\n").unwrap();
        assert_eq!(settings.database, "/data/app.db");
        assert_eq!(settings.dsn(), "sqlite:/data/app.db");
    }

    #[test]
    fn test_invalid_prefix() {
        let err = resolve("driver: sqlite\nprefix: \"app-\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrefix { .. }));
    }

    #[test]
    fn test_declared_tables_are_validated() {
        let yaml = r#"
driver: sqlite
tables:
  - name: users
    fields:
      - { name: id, type: increment }
      - { name: email, type: varchar, size: 190 }
"#;
        let settings = resolve(yaml).unwrap();
        let users = settings.table("users").unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users.field("email").unwrap().size(), Some("190"));

        let bad = "driver: sqlite\ntables:\n  - name: users\n    fields:\n      - { name: id, type: uuid }\n";
        assert!(matches!(resolve(bad), Err(ConfigError::InvalidPool { .. })));
    }
}
