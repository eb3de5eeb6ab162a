//! Single database connections.
//!
//! A [`Connection`] wraps one lazily opened driver handle and runs the
//! prepare → execute → fetch cycle. Results are fetched eagerly into a row
//! buffer that [`Connection::has_next`] walks. `INSERT` statements record
//! the last insert id; every other statement records an affected-row count,
//! which is `-1` when the driver cannot report one.
//!
//! In dry-run mode, statements that would modify the database are still
//! compiled, so malformed SQL fails as it would in a real run, but they are
//! only recorded and logged, never executed. Reads (`SELECT`, `SHOW`,
//! `DESCRIBE`, `PRAGMA`) still run so callers can inspect the live schema.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pxdb_config::PoolSettings;
//! use pxdb_sql::{ConnectParams, Connection};
//!
//! let params = Arc::new(ConnectParams::from_settings(&PoolSettings::sqlite("main", "app.db")));
//! let mut conn = Connection::new(params);
//!
//! conn.query("SELECT name FROM sqlite_master WHERE type='table'").unwrap();
//! while conn.has_next() {
//!     println!("{}", conn.get_string("name").unwrap_or_default());
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use mysql::prelude::Queryable;
use pxdb_config::PoolSettings;
use pxdb_core::{Driver, TABLE_TOKEN};
use tracing::{debug, info};

use crate::error::{DbError, DriverError, Result};
use crate::value::{Row, Value};

/// Immutable parameters a connection is opened from.
///
/// Shared by every connection of a pool; growing the pool means creating a
/// new [`Connection`] from the same parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pool: String,
    driver: Driver,
    dsn: String,
    prefix: String,
    host: String,
    port: u16,
    user: String,
    pass: String,
    database: String,
}

impl ConnectParams {
    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self {
            pool: settings.name.clone(),
            driver: settings.driver,
            dsn: settings.dsn(),
            prefix: settings.prefix.clone(),
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            pass: settings.pass.clone(),
            database: settings.database.clone(),
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn open(&self) -> Result<Handle> {
        debug!(pool = %self.pool, dsn = %self.dsn, "opening connection");
        let connect_err = |source: DriverError| DbError::Connect {
            dsn: self.dsn.clone(),
            source,
        };
        match self.driver {
            Driver::Sqlite => {
                let conn = if self.database.is_empty() || self.database == ":memory:" {
                    rusqlite::Connection::open_in_memory()
                } else {
                    rusqlite::Connection::open(&self.database)
                };
                conn.map(Handle::Sqlite)
                    .map_err(|e| connect_err(e.into()))
            }
            Driver::MySql => {
                let mut opts = mysql::OptsBuilder::new().db_name(Some(&self.database));
                opts = if self.host.starts_with('/') {
                    opts.socket(Some(&self.host))
                } else {
                    opts.ip_or_hostname(Some(&self.host))
                };
                if self.port != 0 {
                    opts = opts.tcp_port(self.port);
                }
                if !self.user.is_empty() {
                    opts = opts.user(Some(&self.user)).pass(Some(&self.pass));
                }
                mysql::Conn::new(opts)
                    .map(Handle::MySql)
                    .map_err(|e| connect_err(e.into()))
            }
        }
    }
}

enum Handle {
    Sqlite(rusqlite::Connection),
    MySql(mysql::Conn),
}

struct Outcome {
    rows: VecDeque<Row>,
    row_count: i64,
    insert_id: Option<i64>,
}

impl Default for Outcome {
    fn default() -> Self {
        Self {
            rows: VecDeque::new(),
            row_count: -1,
            insert_id: None,
        }
    }
}

/// One database connection.
///
/// Not internally synchronized: a connection is used by one caller at a
/// time, which the pool enforces by leasing.
pub struct Connection {
    params: Arc<ConnectParams>,
    handle: Option<Handle>,
    locked: bool,
    dry: bool,
    sql: Option<String>,
    args: Vec<Value>,
    arg_log: Vec<String>,
    rows: VecDeque<Row>,
    current: Option<Row>,
    insert_id: Option<i64>,
    row_count: i64,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("pool", &self.params.pool)
            .field("dsn", &self.params.dsn)
            .field("open", &self.handle.is_some())
            .field("locked", &self.locked)
            .field("dry", &self.dry)
            .field("sql", &self.sql)
            .finish()
    }
}

impl Connection {
    /// Creates an unopened connection; the handle opens on first use.
    pub fn new(params: Arc<ConnectParams>) -> Self {
        Self {
            params,
            handle: None,
            locked: false,
            dry: false,
            sql: None,
            args: Vec::new(),
            arg_log: Vec::new(),
            rows: VecDeque::new(),
            current: None,
            insert_id: None,
            row_count: -1,
        }
    }

    pub fn params(&self) -> &Arc<ConnectParams> {
        &self.params
    }

    pub fn pool_name(&self) -> &str {
        &self.params.pool
    }

    pub fn driver(&self) -> Driver {
        self.params.driver
    }

    pub fn dsn(&self) -> &str {
        &self.params.dsn
    }

    pub fn prefix(&self) -> &str {
        &self.params.prefix
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Marks the connection as leased.
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Err(DbError::AlreadyLocked {
                pool: self.params.pool.clone(),
            });
        }
        self.clean(false);
        self.locked = true;
        Ok(())
    }

    /// Clears per-statement state, leaves dry-run, and unlocks.
    pub fn release(&mut self) {
        self.clean(false);
        self.dry = false;
        self.locked = false;
    }

    pub fn set_dry(&mut self, dry: bool) -> &mut Self {
        self.dry = dry;
        self
    }

    pub fn is_dry(&self) -> bool {
        self.dry
    }

    /// Replaces the `__TABLE__` placeholder with the pool's prefix.
    pub fn substitute(&self, sql: &str) -> String {
        sql.replace(TABLE_TOKEN, &self.params.prefix)
    }

    /// Substitutes the prefix and compiles the statement.
    ///
    /// Compilation errors surface as [`DbError::Query`] in dry-run mode too.
    pub fn prepare(&mut self, sql: &str) -> Result<&mut Self> {
        self.clean(false);
        let sql = self.substitute(sql);
        let handle = self.handle()?;
        compile(handle, &sql)?;
        self.sql = Some(sql);
        Ok(self)
    }

    /// Substitutes the prefix and records the statement without compiling it.
    ///
    /// For dry runs whose statements target tables that exist only in the
    /// previewed schema, where compiling against the database cannot succeed.
    pub fn prepare_unchecked(&mut self, sql: &str) -> &mut Self {
        self.clean(false);
        self.sql = Some(self.substitute(sql));
        self
    }

    /// Adds a positional parameter for the next execution.
    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.arg_log.push(format!("{}: {value}", value.kind()));
        self.args.push(value);
        self
    }

    /// Runs the prepared statement.
    ///
    /// In dry-run mode a modifying statement is logged and skipped.
    pub fn execute(&mut self) -> Result<&mut Self> {
        let sql = self.sql.clone().ok_or(DbError::NoStatement)?;
        self.rows.clear();
        self.current = None;
        self.insert_id = None;
        self.row_count = -1;

        if self.dry && !is_read_only(&sql) {
            info!(pool = %self.params.pool, sql = %sql, "dry run, statement not executed");
            return Ok(self);
        }

        debug!(pool = %self.params.pool, sql = %sql, args = self.args.len(), "executing");
        let args = std::mem::take(&mut self.args);
        let handle = self.handle()?;
        let outcome = run(handle, &sql, &args)?;
        self.rows = outcome.rows;
        self.row_count = outcome.row_count;
        self.insert_id = outcome.insert_id;
        Ok(self)
    }

    /// Prepares and executes in one step.
    pub fn query(&mut self, sql: &str) -> Result<&mut Self> {
        self.prepare(sql)?.execute()
    }

    /// Advances to the next buffered row.
    pub fn has_next(&mut self) -> bool {
        self.current = self.rows.pop_front();
        self.current.is_some()
    }

    /// Current row, after a successful [`has_next`](Self::has_next).
    pub fn row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    /// Drains every remaining row.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.current = None;
        self.rows.drain(..).collect()
    }

    fn column(&self, column: &str) -> Option<&Value> {
        self.current.as_ref()?.get(column)
    }

    /// Column of the current row as text; `None` when absent or NULL.
    pub fn get_string(&self, column: &str) -> Option<String> {
        self.column(column)?.to_text()
    }

    pub fn get_int(&self, column: &str) -> Option<i64> {
        self.column(column)?.to_int()
    }

    pub fn get_float(&self, column: &str) -> Option<f64> {
        self.column(column)?.to_float()
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.column(column)?.to_bool()
    }

    /// Id generated by the last executed `INSERT`.
    pub fn insert_id(&self) -> Option<i64> {
        self.insert_id
    }

    /// Rows affected by the last statement, or `-1` when unknown.
    pub fn row_count(&self) -> i64 {
        self.row_count
    }

    /// Last prepared statement, prefix already substituted.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Every argument bound since the last `clean(true)`.
    pub fn arg_log(&self) -> &[String] {
        &self.arg_log
    }

    /// Resets statement, rows and counts; `all` also clears the argument log.
    pub fn clean(&mut self, all: bool) {
        self.sql = None;
        self.args.clear();
        self.rows.clear();
        self.current = None;
        self.insert_id = None;
        self.row_count = -1;
        if all {
            self.arg_log.clear();
        }
    }

    fn handle(&mut self) -> Result<&mut Handle> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => self.params.open()?,
        };
        Ok(self.handle.insert(handle))
    }
}

fn query_err<E: Into<DriverError>>(sql: &str) -> impl FnOnce(E) -> DbError + '_ {
    move |e| DbError::Query {
        sql: sql.to_string(),
        source: e.into(),
    }
}

fn leading_keyword(sql: &str) -> String {
    sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// Statements that never modify data or schema.
pub(crate) fn is_read_only(sql: &str) -> bool {
    matches!(
        leading_keyword(sql).as_str(),
        "SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "PRAGMA"
    )
}

fn compile(handle: &mut Handle, sql: &str) -> Result<()> {
    match handle {
        Handle::Sqlite(conn) => {
            conn.prepare_cached(sql).map_err(query_err(sql))?;
        }
        Handle::MySql(conn) => {
            conn.prep(sql).map_err(query_err(sql))?;
        }
    }
    Ok(())
}

macro_rules! collect_mysql {
    ($result:expr, $sql:expr, $is_insert:expr) => {{
        let mut result = $result;
        let mut outcome = Outcome::default();
        let has_columns = !result.columns().as_ref().is_empty();
        for row in result.by_ref() {
            let row = row.map_err(query_err($sql))?;
            let columns = row
                .columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect();
            let values = (0..row.len())
                .map(|i| row.as_ref(i).cloned().map_or(Value::Null, Value::from))
                .collect();
            outcome.rows.push_back(Row::new(columns, values));
        }
        if !has_columns {
            outcome.row_count = i64::try_from(result.affected_rows()).unwrap_or(-1);
        }
        if $is_insert {
            outcome.insert_id = result.last_insert_id().and_then(|id| i64::try_from(id).ok());
        }
        outcome
    }};
}

fn run(handle: &mut Handle, sql: &str, args: &[Value]) -> Result<Outcome> {
    let is_insert = leading_keyword(sql) == "INSERT";
    match handle {
        Handle::Sqlite(conn) => {
            let mut outcome = Outcome::default();
            let mut stmt = conn.prepare_cached(sql).map_err(query_err(sql))?;
            let params =
                rusqlite::params_from_iter(args.iter().map(rusqlite::types::Value::from));
            if stmt.column_count() > 0 {
                let columns: Vec<String> =
                    stmt.column_names().into_iter().map(String::from).collect();
                let mut rows = stmt.query(params).map_err(query_err(sql))?;
                while let Some(row) = rows.next().map_err(query_err(sql))? {
                    let values = (0..columns.len())
                        .map(|i| row.get_ref(i).map(Value::from))
                        .collect::<rusqlite::Result<Vec<_>>>()
                        .map_err(query_err(sql))?;
                    outcome.rows.push_back(Row::new(columns.clone(), values));
                }
            } else {
                let changed = stmt.execute(params).map_err(query_err(sql))?;
                outcome.row_count = i64::try_from(changed).unwrap_or(-1);
                if is_insert {
                    outcome.insert_id = Some(conn.last_insert_rowid());
                }
            }
            Ok(outcome)
        }
        Handle::MySql(conn) => {
            if args.is_empty() {
                let result = conn.query_iter(sql).map_err(query_err(sql))?;
                Ok(collect_mysql!(result, sql, is_insert))
            } else {
                let params =
                    mysql::Params::Positional(args.iter().map(mysql::Value::from).collect());
                let result = conn.exec_iter(sql, params).map_err(query_err(sql))?;
                Ok(collect_mysql!(result, sql, is_insert))
            }
        }
    }
}
