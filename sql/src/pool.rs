//! Connection pools and the pool registry.
//!
//! A [`Pool`] owns up to `max_connections` connections to one database.
//! It starts with a single unopened connection and grows on demand: when
//! every connection is leased, a new one is created from the shared
//! [`ConnectParams`]. Leasing never waits. A full pool fails immediately
//! with [`DbError::ResourceExhausted`].
//!
//! Leased connections come back through [`PooledConnection`]'s `Drop`.
//!
//! ```no_run
//! use pxdb_config::PoolSettings;
//! use pxdb_sql::Pool;
//!
//! let pool = Pool::new(&PoolSettings::sqlite("main", "app.db"));
//! let mut conn = pool.lease().unwrap();
//! conn.query("SELECT 1").unwrap();
//! drop(conn); // back to idle
//! ```

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use pxdb_config::{ConfigError, ConfigSet, DEFAULT_POOL, PoolSettings};
use pxdb_core::{Driver, TableSpec, ValidationError};
use tracing::debug;

use crate::connection::{ConnectParams, Connection};
use crate::error::{DbError, Result};
use crate::introspect::{LiveTable, SchemaCache, SchemaIntrospector, introspector_for};

/// Bounded set of connections to one database.
pub struct Pool {
    params: Arc<ConnectParams>,
    max_connections: usize,
    /// `None` marks a leased slot.
    slots: Mutex<Vec<Option<Connection>>>,
    tables: Vec<TableSpec>,
    cache: Mutex<SchemaCache>,
    introspector: Box<dyn SchemaIntrospector>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.params.pool())
            .field("dsn", &self.params.dsn())
            .field("max_connections", &self.max_connections)
            .field("tables", &self.tables.len())
            .finish()
    }
}

impl Pool {
    /// Creates a pool holding one unopened connection.
    pub fn new(settings: &PoolSettings) -> Self {
        let params = Arc::new(ConnectParams::from_settings(settings));
        Self {
            slots: Mutex::new(vec![Some(Connection::new(Arc::clone(&params)))]),
            params,
            max_connections: settings.max_connections.max(1),
            tables: settings.tables.clone(),
            cache: Mutex::new(SchemaCache::default()),
            introspector: introspector_for(settings.driver),
        }
    }

    /// Replaces the driver's default introspector.
    pub fn with_introspector(mut self, introspector: Box<dyn SchemaIntrospector>) -> Self {
        self.introspector = introspector;
        self
    }

    pub fn name(&self) -> &str {
        self.params.pool()
    }

    pub fn driver(&self) -> Driver {
        self.params.driver()
    }

    pub fn prefix(&self) -> &str {
        self.params.prefix()
    }

    pub fn dsn(&self) -> &str {
        self.params.dsn()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Connections created so far, leased or idle.
    pub fn connection_count(&self) -> usize {
        self.slots().len()
    }

    pub fn idle_count(&self) -> usize {
        self.slots().iter().filter(|slot| slot.is_some()).count()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Vec<Option<Connection>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, SchemaCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases the first idle connection, growing the pool if none is idle.
    ///
    /// # Errors
    ///
    /// [`DbError::ResourceExhausted`] when all `max_connections` are leased.
    pub fn lease(&self) -> Result<PooledConnection<'_>> {
        let mut slots = self.slots();
        let idle = slots
            .iter_mut()
            .enumerate()
            .find_map(|(index, slot)| slot.take().map(|conn| (index, conn)));
        let (index, mut conn) = match idle {
            Some(found) => found,
            None if slots.len() < self.max_connections => {
                slots.push(None);
                debug!(pool = %self.name(), connections = slots.len(), "growing pool");
                (slots.len() - 1, Connection::new(Arc::clone(&self.params)))
            }
            None => {
                return Err(DbError::ResourceExhausted {
                    pool: self.name().to_string(),
                    max: self.max_connections,
                });
            }
        };
        if let Err(err) = conn.lock() {
            slots[index] = Some(conn);
            return Err(err);
        }
        Ok(PooledConnection {
            pool: self,
            index,
            conn,
        })
    }

    fn give_back(&self, index: usize, mut conn: Connection) {
        conn.release();
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(conn);
        }
    }

    /// Declares the schema of one more table.
    pub fn add_table_schema(&mut self, table: TableSpec) -> Result<()> {
        if self.table_schema(table.name()).is_some() {
            return Err(ValidationError::DuplicateTable(table.name().to_string()).into());
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn table_schema(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Declared tables in declaration order.
    pub fn table_schemas(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Unprefixed names of the live tables.
    pub fn live_tables(&self, conn: &mut Connection) -> Result<Vec<String>> {
        self.cache().table_names(self.introspector.as_ref(), conn)
    }

    /// Live metadata for one table; `None` when it does not exist.
    pub fn live_table(&self, conn: &mut Connection, table: &str) -> Result<Option<LiveTable>> {
        self.cache().table(self.introspector.as_ref(), conn, table)
    }

    /// Forgets the cached live schema; the next read re-introspects.
    pub fn clear_cache(&self) {
        debug!(pool = %self.name(), "clearing schema cache");
        self.cache().clear();
    }

    /// Overwrites the cached metadata for one table without touching the database.
    pub fn patch_cache(&self, table: LiveTable) {
        self.cache().patch(table);
    }
}

/// A leased connection; returned to its pool when dropped.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    pool: &'a Pool,
    index: usize,
    conn: Connection,
}

impl PooledConnection<'_> {
    /// Slot this connection occupies in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pool(&self) -> &Pool {
        self.pool
    }

    /// Returns the connection to the pool.
    pub fn release(self) {}
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        let placeholder = Connection::new(Arc::clone(self.conn.params()));
        let conn = std::mem::replace(&mut self.conn, placeholder);
        self.pool.give_back(self.index, conn);
    }
}

/// Every configured pool, looked up by name.
#[derive(Debug)]
pub struct PoolRegistry {
    pools: Vec<Pool>,
    default_pool: String,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: Vec::new(),
            default_pool: DEFAULT_POOL.to_string(),
        }
    }

    pub fn from_config(config: ConfigSet) -> Result<Self> {
        let (pools, default_pool) = config.into_pools();
        let mut registry = Self {
            pools: Vec::with_capacity(pools.len()),
            default_pool,
        };
        for settings in &pools {
            registry.register(Pool::new(settings))?;
        }
        Ok(registry)
    }

    /// Loads every pool file in `dir` and opens nothing yet.
    pub fn load_all(dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(pxdb_config::load_all(dir)?)
    }

    pub fn register(&mut self, pool: Pool) -> Result<()> {
        if self.pools.iter().any(|p| p.name() == pool.name()) {
            return Err(ConfigError::DuplicatePool(pool.name().to_string()).into());
        }
        debug!(pool = %pool.name(), dsn = %pool.dsn(), "registered pool");
        self.pools.push(pool);
        Ok(())
    }

    pub fn set_default_pool(&mut self, name: impl Into<String>) {
        self.default_pool = name.into();
    }

    /// # Errors
    ///
    /// [`ConfigError::UnknownPool`] when no pool has that name.
    pub fn get_pool(&self, name: &str) -> Result<&Pool> {
        self.pools
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ConfigError::UnknownPool(name.to_string()).into())
    }

    pub fn get_pool_mut(&mut self, name: &str) -> Result<&mut Pool> {
        self.pools
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| ConfigError::UnknownPool(name.to_string()).into())
    }

    pub fn default_pool(&self) -> Result<&Pool> {
        self.get_pool(&self.default_pool)
    }

    pub fn default_pool_name(&self) -> &str {
        &self.default_pool
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }
}
