//! Directory loading with one pool per file.
//!
//! [`ConfigLoader`] scans a directory for `*.yml`, `*.yaml` and `*.json`
//! files, resolving each into [`PoolSettings`]. A file named `default.*`
//! configures the default pool, which is called `main` unless the file
//! names it otherwise; without one, the pool named `main` is the default.
//!
//! ```no_run
//! use pxdb_config::ConfigLoader;
//!
//! let config = ConfigLoader::new("config/db/")
//!     .data_dir("/var/lib/app")
//!     .load()
//!     .unwrap();
//! for pool in config.pools() {
//!     println!("{} -> {}", pool.name, pool.dsn());
//! }
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::pool::{PoolConfig, PoolSettings};

/// Name of the default pool unless its file says otherwise.
pub const DEFAULT_POOL: &str = "main";

const DEFAULT_FILE_STEM: &str = "default";
const EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

/// Every pool configured in one directory.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    pools: Vec<PoolSettings>,
    default_pool: String,
}

impl ConfigSet {
    /// Builds a set directly, for hosts that configure pools in code.
    pub fn new(pools: Vec<PoolSettings>, default_pool: impl Into<String>) -> Result<Self> {
        let mut seen: Vec<&str> = Vec::with_capacity(pools.len());
        for pool in &pools {
            if seen.contains(&pool.name.as_str()) {
                return Err(ConfigError::DuplicatePool(pool.name.clone()));
            }
            seen.push(&pool.name);
        }
        Ok(Self {
            pools,
            default_pool: default_pool.into(),
        })
    }

    /// Pools in file-name order.
    pub fn pools(&self) -> &[PoolSettings] {
        &self.pools
    }

    pub fn default_pool(&self) -> &str {
        &self.default_pool
    }

    pub fn get(&self, name: &str) -> Option<&PoolSettings> {
        self.pools.iter().find(|p| p.name == name)
    }

    pub fn into_pools(self) -> (Vec<PoolSettings>, String) {
        (self.pools, self.default_pool)
    }
}

/// Builder for loading a configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
    data_dir: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            data_dir: None,
        }
    }

    /// Directory that relative SQLite database paths resolve against.
    ///
    /// Defaults to the configuration directory.
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Reads and resolves every pool file.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable, unparsable or invalid file, and with
    /// [`ConfigError::DuplicatePool`] when two files share a pool name.
    pub fn load(&self) -> Result<ConfigSet> {
        let data_dir = self.data_dir.as_deref().unwrap_or(&self.dir);
        let io_err = |source| ConfigError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if path.is_file() && EXTENSIONS.contains(&ext) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut pools = Vec::with_capacity(paths.len());
        let mut default_pool = DEFAULT_POOL.to_string();
        for path in paths {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let is_default = stem == DEFAULT_FILE_STEM;
            let fallback = if is_default { DEFAULT_POOL } else { stem.as_str() };

            let settings = PoolConfig::load(&path)?.resolve(fallback, data_dir, &path)?;
            debug!(pool = %settings.name, driver = %settings.driver, path = %path.display(), "loaded pool config");
            if is_default {
                default_pool = settings.name.clone();
            }
            pools.push(settings);
        }

        ConfigSet::new(pools, default_pool)
    }
}

/// Loads every pool file in `dir`.
pub fn load_all(dir: impl AsRef<Path>) -> Result<ConfigSet> {
    ConfigLoader::new(dir).load()
}
