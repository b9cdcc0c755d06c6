//! # Application Configuration
//!
//! Where the database lives, how the pool is sized and when a deduction
//! raises a low-stock advisory.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     PHARMADIST_DB_PATH=/srv/pharmadist/ledger.db                        │
//! │     PHARMADIST_MAX_CONNECTIONS=8                                        │
//! │     PHARMADIST_LOW_STOCK_THRESHOLD=100                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/pharmadist/pharmadist.toml (Linux)                        │
//! │     ~/Library/Application Support/com.pharmadist.pharmadist/... (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! │     pool of 5, threshold 50, database in the platform data dir          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/pharmadist/ledger.db"
//! max_connections = 5
//! min_connections = 1
//! connect_timeout_secs = 30
//! idle_timeout_secs = 600
//! run_migrations = true
//!
//! [stock]
//! low_stock_threshold = 50
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;
use pharmadist_core::LOW_STOCK_THRESHOLD;

pub const ENV_DB_PATH: &str = "PHARMADIST_DB_PATH";
pub const ENV_MAX_CONNECTIONS: &str = "PHARMADIST_MAX_CONNECTIONS";
pub const ENV_LOW_STOCK_THRESHOLD: &str = "PHARMADIST_LOW_STOCK_THRESHOLD";

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `pharmadist.db` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    5
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Stock Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSettings {
    /// Remaining units at or below which a deduction warns.
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

fn default_low_stock_threshold() -> i64 {
    LOW_STOCK_THRESHOLD
}

impl Default for StockSettings {
    fn default() -> Self {
        StockSettings {
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

// =============================================================================
// App Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub stock: StockSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (pharmadist.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> DbResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::InvalidConfig("no config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| DbError::InvalidConfig(e.to_string()))?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(path)
    }

    pub fn validate(&self) -> DbResult<()> {
        let db = &self.database;
        if db.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }
        if db.min_connections > db.max_connections {
            return Err(DbError::InvalidConfig(format!(
                "min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            )));
        }
        if db.connect_timeout_secs == 0 {
            return Err(DbError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.stock.low_stock_threshold < 0 {
            return Err(DbError::InvalidConfig(
                "low_stock_threshold must not be negative".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `PHARMADIST_*` overrides from `lookup`. Unparseable values
    /// are logged and ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DB_PATH) {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
            match value.parse::<u32>() {
                Ok(max) => self.database.max_connections = max,
                Err(_) => warn!(value = %value, "Ignoring invalid {}", ENV_MAX_CONNECTIONS),
            }
        }

        if let Some(value) = lookup(ENV_LOW_STOCK_THRESHOLD) {
            match value.parse::<i64>() {
                Ok(threshold) => {
                    debug!(threshold, "Overriding low-stock threshold from environment");
                    self.stock.low_stock_threshold = threshold;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid {}", ENV_LOW_STOCK_THRESHOLD),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "pharmadist", "pharmadist")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("pharmadist.toml"))
    }

    /// Configured database path, else the platform data dir, else the
    /// working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("pharmadist.db")))
            .unwrap_or_else(|| PathBuf::from("pharmadist.db"))
    }

    pub fn to_db_config(&self) -> DbConfig {
        let mut config = DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .run_migrations(self.database.run_migrations)
            .low_stock_threshold(self.stock.low_stock_threshold);
        config.idle_timeout = Duration::from_secs(self.database.idle_timeout_secs);
        config
    }
}
