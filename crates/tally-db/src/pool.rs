//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::from_env() / DbConfig::new(path)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├──► db.tabs()      TabRepository   ─┐                           │
//! │       ├──► db.sales()     SaleRepository  ─┼─► Arc<dyn Inventory...>   │
//! │       └──► db.products()  ProductRepository│                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so readers never block
//! the single writer. Ledger mutations take the write lock on their first
//! statement (see the repositories).

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::inventory::{InventoryAdjustment, SqliteInventory};
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::tab::TabRepository;

/// Environment variable holding the database file path.
pub const ENV_DB_PATH: &str = "TALLY_DB_PATH";

/// Environment variable overriding the pool size.
pub const ENV_DB_MAX_CONNECTIONS: &str = "TALLY_DB_MAX_CONNECTIONS";

/// Environment variable overriding the acquire timeout, in seconds.
pub const ENV_DB_CONNECT_TIMEOUT_SECS: &str = "TALLY_DB_CONNECT_TIMEOUT_SECS";

/// Database file used when `TALLY_DB_PATH` is not set.
pub const DEFAULT_DB_PATH: &str = "tally.db";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/tally.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections
    /// forever (required for in-memory databases).
    pub idle_timeout: Option<Duration>,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    /// Builds a configuration from the environment.
    ///
    /// | Variable                          | Default     |
    /// |-----------------------------------|-------------|
    /// | `TALLY_DB_PATH`                   | `tally.db`  |
    /// | `TALLY_DB_MAX_CONNECTIONS`        | 5           |
    /// | `TALLY_DB_CONNECT_TIMEOUT_SECS`   | 30          |
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DbConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let path = lookup(ENV_DB_PATH)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let mut config = DbConfig::new(path);

        if let Some(raw) = lookup(ENV_DB_MAX_CONNECTIONS) {
            let max: u32 = parse_var(ENV_DB_MAX_CONNECTIONS, &raw)?;
            if max == 0 {
                return Err(DbError::Config(format!(
                    "{ENV_DB_MAX_CONNECTIONS} must be at least 1"
                )));
            }
            config = config.max_connections(max);
            config.min_connections = config.min_connections.min(max);
        }

        if let Some(raw) = lookup(ENV_DB_CONNECT_TIMEOUT_SECS) {
            let secs: u64 = parse_var(ENV_DB_CONNECT_TIMEOUT_SECS, &raw)?;
            config = config.connect_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> DbResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| DbError::Config(format!("{key} has an invalid value: '{raw}'")))
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone; repositories share the pool and the inventory port.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::from_env()?).await?;
/// let tab = db.tabs().open(&OpenLedger::new("Mesa 4")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Stock decrement applied when a ledger closes.
    inventory: Arc<dyn InventoryAdjustment>,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys on
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        // sqlite://path creates file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let mut connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .create_if_missing(true);
        if !config.is_in_memory() {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(if config.is_in_memory() {
                None
            } else {
                Some(Duration::from_secs(1800))
            })
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            inventory: Arc::new(SqliteInventory),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Replaces the inventory port used by close / finalize.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(config).await?.with_inventory(Arc::new(MyInventory));
    /// ```
    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryAdjustment>) -> Self {
        self.inventory = inventory;
        self
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the product repository.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Returns the tab (comanda) repository.
    pub fn tabs(&self) -> TabRepository {
        TabRepository::new(self.pool.clone(), Arc::clone(&self.inventory))
    }

    /// Returns the sale (venda) repository.
    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone(), Arc::clone(&self.inventory))
    }

    /// Closes the database connection pool. Repository calls fail afterwards.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
    }

    #[test]
    fn test_config_from_env_defaults() {
        let config = DbConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_env_overrides() {
        let config = DbConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/var/lib/tally/bar.db"),
            (ENV_DB_MAX_CONNECTIONS, "8"),
            (ENV_DB_CONNECT_TIMEOUT_SECS, "3"),
        ]))
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/tally/bar.db"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_from_env_rejects_garbage() {
        let err = DbConfig::from_lookup(lookup(&[(ENV_DB_MAX_CONNECTIONS, "lots")])).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
        let err = DbConfig::from_lookup(lookup(&[(ENV_DB_MAX_CONNECTIONS, "0")])).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
