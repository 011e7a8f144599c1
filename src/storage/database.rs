use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info};

use super::MIGRATION_001_INITIAL;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the ledger store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// sqlx connection URL, e.g. `sqlite:ledger.db`
    pub database_url: String,
    pub max_connections: u32,
    /// How long a writer waits for the store lock before failing
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Configuration for a database file at the given path.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self::new(format!("sqlite:{}", path.as_ref().display()))
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

/// Shared handle to the relational store. Cloning is cheap; all clones use
/// the same connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the store described by `config`.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("Invalid database URL: {}", config.database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!(url = %config.database_url, max_connections = config.max_connections, "Connected to ledger store");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize the store (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let db = Self::connect(config).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a read-only snapshot. Rolls back when dropped.
    pub async fn read(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin read transaction")
    }

    /// Start a unit of work that holds the store write lock until it is
    /// committed or rolled back.
    pub async fn begin_immediate(&self) -> Result<UnitOfWork> {
        UnitOfWork::begin(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// One atomic group of store writes.
///
/// Opened with `BEGIN IMMEDIATE`, so the write lock is taken before the
/// first read and concurrent units of work on the same rows serialize
/// instead of failing on lock upgrade. A unit of work dropped without
/// `commit` or `rollback` discards its connection, which rolls it back.
pub struct UnitOfWork {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl UnitOfWork {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .context("Failed to begin unit of work")?;
        Ok(Self { conn, open: true })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT")
            .execute(&mut *self.conn)
            .await
            .context("Failed to commit unit of work")?;
        self.open = false;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        sqlx::query("ROLLBACK")
            .execute(&mut *self.conn)
            .await
            .context("Failed to roll back unit of work")?;
        self.open = false;
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.open {
            debug!("Unit of work dropped while open; discarding connection");
            self.conn.close_on_drop();
        }
    }
}
