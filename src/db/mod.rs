//! Database connection pool, migrations, and health check.
//!
//! One SQLite database holds both the item store and the audit log so a
//! transition and its audit record commit in the same transaction.

pub mod audit;
pub mod items;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::error::Result;

/// Connection tuning. Bounds how long an operation may wait on a contended store.
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub max_connections: u32,
    /// How long a statement waits for SQLite's write lock before failing busy.
    pub busy_timeout: Duration,
    /// How long an operation waits for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_millis(5_000),
            acquire_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Database handle. Owns the connection pool shared by the queue.
pub struct Db {
    pool: SqlitePool,
}

/// An open write transaction. Dropping it without [`Tx::commit`] rolls back.
///
/// Item-store and audit-log writes are methods on this type (see
/// [`items`] and [`audit`]) so they can only happen inside a transaction.
pub struct Tx {
    tx: Transaction<'static, Sqlite>,
}

impl Tx {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl Db {
    /// Connect with a `sqlite://` URL, creating the file if missing.
    pub async fn connect(url: &str, options: &DbOptions) -> Result<Self> {
        let connect = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Self::connect_with(connect, options).await
    }

    /// Open or create a database file at the given path.
    pub async fn open(path: impl AsRef<Path>, options: &DbOptions) -> Result<Self> {
        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect_with(connect, options).await
    }

    async fn connect_with(connect: SqliteConnectOptions, options: &DbOptions) -> Result<Self> {
        // WAL lets readers proceed while a claim holds the write lock
        let connect = connect
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect)
            .await?;
        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    ///
    /// Every connection to `:memory:` is a separate database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Begin a transaction. Writes go through the returned handle.
    pub async fn begin(&self) -> Result<Tx> {
        Ok(Tx {
            tx: self.pool.begin().await?,
        })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
