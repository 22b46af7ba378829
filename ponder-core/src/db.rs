//! SQLite connection management and schema migration.
//!
//! The store opens a single long-lived pool lazily on first use. `Database`
//! makes the singleton explicit: it owns the optional pool plus the in-flight
//! open, so concurrent first acquires all await the same attempt and tests can
//! construct independent instances instead of sharing ambient globals.
//!
//! Migration is a separate, versioned step (`PRAGMA user_version` gate) run
//! once when the pool is first opened. It is a free function so it can be
//! unit-tested without going through the manager.

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OnceCell};

use crate::config::DatabaseConfig;
use crate::error::PonderError;

/// Current schema version. Bumping this requires a new migration arm.
pub const SCHEMA_VERSION: i64 = 1;

pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
}

/// A single shared in-memory pool, used by tests and ephemeral sessions.
/// Capped at one connection so every caller sees the same database.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Bring the schema up to `SCHEMA_VERSION`. First-run detection is the
/// `user_version` pragma, not a per-open table scan.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            summary TEXT,
            reflection_questions TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Present in the schema for display-order queries; current reads scan all.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries (created_at)")
        .execute(pool)
        .await?;

    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(pool)
        .await?;

    tracing::info!(version = SCHEMA_VERSION, "Applied journal schema");
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("PRAGMA user_version").fetch_one(pool).await
}

/// Lazily-opened, process-lifetime connection manager.
pub struct Database {
    config: DatabaseConfig,
    pool: OnceCell<SqlitePool>,
    open_failure: Mutex<Option<String>>,
    opens: AtomicU32,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
            open_failure: Mutex::new(None),
            opens: AtomicU32::new(0),
        }
    }

    /// Wrap an already-open pool. The pool must be migrated by the caller.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self {
            config: DatabaseConfig {
                path: ":memory:".to_string(),
                max_connections: 1,
            },
            pool: OnceCell::new_with(Some(pool)),
            open_failure: Mutex::new(None),
            opens: AtomicU32::new(1),
        }
    }

    /// An independent migrated in-memory database.
    pub async fn in_memory() -> Result<Self, PonderError> {
        let pool = create_memory_pool().await?;
        migrate(&pool).await?;
        Ok(Self::with_pool(pool))
    }

    /// Get the shared pool, opening and migrating it on first use. Concurrent
    /// callers before the pool exists all await the same attempt: exactly one
    /// open runs and its outcome, pool or failure, is shared by every waiter.
    /// A failed open is remembered; later acquires report the same error
    /// instead of retrying, so a broken path never causes an open per caller.
    pub async fn acquire(&self) -> Result<&SqlitePool, PonderError> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }

        let mut failure = self.open_failure.lock().await;
        // Re-check: the open may have finished while we waited for the lock.
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        if let Some(msg) = failure.as_deref() {
            return Err(PonderError::Unavailable(msg.to_string()));
        }

        self.opens.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(path = %self.config.path, "Opening journal database");

        let opened = async {
            let pool = create_pool(&self.config).await?;
            migrate(&pool).await?;
            Ok::<_, sqlx::Error>(pool)
        }
        .await;

        match opened {
            Ok(pool) => Ok(self.pool.get_or_init(|| async move { pool }).await),
            Err(e) => {
                let msg = e.to_string();
                tracing::error!(path = %self.config.path, error = %msg, "Failed to open journal database");
                *failure = Some(msg.clone());
                Err(PonderError::Unavailable(msg))
            }
        }
    }

    /// How many times the underlying open actually ran. Test observability
    /// for the single-open guarantee.
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}
