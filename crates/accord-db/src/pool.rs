//! Connection pool creation and configuration.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Path that selects a private in-memory SQLite database.
pub const SQLITE_MEMORY: &str = ":memory:";

/// Runtime tunables for pooled connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    pub pool_max_size: u32,

    /// How long to wait for a free pooled connection, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            acquire_timeout_ms: 30_000,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating a database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the SQLite connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),

    /// Failed to connect to PostgreSQL.
    #[error("failed to connect to postgres: {0}")]
    Postgres(#[from] sqlx::Error),
}

/// Creates a new SQLite connection pool with WAL mode and foreign keys enabled.
///
/// # Arguments
///
/// * `db_path` - Path to the SQLite database file. Use `:memory:` for an
///   in-memory database (useful for testing). Every SQLite connection to
///   `:memory:` opens its own database, so the pool is capped at a single
///   connection that is never recycled.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the connection pool cannot be created.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory" which is expected and acceptable.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {}",
                        journal_mode
                    )),
                ));
            }
            conn.set_prepared_statement_cache_capacity(64);
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    let mut builder = Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_timeout(Duration::from_millis(settings.acquire_timeout_ms));

    if db_path == SQLITE_MEMORY {
        if settings.pool_max_size > 1 {
            tracing::debug!(
                requested = settings.pool_max_size,
                "in-memory sqlite database, limiting pool to one connection"
            );
        }
        builder = builder
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = builder.build(manager)?;

    Ok(pool)
}

/// Connects a PostgreSQL pool to `url`.
///
/// # Errors
///
/// Returns `PoolError::Postgres` if the server cannot be reached or the
/// URL is malformed.
pub async fn create_pg_pool(url: &str, settings: DbRuntimeSettings) -> Result<PgPool, PoolError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.pool_max_size)
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
        .connect(url)
        .await?;

    Ok(pool)
}
