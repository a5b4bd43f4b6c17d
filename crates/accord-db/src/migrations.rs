//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time, one set per backend.
//! They run sequentially on open, tracked by the `_accord_migrations` table.
//! Each migration runs exactly once; if it has already been applied, it is
//! skipped.
//!
//! Before anything is applied the tracking table is validated: a database
//! that records a migration this build does not know was written by a newer
//! release, and opening it is refused rather than risking a schema mismatch.

use std::collections::HashSet;

use rusqlite::Connection;
use sqlx::postgres::PgPool;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// SQLite migrations in order. New migrations are appended here.
const SQLITE_MIGRATIONS: &[Migration] = &[
    Migration {
        name: "001_init",
        sql: include_str!("migrations/sqlite/001_init.sql"),
    },
    Migration {
        name: "002_listing_indexes",
        sql: include_str!("migrations/sqlite/002_listing_indexes.sql"),
    },
];

/// PostgreSQL migrations in order. Names match the SQLite set one to one.
const POSTGRES_MIGRATIONS: &[Migration] = &[
    Migration {
        name: "001_init",
        sql: include_str!("migrations/postgres/001_init.sql"),
    },
    Migration {
        name: "002_listing_indexes",
        sql: include_str!("migrations/postgres/002_listing_indexes.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a SQLite migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// A SQL statement within a PostgreSQL migration failed.
    #[error("migration '{name}' failed: {source}")]
    PgExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying driver error.
        source: sqlx::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),

    /// Failed to query migration state on PostgreSQL.
    #[error("failed to check migration state: {0}")]
    PgStateQuery(sqlx::Error),

    /// The database records a migration this build does not ship.
    #[error("database schema is newer than this build: unknown migration '{0}'")]
    UnknownMigration(String),
}

/// Runs all pending SQLite migrations against the given connection.
///
/// Returns the number of migrations applied.
///
/// # Errors
///
/// Returns `MigrationError` if the recorded schema is unknown to this build,
/// if any migration fails to execute, or if the migration tracking table
/// cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, SQLITE_MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    // The tracking table must exist before we can check what's been applied.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _accord_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: "_accord_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let applied_names = {
        let mut stmt = conn
            .prepare("SELECT name FROM _accord_migrations ORDER BY id")
            .map_err(MigrationError::StateQuery)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(MigrationError::StateQuery)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(MigrationError::StateQuery)?;
        names
    };

    let known: HashSet<&str> = migrations.iter().map(|m| m.name).collect();
    validate_applied(&applied_names, &known)?;
    let applied_set: HashSet<&str> = applied_names.iter().map(String::as_str).collect();

    let mut applied = 0;

    for migration in migrations {
        if applied_set.contains(migration.name) {
            tracing::debug!(
                migration = migration.name,
                "migration already applied, skipping"
            );
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let fail = |e| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source: e,
        };

        let tx = conn.unchecked_transaction().map_err(fail)?;
        tx.execute_batch(migration.sql).map_err(fail)?;
        tx.execute(
            "INSERT INTO _accord_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(fail)?;
        tx.commit().map_err(fail)?;

        applied += 1;
    }

    Ok(applied)
}

/// Runs all pending PostgreSQL migrations.
///
/// Each migration and its tracking row commit in one transaction.
///
/// # Errors
///
/// Same conditions as [`run_migrations`].
pub async fn run_pg_migrations(pool: &PgPool) -> Result<usize, MigrationError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _accord_migrations (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| MigrationError::PgExecutionFailed {
        name: "_accord_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let applied_names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM _accord_migrations ORDER BY id")
            .fetch_all(pool)
            .await
            .map_err(MigrationError::PgStateQuery)?;

    let known: HashSet<&str> = POSTGRES_MIGRATIONS.iter().map(|m| m.name).collect();
    validate_applied(&applied_names, &known)?;
    let applied_set: HashSet<&str> = applied_names.iter().map(String::as_str).collect();

    let mut applied = 0;

    for migration in POSTGRES_MIGRATIONS {
        if applied_set.contains(migration.name) {
            tracing::debug!(
                migration = migration.name,
                "migration already applied, skipping"
            );
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let fail = |e| MigrationError::PgExecutionFailed {
            name: migration.name.to_string(),
            source: e,
        };

        let mut tx = pool.begin().await.map_err(fail)?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        sqlx::query("INSERT INTO _accord_migrations (name) VALUES ($1)")
            .bind(migration.name)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        applied += 1;
    }

    Ok(applied)
}

fn validate_applied(applied: &[String], known: &HashSet<&str>) -> Result<(), MigrationError> {
    match applied.iter().find(|name| !known.contains(name.as_str())) {
        Some(unknown) => Err(MigrationError::UnknownMigration(unknown.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("should enable foreign keys");
        conn
    }

    #[test]
    fn run_migrations_on_fresh_db() {
        let conn = open();
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, SQLITE_MIGRATIONS.len());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM _accord_migrations", [], |row| {
                row.get(0)
            })
            .expect("should query migration count");
        assert_eq!(count as usize, SQLITE_MIGRATIONS.len());
    }

    #[test]
    fn run_migrations_idempotent() {
        let conn = open();

        let first = run_migrations(&conn).expect("first run should succeed");
        assert_eq!(first, SQLITE_MIGRATIONS.len());

        let second = run_migrations(&conn).expect("second run should succeed");
        assert_eq!(second, 0, "no new migrations to apply");
    }

    #[test]
    fn creates_entity_tables() {
        let conn = open();
        run_migrations(&conn).expect("migrations should succeed");

        for table in ["trust_domains", "relationships", "join_tokens", "bundles"] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .expect("should query sqlite_master");
            assert!(exists, "{table} table should exist");
        }
    }

    #[test]
    fn rejects_database_from_newer_build() {
        let conn = open();
        run_migrations(&conn).expect("migrations should succeed");
        conn.execute(
            "INSERT INTO _accord_migrations (name) VALUES ('999_from_the_future')",
            [],
        )
        .expect("should record foreign migration");

        let err = run_migrations(&conn).expect_err("unknown migration should be rejected");
        match err {
            MigrationError::UnknownMigration(name) => assert_eq!(name, "999_from_the_future"),
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn migration_side_effects_rollback_when_tracking_insert_fails() {
        let conn = open();
        let migrations = [Migration {
            name: "001_tracking_insert_conflict",
            sql: "
                CREATE TABLE rollback_probe (id INTEGER PRIMARY KEY);
                INSERT INTO _accord_migrations (name) VALUES ('001_tracking_insert_conflict');
            ",
        }];

        let err = run_migrations_from_list(&conn, &migrations)
            .expect_err("tracking insert conflict should fail migration");

        match err {
            MigrationError::ExecutionFailed { name, .. } => {
                assert_eq!(name, "001_tracking_insert_conflict")
            }
            other => panic!("unexpected error type: {other:?}"),
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'rollback_probe')",
                [],
                |row| row.get(0),
            )
            .expect("should query sqlite_master");

        assert!(
            !exists,
            "schema side effects should be rolled back when tracking insert fails"
        );
    }

    #[test]
    fn backends_ship_the_same_migration_names() {
        let sqlite: Vec<_> = SQLITE_MIGRATIONS.iter().map(|m| m.name).collect();
        let postgres: Vec<_> = POSTGRES_MIGRATIONS.iter().map(|m| m.name).collect();
        assert_eq!(sqlite, postgres);
    }
}
