//! Database layer for the Accord control plane.
//!
//! Provides connection pooling for both supported engines, connection
//! initialisation, and embedded SQL migrations. Every table the datastore
//! touches is created through versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **Two engines, one schema**: SQLite (via `r2d2` + `rusqlite`) for
//!   single-node deployments and tests; PostgreSQL (via `sqlx`) for shared
//!   deployments. Both migration sets describe the same logical tables and
//!   carry the same migration names.
//! - **Foreign keys always on**: every SQLite connection enables
//!   `PRAGMA foreign_keys`, so a referenced trust domain cannot be deleted.
//! - **Validate, then migrate**: opening refuses a database that records a
//!   migration this build does not ship.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so migrations ship with the code that depends on them.

mod migrations;
mod pool;

pub use migrations::{run_migrations, run_pg_migrations, MigrationError};
pub use pool::{create_pg_pool, create_pool, DbPool, DbRuntimeSettings, PoolError, SQLITE_MEMORY};
