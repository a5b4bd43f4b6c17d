//! Datastore backend selection and pool settings.

use std::fmt;
use std::str::FromStr;

use accord_db::DbRuntimeSettings;
use serde::Deserialize;
use thiserror::Error;

/// Supported SQL engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown database backend {0:?}, expected \"sqlite\" or \"postgres\"")]
pub struct ParseBackendError(pub String);

impl FromStr for Backend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(ParseBackendError(s.to_string())),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatastoreConfig {
    /// Which engine `connection_string` points at.
    #[serde(default)]
    pub backend: Backend,

    /// SQLite file path (or `:memory:`), or a PostgreSQL URL.
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How long to wait for a pooled connection, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_connection_string() -> String {
    "accord.db".to_string()
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_acquire_timeout_ms() -> u64 {
    DbRuntimeSettings::default().acquire_timeout_ms
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            connection_string: default_connection_string(),
            pool_max_size: default_pool_max_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl DatastoreConfig {
    /// SQLite at `path`, default pool settings.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: Backend::Sqlite,
            connection_string: path.into(),
            ..Self::default()
        }
    }

    /// PostgreSQL at `url`, default pool settings.
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: Backend::Postgres,
            connection_string: url.into(),
            ..Self::default()
        }
    }

    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            acquire_timeout_ms: self.acquire_timeout_ms,
        }
    }
}
