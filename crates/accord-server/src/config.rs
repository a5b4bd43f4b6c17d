//! Server configuration loading from file and environment variables.

use accord_datastore::{Backend, DatastoreConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Datastore settings.
    #[serde(default)]
    pub database: DatastoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "accord_datastore=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8085
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override held a value that does not parse.
    #[error("invalid value {value:?} for {var}")]
    InvalidOverride { var: &'static str, value: String },
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `ACCORD_HOST` overrides `server.host`
/// - `ACCORD_PORT` overrides `server.port`
/// - `ACCORD_DB_BACKEND` overrides `database.backend` ("sqlite" or "postgres")
/// - `ACCORD_DB_CONNECTION_STRING` overrides `database.connection_string`
/// - `ACCORD_LOG_LEVEL` overrides `logging.level`
/// - `ACCORD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if an override cannot be parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Applies `ACCORD_*` overrides read through `lookup`.
pub fn apply_overrides(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    if let Some(host) = lookup("ACCORD_HOST") {
        config.server.host = parse_override("ACCORD_HOST", host)?;
    }
    if let Some(port) = lookup("ACCORD_PORT") {
        config.server.port = parse_override("ACCORD_PORT", port)?;
    }
    if let Some(backend) = lookup("ACCORD_DB_BACKEND") {
        config.database.backend = parse_override::<Backend>("ACCORD_DB_BACKEND", backend)?;
    }
    if let Some(conn) = lookup("ACCORD_DB_CONNECTION_STRING") {
        config.database.connection_string = conn;
    }
    if let Some(level) = lookup("ACCORD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("ACCORD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

fn parse_override<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = load_config(Some("/nonexistent/accord-config.toml"))
            .expect("missing file should fall back to defaults");
        assert_eq!(config.server.port, 8085);
        assert_eq!(config.database.backend, Backend::Sqlite);
        assert_eq!(config.database.connection_string, "accord.db");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn file_values_are_read() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        write!(
            file,
            r#"
[server]
port = 9001

[database]
backend = "postgres"
connection_string = "postgres://accord@localhost/accord"
pool_max_size = 4

[logging]
json = true
"#
        )
        .expect("should write config");

        let config = apply_overrides(
            toml::from_str(&std::fs::read_to_string(file.path()).expect("should read"))
                .expect("should parse"),
            env(&[]),
        )
        .expect("should load");
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.database.backend, Backend::Postgres);
        assert_eq!(config.database.pool_max_size, 4);
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert!(config.logging.json);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        write!(file, "[database]\nbackend = \"oracle\"\n").expect("should write config");
        let path = file.path().to_str().expect("utf-8 path");
        assert!(matches!(load_config(Some(path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let config = apply_overrides(
            Config::default(),
            env(&[
                ("ACCORD_HOST", "0.0.0.0"),
                ("ACCORD_PORT", "9100"),
                ("ACCORD_DB_BACKEND", "PostgreSQL"),
                ("ACCORD_DB_CONNECTION_STRING", "postgres://localhost/accord"),
                ("ACCORD_LOG_LEVEL", "debug"),
                ("ACCORD_LOG_JSON", "1"),
            ]),
        )
        .expect("overrides should apply");

        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.backend, Backend::Postgres);
        assert_eq!(config.database.connection_string, "postgres://localhost/accord");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn unparseable_override_is_an_error() {
        let err = apply_overrides(Config::default(), env(&[("ACCORD_DB_BACKEND", "mysql")]))
            .expect_err("unknown backend should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidOverride { var: "ACCORD_DB_BACKEND", .. }
        ));

        let err = apply_overrides(Config::default(), env(&[("ACCORD_PORT", "http")]))
            .expect_err("non-numeric port should fail");
        assert!(matches!(err, ConfigError::InvalidOverride { var: "ACCORD_PORT", .. }));
    }
}
