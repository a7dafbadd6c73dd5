//! Collector configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/tkmcollector/tkmcollector.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tkm_core::HashCollisionPolicy;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub runtime_directory: PathBuf,
    pub control_socket: PathBuf,
    pub database: DatabaseConfig,
    pub watchdog_interval_sec: Option<u64>,
    pub hash_collision_policy: HashCollisionPolicy,
}

#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    Sqlite3 { path: PathBuf },
    Postgresql { url: String },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    runtime_directory: Option<String>,
    control_socket: Option<String>,
    database: Option<RawDatabaseConfig>,
    watchdog: Option<RawWatchdogConfig>,
    session: Option<RawSessionConfig>,
}

#[derive(Debug, Deserialize)]
struct RawDatabaseConfig {
    kind: Option<String>,
    path: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWatchdogConfig {
    interval_sec: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSessionConfig {
    hash_collision_policy: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "Parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn load_config_from_path(path: &Path) -> Result<CollectorConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<CollectorConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/tkmcollector/tkmcollector.toml"))
}

/// Build a config directly from defaults, used when no config file is
/// present — matches `shared/Options.cpp`'s fallback-to-default behaviour
/// when `hasConfigFile()` is false.
pub fn default_config() -> CollectorConfig {
    load_config_from_str("").expect("defaults alone must parse")
}

pub fn load_config_from_str(toml_str: &str) -> Result<CollectorConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let runtime_directory = PathBuf::from(
        raw.runtime_directory.unwrap_or_else(|| "/var/run/tkmcollector".to_owned()),
    );
    let control_socket_name = raw.control_socket.unwrap_or_else(|| "tkmcollector.sock".to_owned());
    let control_socket = runtime_directory.join(control_socket_name);

    let database = match raw.database {
        Some(db) => {
            let kind = db.kind.unwrap_or_else(|| "sqlite3".to_owned());
            match kind.as_str() {
                "sqlite3" => DatabaseConfig::Sqlite3 {
                    path: PathBuf::from(
                        db.path.unwrap_or_else(|| "/var/lib/tkmcollector/tkmcollector.db".to_owned()),
                    ),
                },
                "postgresql" => DatabaseConfig::Postgresql {
                    url: db.url.ok_or_else(|| ConfigError::MissingField("database.url".to_owned()))?,
                },
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "database.kind must be 'sqlite3' or 'postgresql', got '{other}'"
                    )));
                }
            }
        }
        None => DatabaseConfig::Sqlite3 {
            path: PathBuf::from("/var/lib/tkmcollector/tkmcollector.db"),
        },
    };

    let watchdog_interval_sec = raw.watchdog.and_then(|w| w.interval_sec);

    let hash_collision_policy = match raw.session.and_then(|s| s.hash_collision_policy) {
        Some(s) if s == "reject" => HashCollisionPolicy::Reject,
        Some(s) if s == "cascade" => HashCollisionPolicy::Cascade,
        Some(other) => {
            return Err(ConfigError::InvalidValue(format!(
                "session.hash_collision_policy must be 'reject' or 'cascade', got '{other}'"
            )));
        }
        None => HashCollisionPolicy::default(),
    };

    Ok(CollectorConfig {
        runtime_directory,
        control_socket,
        database,
        watchdog_interval_sec,
        hash_collision_policy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_every_default() {
        let cfg = load_config_from_str("").unwrap();
        assert_eq!(cfg.runtime_directory, PathBuf::from("/var/run/tkmcollector"));
        assert_eq!(cfg.control_socket, PathBuf::from("/var/run/tkmcollector/tkmcollector.sock"));
        assert!(matches!(cfg.database, DatabaseConfig::Sqlite3 { .. }));
        assert_eq!(cfg.watchdog_interval_sec, None);
        assert_eq!(cfg.hash_collision_policy, HashCollisionPolicy::Reject);
    }

    #[test]
    fn postgresql_without_url_is_rejected() {
        let err = load_config_from_str("[database]\nkind = \"postgresql\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn postgresql_with_url_parses() {
        let cfg = load_config_from_str(
            "[database]\nkind = \"postgresql\"\nurl = \"postgres://localhost/tkm\"\n",
        )
        .unwrap();
        match cfg.database {
            DatabaseConfig::Postgresql { url } => assert_eq!(url, "postgres://localhost/tkm"),
            _ => panic!("expected postgresql config"),
        }
    }

    #[test]
    fn unknown_database_kind_is_rejected() {
        let err = load_config_from_str("[database]\nkind = \"oracle\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn cascade_collision_policy_parses() {
        let cfg = load_config_from_str("[session]\nhash_collision_policy = \"cascade\"\n").unwrap();
        assert_eq!(cfg.hash_collision_policy, HashCollisionPolicy::Cascade);
    }
}
