//! Connection and sync configuration
//!
//! The argument parser or settings loader hands the core a finished
//! [`ConnectionConfig`]; nothing below re-reads the environment once a
//! config has been built.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{DATABASE_FILENAME, DEFAULT_PG_DBNAME, DEFAULT_PG_PORT};

/// Supported storage engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Sqlite,
    Postgres,
    /// No persistence; notes live only as long as the process
    None,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Sqlite => "sqlite",
            Engine::Postgres => "postgres",
            Engine::None => "none",
        }
    }
}

impl FromStr for Engine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            "postgres" | "postgresql" | "postgre" => Ok(Engine::Postgres),
            "none" => Ok(Engine::None),
            other => Err(ConfigError::UnknownEngine(other.to_string())),
        }
    }
}

/// Immutable connection parameters. Exactly one engine branch is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
    Postgres {
        /// `None` selects the local socket transport
        #[serde(default)]
        host: Option<String>,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default = "default_dbname")]
        dbname: String,
        #[serde(default = "default_user")]
        user: String,
        #[serde(default)]
        password: String,
    },
    #[serde(rename = "none")]
    Memory,
}

impl ConnectionConfig {
    /// SQLite config for the given file
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        ConnectionConfig::Sqlite { path: path.into() }
    }

    /// PostgreSQL config with all defaults (local socket, port 5432, `qsticky`)
    pub fn postgres_default() -> Self {
        ConnectionConfig::Postgres {
            host: None,
            port: DEFAULT_PG_PORT,
            dbname: DEFAULT_PG_DBNAME.to_string(),
            user: default_user(),
            password: String::new(),
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            ConnectionConfig::Sqlite { .. } => Engine::Sqlite,
            ConnectionConfig::Postgres { .. } => Engine::Postgres,
            ConnectionConfig::Memory => Engine::None,
        }
    }

    /// Build a config from the flat option set of a command line.
    ///
    /// Options belonging to the other engine are rejected rather than ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        engine: &str,
        path: Option<&str>,
        host: Option<&str>,
        port: Option<&str>,
        dbname: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let engine: Engine = engine.parse()?;
        let config = match engine {
            Engine::Sqlite => {
                for (option, value) in [
                    ("host", host),
                    ("port", port),
                    ("dbname", dbname),
                    ("user", user),
                    ("password", password),
                ] {
                    if value.is_some() {
                        return Err(ConfigError::MixedOptions {
                            engine: "sqlite",
                            option,
                        });
                    }
                }
                match path {
                    Some(p) => ConnectionConfig::sqlite(p),
                    None => ConnectionConfig::sqlite(default_sqlite_path()),
                }
            }
            Engine::Postgres => {
                if path.is_some() {
                    return Err(ConfigError::MixedOptions {
                        engine: "postgres",
                        option: "path",
                    });
                }
                let port = match port {
                    Some(p) => p.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                        field: "port",
                        value: p.to_string(),
                    })?,
                    None => DEFAULT_PG_PORT,
                };
                ConnectionConfig::Postgres {
                    host: host.filter(|h| !h.trim().is_empty()).map(str::to_string),
                    port,
                    dbname: dbname.map(str::to_string).unwrap_or_else(default_dbname),
                    user: user.map(str::to_string).unwrap_or_else(default_user),
                    password: password.unwrap_or_default().to_string(),
                }
            }
            Engine::None => ConnectionConfig::Memory,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document with an `engine` key (and an optional `[sync]` table,
    /// which is ignored here)
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| ConfigError::Load(format!("Failed to parse config: {}", e)))?;
        file.connection.validate()?;
        Ok(file.connection)
    }

    /// Load connection and sync settings from a TOML file
    pub fn load_from_file(path: &Path) -> Result<(Self, SyncSettings), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| ConfigError::Load(format!("Failed to parse {}: {}", path.display(), e)))?;
        file.connection.validate()?;
        Ok((file.connection, file.sync.unwrap_or_default()))
    }

    /// Check the invariants a deserialized config may have skipped
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ConnectionConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Missing("path"));
                }
            }
            ConnectionConfig::Postgres {
                port, dbname, user, ..
            } => {
                if *port == 0 {
                    return Err(ConfigError::Invalid {
                        field: "port",
                        value: port.to_string(),
                    });
                }
                if dbname.trim().is_empty() {
                    return Err(ConfigError::Missing("dbname"));
                }
                if user.trim().is_empty() {
                    return Err(ConfigError::Missing("user"));
                }
            }
            ConnectionConfig::Memory => {}
        }
        Ok(())
    }
}

/// Timing knobs of the sync layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Quiet period after the last continuous edit before it is written
    #[serde(with = "millis")]
    pub debounce: Duration,
    /// Upper bound on establishing a networked session
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Upper bound on a single networked statement
    #[serde(with = "millis")]
    pub query_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(flatten)]
    connection: ConnectionConfig,
    sync: Option<SyncSettings>,
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `$XDG_DATA_HOME/qsticky.db`, or `~/.local/share/qsticky.db`
pub fn default_sqlite_path() -> PathBuf {
    let data_dir = std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("share"))
        })
        .unwrap_or_else(|| PathBuf::from("."));
    data_dir.join(DATABASE_FILENAME)
}

fn default_port() -> u16 {
    DEFAULT_PG_PORT
}

fn default_dbname() -> String {
    DEFAULT_PG_DBNAME.to_string()
}

/// Current system user, as the original client library would pick it
pub fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "postgres".to_string())
}
