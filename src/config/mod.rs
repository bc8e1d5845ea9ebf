/// Configuration management for dbmux
use crate::client::{DatabaseType, StorageMode};
use crate::core::dispatcher::DispatchDefaults;
use crate::core::ConnectSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main dbmux configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Defaults for omitted connect-string parts
    pub connection: ConnectionConfig,
    /// Defaults for `create database`
    pub database: DatabaseConfig,
    /// Result display
    pub display: DisplayConfig,
    /// Backend selection
    pub backend: BackendConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub server: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Storage mode (plocal, memory)
    pub storage: String,
    /// Database type (graph, document)
    pub db_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    /// Display format (table, json, none)
    pub format: String,
    /// Characters kept per table cell
    pub table_field_limit: usize,
}

/// Credentials accepted by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Backend kind (memory)
    pub kind: String,
    /// Databases created at start
    #[serde(default)]
    pub seed_databases: Vec<String>,
    pub users: Vec<UserConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (text, compact)
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig {
                server: crate::core::DEFAULT_SERVER.to_string(),
                port: crate::core::DEFAULT_PORT,
            },
            database: DatabaseConfig {
                storage: "plocal".to_string(),
                db_type: "graph".to_string(),
            },
            display: DisplayConfig {
                format: "table".to_string(),
                table_field_limit: 25,
            },
            backend: BackendConfig {
                kind: "memory".to_string(),
                seed_databases: Vec::new(),
                users: vec![UserConfig {
                    name: "root".to_string(),
                    password: "root".to_string(),
                }],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.server.is_empty() {
            return Err(ConfigError::ValidationError(
                "connection server cannot be empty".to_string(),
            ));
        }

        if self.connection.port == 0 {
            return Err(ConfigError::ValidationError(
                "connection port must be greater than 0".to_string(),
            ));
        }

        self.storage_mode()?;
        self.database_type()?;

        match self.display.format.as_str() {
            "table" | "json" | "none" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid display format: {}",
                    self.display.format
                )))
            }
        }

        if self.display.table_field_limit == 0 {
            return Err(ConfigError::ValidationError(
                "table_field_limit must be greater than 0".to_string(),
            ));
        }

        if self.backend.kind != "memory" {
            return Err(ConfigError::ValidationError(format!(
                "Unsupported backend kind: {}",
                self.backend.kind
            )));
        }

        if self.backend.users.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend users cannot be empty".to_string(),
            ));
        }

        if self.backend.users.iter().any(|u| u.name.is_empty()) {
            return Err(ConfigError::ValidationError(
                "backend user name cannot be empty".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "text" | "compact" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    pub fn storage_mode(&self) -> Result<StorageMode, ConfigError> {
        self.database
            .storage
            .parse()
            .map_err(ConfigError::ValidationError)
    }

    pub fn database_type(&self) -> Result<DatabaseType, ConfigError> {
        self.database
            .db_type
            .parse()
            .map_err(ConfigError::ValidationError)
    }

    /// Dispatcher defaults derived from the connection and database sections
    pub fn dispatch_defaults(&self) -> Result<DispatchDefaults, ConfigError> {
        Ok(DispatchDefaults {
            connect: ConnectSpec::with_defaults(&self.connection.server, self.connection.port),
            storage: self.storage_mode()?,
            db_type: self.database_type()?,
        })
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            backend: BackendConfig {
                seed_databases: vec!["demo".to_string()],
                ..Config::default().backend
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
