// ABOUTME: Configuration loading and validation for the todos storage layer.
// ABOUTME: Reads TODOS_* environment variables and builds the selected backend from them.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use todos_store::{
    DurabilityMode, InvalidDurabilityMode, JsonStore, JsonStoreOptions, SqliteStore,
    SqliteStoreOptions, TodoStore,
};

/// Errors that can occur during configuration loading. All of them are raised
/// before any store is constructed or any file is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TODOS_BACKEND must be \"json\" or \"sqlite\", got {0:?}")]
    UnknownBackend(String),

    #[error("TODOS_DURABILITY: {0}")]
    Durability(#[from] InvalidDurabilityMode),

    #[error("TODOS_BUSY_TIMEOUT_MS is not a non-negative integer: {0}")]
    InvalidBusyTimeout(String),

    #[error("{var} is not a boolean: {value}")]
    InvalidBool { var: &'static str, value: String },
}

/// Which storage backend serves the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Json,
    Sqlite,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "file" => Ok(Self::Json),
            "sqlite" | "sql" | "relational" => Ok(Self::Sqlite),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TodosConfig {
    pub home: PathBuf,
    pub backend: Backend,
    pub json_path: PathBuf,
    pub db_path: PathBuf,
    pub schema_path: Option<PathBuf>,
    pub durability: DurabilityMode,
    pub pretty: bool,
    pub busy_timeout: Duration,
}

impl TodosConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - TODOS_HOME: data directory (default: ~/.todos)
    /// - TODOS_BACKEND: json | sqlite (default: json)
    /// - TODOS_JSON_PATH: JSON file path (default: $TODOS_HOME/todos.json)
    /// - TODOS_DB_PATH: SQLite database path (default: $TODOS_HOME/todos.db)
    /// - TODOS_SCHEMA_PATH: external bootstrap script for SQLite (optional)
    /// - TODOS_DURABILITY: deferred | immediate (default: deferred)
    /// - TODOS_PRETTY: pretty-print the JSON file (default: true)
    /// - TODOS_BUSY_TIMEOUT_MS: SQLite lock wait in milliseconds (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup. Empty values
    /// count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = var("TODOS_HOME").map(PathBuf::from).unwrap_or_else(|| {
            var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".todos")
        });

        let backend = match var("TODOS_BACKEND") {
            Some(v) => v.parse()?,
            None => Backend::default(),
        };

        let json_path = var("TODOS_JSON_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("todos.json"));
        let db_path = var("TODOS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("todos.db"));
        let schema_path = var("TODOS_SCHEMA_PATH").map(PathBuf::from);

        let durability = match var("TODOS_DURABILITY") {
            Some(v) => v.parse()?,
            None => DurabilityMode::default(),
        };

        let pretty = match var("TODOS_PRETTY") {
            Some(v) => parse_bool("TODOS_PRETTY", &v)?,
            None => true,
        };

        let busy_timeout = match var("TODOS_BUSY_TIMEOUT_MS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidBusyTimeout(v.clone()))?,
            None => todos_store::sqlite::DEFAULT_BUSY_TIMEOUT,
        };

        Ok(Self {
            home,
            backend,
            json_path,
            db_path,
            schema_path,
            durability,
            pretty,
            busy_timeout,
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}

/// Construct the configured backend. Nothing is opened until `init()`.
pub fn open_store(config: &TodosConfig) -> Box<dyn TodoStore> {
    match config.backend {
        Backend::Json => {
            tracing::info!(
                path = %config.json_path.display(),
                durability = %config.durability,
                "using json store"
            );
            Box::new(JsonStore::new(
                &config.json_path,
                JsonStoreOptions {
                    durability: config.durability,
                    pretty: config.pretty,
                },
            ))
        }
        Backend::Sqlite => {
            tracing::info!(path = %config.db_path.display(), "using sqlite store");
            Box::new(SqliteStore::new(
                &config.db_path,
                SqliteStoreOptions {
                    busy_timeout: config.busy_timeout,
                    schema_path: config.schema_path.clone(),
                },
            ))
        }
    }
}
