// crates/iris-lots-config/src/config.rs
// ============================================================================
// Module: Iris Lots Configuration
// Description: Configuration loading and validation for iris-lots.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: iris-lots-core, iris-lots-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every referenced file (exchange file, tool executable, explicit wrapper) is
//! checked at load time so a bad deployment fails before the worker starts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use iris_lots_core::ToolCommand;
use iris_lots_core::runtime::DEFAULT_TOOL_TIMEOUT_SECONDS;
use iris_lots_store_sqlite::SqliteStoreConfig;
use iris_lots_store_sqlite::SqliteStoreMode;
use iris_lots_store_sqlite::SqliteSyncMode;
use iris_lots_store_sqlite::UNIQUE_LOT;
use iris_lots_store_sqlite::validate_lot_name;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "iris-lots.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "IRIS_LOTS_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default busy timeout for the queue database (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default exchange lot name.
const DEFAULT_LOT_NAME: &str = "iris";
/// Maximum tool timeout in seconds.
pub const MAX_TOOL_TIMEOUT_SECONDS: u64 = 86_400;
/// Wrapper program used when `tool.wine` is set.
const WINE_PROGRAM: &str = "wine";

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IrisLotsConfig {
    /// Queue database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Exchange medium configuration.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Coding tool configuration.
    #[serde(default)]
    pub tool: ToolConfig,
    /// Event sink configuration.
    #[serde(default)]
    pub events: EventsConfig,
}

impl IrisLotsConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.exchange.validate()?;
        self.tool.validate()?;
        self.events.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Database
// ============================================================================

/// Queue database server kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseType {
    /// `SQLite` database file.
    #[default]
    Sqlite,
}

/// Queue database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database server kind.
    #[serde(rename = "type", default)]
    pub database_type: DatabaseType,
    /// Database file path.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl DatabaseConfig {
    /// Validates database configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.database_type {
            DatabaseType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite database requires path".to_string())
                })?;
                validate_file_path("database.path", path)?;
                if path.is_dir() {
                    return Err(ConfigError::Invalid(
                        "database.path must be a file, not a directory".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Returns the store configuration for the queue database.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no path is configured.
    pub fn sqlite_config(&self) -> Result<SqliteStoreConfig, ConfigError> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("sqlite database requires path".to_string()))?;
        Ok(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        })
    }
}

/// Returns the default busy timeout for the queue database.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Exchange
// ============================================================================

/// Exchange medium kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeType {
    /// The tool reads the queue database directly.
    #[default]
    Database,
    /// The tool reads an external database file.
    File,
}

/// Exchange medium configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeConfig {
    /// Exchange medium kind.
    #[serde(rename = "type", default)]
    pub exchange_type: ExchangeType,
    /// Lot name of the exchange table pair.
    #[serde(default = "default_lot_name")]
    pub lot_name: String,
    /// Exchange file path (file medium only).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            exchange_type: ExchangeType::default(),
            lot_name: default_lot_name(),
            path: None,
        }
    }
}

impl ExchangeConfig {
    /// Validates exchange configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_lot_name(&self.lot_name)
            .map_err(|err| ConfigError::Invalid(format!("exchange.lot_name: {err}")))?;
        if !self.lot_name.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid(
                "exchange.lot_name must contain only letters".to_string(),
            ));
        }
        if self.lot_name.eq_ignore_ascii_case(UNIQUE_LOT) {
            return Err(ConfigError::Invalid(format!(
                "exchange.lot_name {UNIQUE_LOT} is reserved"
            )));
        }
        match self.exchange_type {
            ExchangeType::Database => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "database exchange must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            ExchangeType::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("file exchange requires path".to_string())
                })?;
                validate_file_path("exchange.path", path)?;
                if !path.is_file() {
                    return Err(ConfigError::Invalid(format!(
                        "exchange.path {} not found",
                        path.display()
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Returns the default exchange lot name.
fn default_lot_name() -> String {
    DEFAULT_LOT_NAME.to_string()
}

// ============================================================================
// SECTION: Tool
// ============================================================================

/// Coding tool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Tool executable path.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Runs the executable through `wine`.
    #[serde(default)]
    pub wine: bool,
    /// Explicit wrapper program, overriding `wine`.
    #[serde(default)]
    pub wrapper: Option<PathBuf>,
    /// Seconds to wait for the tool before killing it.
    #[serde(default = "default_tool_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            executable: None,
            wine: false,
            wrapper: None,
            timeout_seconds: default_tool_timeout_seconds(),
        }
    }
}

impl ToolConfig {
    /// Validates tool configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let executable = self
            .executable
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("tool.executable is required".to_string()))?;
        validate_file_path("tool.executable", executable)?;
        if !executable.is_file() {
            return Err(ConfigError::Invalid(format!(
                "tool.executable {} not found",
                executable.display()
            )));
        }
        if !is_executable(executable) {
            return Err(ConfigError::Invalid(format!(
                "tool.executable {} is not executable",
                executable.display()
            )));
        }
        if let Some(wrapper) = &self.wrapper {
            validate_file_path("tool.wrapper", wrapper)?;
            if !wrapper.is_file() {
                return Err(ConfigError::Invalid(format!(
                    "tool.wrapper {} not found",
                    wrapper.display()
                )));
            }
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TOOL_TIMEOUT_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "tool.timeout_seconds must be between 1 and {MAX_TOOL_TIMEOUT_SECONDS}"
            )));
        }
        Ok(())
    }

    /// Returns the wrapper program, if any.
    #[must_use]
    pub fn effective_wrapper(&self) -> Option<PathBuf> {
        self.wrapper.clone().or_else(|| self.wine.then(|| PathBuf::from(WINE_PROGRAM)))
    }

    /// Builds the tool command line template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no executable is configured.
    pub fn tool_command(&self) -> Result<ToolCommand, ConfigError> {
        let executable = self
            .executable
            .clone()
            .ok_or_else(|| ConfigError::Invalid("tool.executable is required".to_string()))?;
        let mut command =
            ToolCommand::new(executable).with_timeout(Duration::from_secs(self.timeout_seconds));
        if let Some(wrapper) = self.effective_wrapper() {
            command = command.with_wrapper(wrapper);
        }
        Ok(command)
    }
}

/// Returns the default tool timeout.
const fn default_tool_timeout_seconds() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECONDS
}

/// Returns true when the file carries an execute permission bit.
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o111 != 0)
}

/// Returns true for any existing file on platforms without mode bits.
#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event sink kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Events are discarded.
    None,
}

/// Event sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: EventSinkKind,
    /// Event log path (file sink only).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl EventsConfig {
    /// Validates event sink configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (EventSinkKind::File, Some(path)) => validate_file_path("events.path", path),
            (EventSinkKind::File, None) => {
                Err(ConfigError::Invalid("file event sink requires path".to_string()))
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("events.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured file path against length constraints.
fn validate_file_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
