// crates/iris-lots-store-sqlite/src/backend.rs
// ============================================================================
// Module: SQLite Storage Backend
// Description: Connection setup, schema scripts, and table-existence checks.
// Purpose: Give the lot store and exchange strategies one access layer.
// Dependencies: iris-lots-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! The storage backend opens connections with fixed pragmas, owns the DDL for
//! the queue schema, and builds table names for lot table pairs. Lot names are
//! spliced into SQL as quoted identifiers, so every name is checked against
//! [`validate_lot_name`] before it reaches a statement.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use iris_lots_core::StoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the queue tables.
pub const SCHEMA_VERSION: i64 = 1;
/// Lot name of the shared single-certificate staging pair.
pub const UNIQUE_LOT: &str = "unique";
/// Maximum length of a lot name used in a table name.
pub const MAX_LOT_NAME_LENGTH: usize = 30;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` lot store.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for the given path with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored rows are malformed.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid request data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// No manager row for the requested lot.
    #[error("lot not found: {0}")]
    NotFound(String),
    /// Request collides with staged data.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
        }
    }
}

/// Maps an engine error into [`SqliteStoreError::Db`].
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err adapter.")]
pub(crate) fn db_err(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Table Names
// ============================================================================

/// Checks that a lot name is safe to splice into a table name.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Invalid`] for empty, overlong, or
/// non-alphanumeric names.
pub fn validate_lot_name(lot: &str) -> Result<(), SqliteStoreError> {
    if lot.is_empty() {
        return Err(SqliteStoreError::Invalid("lot name must be non-empty".to_string()));
    }
    if lot.len() > MAX_LOT_NAME_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "lot name exceeds {MAX_LOT_NAME_LENGTH} characters"
        )));
    }
    if !lot.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(SqliteStoreError::Invalid(format!("lot name {lot} must be alphanumeric")));
    }
    Ok(())
}

/// Table names of one lot table pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotTables {
    /// Certificate table (`<lot>Ident`).
    pub ident: String,
    /// Cause-line table (`<lot>MedCod`).
    pub med_cod: String,
}

impl LotTables {
    /// Builds the table pair for a lot after validating its name.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the lot name is unsafe.
    pub fn for_lot(lot: &str) -> Result<Self, SqliteStoreError> {
        validate_lot_name(lot)?;
        Ok(Self {
            ident: format!("{lot}Ident"),
            med_cod: format!("{lot}MedCod"),
        })
    }

    /// Shared single-certificate staging pair.
    #[must_use]
    pub fn unique() -> Self {
        Self {
            ident: format!("{UNIQUE_LOT}Ident"),
            med_cod: format!("{UNIQUE_LOT}MedCod"),
        }
    }

    /// Creates both tables if missing.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the DDL fails.
    pub fn create(&self, connection: &Connection) -> Result<(), SqliteStoreError> {
        connection.execute_batch(&ident_table_script(&self.ident)).map_err(db_err)?;
        connection.execute_batch(&med_cod_table_script(&self.med_cod)).map_err(db_err)
    }

    /// Drops both tables if present.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the DDL fails.
    pub fn drop_tables(&self, connection: &Connection) -> Result<(), SqliteStoreError> {
        connection
            .execute_batch(&format!(
                "DROP TABLE IF EXISTS \"{}\"; DROP TABLE IF EXISTS \"{}\";",
                self.ident, self.med_cod
            ))
            .map_err(db_err)
    }

    /// Deletes every row of both tables.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the delete fails.
    pub fn clear(&self, connection: &Connection) -> Result<(), SqliteStoreError> {
        connection
            .execute_batch(&format!(
                "DELETE FROM \"{}\"; DELETE FROM \"{}\";",
                self.ident, self.med_cod
            ))
            .map_err(db_err)
    }

    /// Returns true when both tables exist.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the catalog query fails.
    pub fn exist(&self, connection: &Connection) -> Result<bool, SqliteStoreError> {
        Ok(table_exists(connection, &self.ident)? && table_exists(connection, &self.med_cod)?)
    }
}

// ============================================================================
// SECTION: Schema Scripts
// ============================================================================

/// DDL for a certificate table.
fn ident_table_script(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            certificateKey TEXT NOT NULL PRIMARY KEY,
            lastChange TEXT,
            dateBirth TEXT,
            dateDeath TEXT,
            age TEXT,
            sex TEXT,
            mannerOfDeath INTEGER,
            ucCode TEXT,
            mainInjury TEXT,
            status TEXT DEFAULT 'Initial',
            reject TEXT DEFAULT 'No',
            coding TEXT DEFAULT 'Automatic',
            codingVersion TEXT,
            codingFlags TEXT,
            selectedCodes TEXT,
            substitutedCodes TEXT,
            ernCodes TEXT,
            acmeCodes TEXT,
            multipleCodes TEXT,
            comments TEXT,
            freeText TEXT,
            toDoList TEXT,
            coderReject TEXT,
            diagnosisModified TEXT,
            residence TEXT,
            name TEXT,
            address TEXT,
            autopsyRequested TEXT,
            autopsyUsed TEXT,
            recentSurgery TEXT,
            dateOfSurgery TEXT,
            reasonSurgery TEXT,
            dateOfInjury TEXT,
            placeOfOccurrence TEXT,
            activityCode TEXT,
            externalFreeText TEXT,
            pregnancy TEXT,
            pregnancyContributeDeath TEXT,
            stillbirth TEXT,
            multiplePregnancy TEXT,
            completedWeeks TEXT,
            birthWeight TEXT,
            ageOfMother TEXT,
            conditionsMother TEXT,
            certImage TEXT
        );"
    )
}

/// DDL for a cause-line table.
fn med_cod_table_script(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            certificateKey TEXT NOT NULL,
            lineNb INTEGER NOT NULL,
            textLine TEXT,
            codeLine TEXT,
            intervalLine TEXT,
            codeOnly TEXT,
            lineCoded TEXT,
            PRIMARY KEY (certificateKey, lineNb)
        );"
    )
}

/// DDL for the queue table and the coded-result snapshots.
const QUEUE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS manager (
        uid TEXT NOT NULL,
        owner TEXT NOT NULL,
        created INTEGER NOT NULL,
        accessed INTEGER NOT NULL,
        lotType INTEGER NOT NULL,
        status INTEGER NOT NULL,
        PRIMARY KEY (uid, owner)
    );
    CREATE INDEX IF NOT EXISTS idx_manager_status_created ON manager (status, created);
    CREATE TABLE IF NOT EXISTS codedLot (
        uid TEXT NOT NULL,
        owner TEXT NOT NULL,
        certificates TEXT NOT NULL,
        PRIMARY KEY (uid, owner)
    );";

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Validates store paths for safety limits.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Invalid`] when the path is too long or names a
/// directory.
pub fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Ensures the parent directory for the store exists.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Opens the queue database, creating it when missing.
pub(crate) fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_err)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Opens an existing exchange file without creating it.
pub(crate) fn open_existing(
    path: &Path,
    busy_timeout: Duration,
) -> Result<Connection, SqliteStoreError> {
    if !path.is_file() {
        return Err(SqliteStoreError::Io(format!(
            "exchange file {} does not exist",
            path.display()
        )));
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags).map_err(db_err)?;
    connection.busy_timeout(busy_timeout).map_err(db_err)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_err)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_err)?;
    Ok(())
}

/// Returns true when a table with the given name exists.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the catalog query fails.
pub fn table_exists(connection: &Connection, table: &str) -> Result<bool, SqliteStoreError> {
    let found: Option<i64> = connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    Ok(found.is_some())
}

/// Creates the queue schema or validates the stored version.
pub(crate) fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_err)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_err)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_err)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_err)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    create_queue_tables(&tx)?;
    tx.commit().map_err(db_err)?;
    Ok(())
}

/// Creates the manager, coded-result, and shared staging tables.
pub(crate) fn create_queue_tables(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(QUEUE_SCHEMA).map_err(db_err)?;
    LotTables::unique().create(connection)
}
