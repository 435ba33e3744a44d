// crates/iris-lots-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Lot Store
// Description: Durable lot queue and certificate staging backed by SQLite.
// Purpose: Implement LotStore with transactional, exactly-once staging.
// Dependencies: iris-lots-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! [`SqliteLotStore`] keeps the `manager` queue table, the shared
//! `uniqueIdent`/`uniqueMedCod` pair for single-certificate lots, one
//! `<uid>Ident`/`<uid>MedCod` pair per multi-certificate lot, and the
//! `codedLot` snapshots that hold multi-certificate results until delivery.
//!
//! Every operation runs in one `IMMEDIATE` transaction. Staging reads the
//! rows, flips the lot to RUNNING, and deletes the source rows in that
//! transaction, so a lot is handed out at most once even with several
//! consumers on the same database file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use iris_lots_core::Certificate;
use iris_lots_core::CertificateBatch;
use iris_lots_core::LotStore;
use iris_lots_core::LotType;
use iris_lots_core::LotUid;
use iris_lots_core::Manager;
use iris_lots_core::OwnerId;
use iris_lots_core::ProcessingStatus;
use iris_lots_core::Recovery;
use iris_lots_core::StoreError;
use iris_lots_core::unix_millis;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;

use crate::backend::LotTables;
use crate::backend::SqliteStoreConfig;
use crate::backend::SqliteStoreError;
use crate::backend::UNIQUE_LOT;
use crate::backend::create_queue_tables;
use crate::backend::db_err;
use crate::backend::ensure_parent_dir;
use crate::backend::initialize_schema;
use crate::backend::open_connection;
use crate::backend::table_exists;
use crate::backend::validate_store_path;
use crate::rows::count_idents;
use crate::rows::delete_certificate;
use crate::rows::insert_certificates;
use crate::rows::select_certificates;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed lot queue.
#[derive(Clone)]
pub struct SqliteLotStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLotStore {
    /// Opens the store, creating the schema when missing.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or its
    /// schema version is unsupported.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Drops every lot table pair, the coded snapshots, and the queue, then
    /// recreates the empty schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when a drop or create fails.
    pub fn reset(&self) -> Result<(), SqliteStoreError> {
        self.with_transaction(|tx| {
            LotTables::unique().drop_tables(tx)?;
            if table_exists(tx, "manager")? {
                let uids = {
                    let mut statement = tx
                        .prepare("SELECT uid FROM manager WHERE lotType = ?1")
                        .map_err(db_err)?;
                    let rows = statement
                        .query_map(params![LotType::Multiple.code()], |row| row.get::<_, String>(0))
                        .map_err(db_err)?;
                    rows.collect::<Result<Vec<String>, _>>().map_err(db_err)?
                };
                for uid in uids {
                    LotTables::for_lot(&uid)
                        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?
                        .drop_tables(tx)?;
                }
            }
            tx.execute_batch("DROP TABLE IF EXISTS codedLot; DROP TABLE IF EXISTS manager;")
                .map_err(db_err)?;
            create_queue_tables(tx)
        })
    }

    /// Returns the manager row of a lot, if present.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the row is
    /// malformed.
    pub fn manager(
        &self,
        owner: &OwnerId,
        uid: &LotUid,
    ) -> Result<Option<Manager>, SqliteStoreError> {
        self.with_transaction(|tx| load_manager(tx, owner, uid))
    }

    /// Returns the certificate row count of a lot table pair, or `None` when
    /// the pair does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] for unsafe lot names or failed queries.
    pub fn lot_size(&self, lot: &str) -> Result<Option<usize>, SqliteStoreError> {
        let tables = LotTables::for_lot(lot)?;
        self.with_transaction(|tx| {
            if !tables.exist(tx)? {
                return Ok(None);
            }
            count_idents(tx, &tables).map(Some)
        })
    }

    /// Creates the exchange table pair used by the direct-database strategy.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for unsafe or reserved names and
    /// [`SqliteStoreError::Db`] when the DDL fails.
    pub fn ensure_exchange_tables(&self, lot: &str) -> Result<(), SqliteStoreError> {
        let tables = exchange_tables(lot)?;
        self.with_transaction(|tx| tables.create(tx))
    }

    /// Stages a READY lot straight into the exchange pair in one transaction.
    /// Returns the number of certificates staged; zero when the lot was not
    /// READY.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when staging fails; nothing is changed.
    pub fn stage_into_exchange(
        &self,
        manager: &Manager,
        lot: &str,
    ) -> Result<usize, SqliteStoreError> {
        let exchange = exchange_tables(lot)?;
        self.with_transaction(|tx| {
            let certificates = take_staged(tx, manager)?;
            if certificates.is_empty() {
                return Ok(0);
            }
            exchange.clear(tx)?;
            insert_certificates(tx, &exchange, &certificates)?;
            Ok(certificates.len())
        })
    }

    /// Moves coded rows from the exchange pair back into the queue and marks
    /// the lot FINISHED in one transaction. Returns the number of
    /// certificates imported.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the lot is not RUNNING or the move
    /// fails; nothing is changed.
    pub fn commit_from_exchange(
        &self,
        manager: &Manager,
        lot: &str,
    ) -> Result<usize, SqliteStoreError> {
        let exchange = exchange_tables(lot)?;
        self.with_transaction(|tx| {
            let results = select_certificates(tx, &exchange, None)?;
            let count = results.len();
            exchange.clear(tx)?;
            store_results(tx, manager, results)?;
            Ok(count)
        })
    }

    /// Runs a closure inside an `IMMEDIATE` transaction and commits on success.
    fn with_transaction<T>(
        &self,
        operation: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        let value = operation(&tx)?;
        tx.commit().map_err(db_err)?;
        drop(guard);
        Ok(value)
    }

    /// Stages a batch and inserts its READY manager row.
    fn submit_lot(
        &self,
        owner: &OwnerId,
        batch: CertificateBatch,
    ) -> Result<Manager, SqliteStoreError> {
        let (uid, lot_type, tables) = if batch.is_single() {
            let uid = LotUid::new(batch.certificates()[0].key().as_str());
            uid.validate().map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            (uid, LotType::Unique, LotTables::unique())
        } else {
            let uid = LotUid::generate();
            let tables = LotTables::for_lot(uid.as_str())?;
            (uid, LotType::Multiple, tables)
        };
        let manager = Manager::ready(uid, owner.clone(), lot_type);
        self.with_transaction(|tx| {
            if lot_type == LotType::Unique {
                let taken: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM manager WHERE uid = ?1",
                        params![manager.uid.as_str()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(db_err)?;
                if taken.is_some() {
                    return Err(SqliteStoreError::Conflict(format!(
                        "certificate {} already staged",
                        manager.uid
                    )));
                }
            } else {
                tables.create(tx)?;
            }
            insert_certificates(tx, &tables, batch.certificates())?;
            tx.execute(
                "INSERT INTO manager (uid, owner, created, accessed, lotType, status) VALUES (?1, \
                 ?2, ?3, ?4, ?5, ?6)",
                params![
                    manager.uid.as_str(),
                    manager.owner.as_str(),
                    manager.created,
                    manager.accessed,
                    manager.lot_type.code(),
                    manager.status.code()
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;
        Ok(manager)
    }

    /// Returns the oldest READY manager row.
    fn next_ready_lot(&self) -> Result<Option<Manager>, SqliteStoreError> {
        self.with_transaction(|tx| {
            tx.query_row(
                "SELECT uid, owner, created, accessed, lotType, status FROM manager WHERE status \
                 = ?1 ORDER BY created, rowid LIMIT 1",
                params![ProcessingStatus::Ready.code()],
                raw_manager,
            )
            .optional()
            .map_err(db_err)?
            .map(manager_from_raw)
            .transpose()
        })
    }

    /// Delivers a finished lot once, or touches a pending one.
    fn recover_lot(&self, owner: &OwnerId, uid: &LotUid) -> Result<Recovery, SqliteStoreError> {
        self.with_transaction(|tx| {
            let manager = load_manager(tx, owner, uid)?
                .ok_or_else(|| SqliteStoreError::NotFound(uid.to_string()))?;
            if manager.status.is_pending() {
                tx.execute(
                    "UPDATE manager SET accessed = ?1 WHERE uid = ?2 AND owner = ?3",
                    params![unix_millis(), uid.as_str(), owner.as_str()],
                )
                .map_err(db_err)?;
                return Ok(Recovery::Pending(manager.status));
            }
            let certificates = match manager.lot_type {
                LotType::Unique => {
                    let tables = LotTables::unique();
                    let certificates = select_certificates(tx, &tables, Some(uid.as_str()))?;
                    delete_certificate(tx, &tables, uid.as_str())?;
                    certificates
                }
                LotType::Multiple => {
                    let snapshot: Option<String> = tx
                        .query_row(
                            "SELECT certificates FROM codedLot WHERE uid = ?1 AND owner = ?2",
                            params![uid.as_str(), owner.as_str()],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(db_err)?;
                    let snapshot = snapshot.ok_or_else(|| {
                        SqliteStoreError::Corrupt(format!("coded results missing for lot {uid}"))
                    })?;
                    let certificates: Vec<Certificate> = serde_json::from_str(&snapshot)
                        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
                    tx.execute(
                        "DELETE FROM codedLot WHERE uid = ?1 AND owner = ?2",
                        params![uid.as_str(), owner.as_str()],
                    )
                    .map_err(db_err)?;
                    certificates
                }
            };
            tx.execute(
                "DELETE FROM manager WHERE uid = ?1 AND owner = ?2",
                params![uid.as_str(), owner.as_str()],
            )
            .map_err(db_err)?;
            Ok(Recovery::Finished(certificates))
        })
    }
}

impl LotStore for SqliteLotStore {
    fn submit(&self, owner: &OwnerId, batch: CertificateBatch) -> Result<Manager, StoreError> {
        self.submit_lot(owner, batch).map_err(StoreError::from)
    }

    fn next_ready(&self) -> Result<Option<Manager>, StoreError> {
        self.next_ready_lot().map_err(StoreError::from)
    }

    fn stage_for_export(&self, manager: &Manager) -> Result<Vec<Certificate>, StoreError> {
        self.with_transaction(|tx| take_staged(tx, manager)).map_err(StoreError::from)
    }

    fn commit_import(
        &self,
        manager: &Manager,
        results: Vec<Certificate>,
    ) -> Result<(), StoreError> {
        self.with_transaction(|tx| store_results(tx, manager, results)).map_err(StoreError::from)
    }

    fn recover(&self, owner: &OwnerId, uid: &LotUid) -> Result<Recovery, StoreError> {
        self.recover_lot(owner, uid).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Transaction Steps
// ============================================================================

/// Table pair of a lot in the queue database.
fn lot_tables(manager: &Manager) -> Result<LotTables, SqliteStoreError> {
    match manager.lot_type {
        LotType::Unique => Ok(LotTables::unique()),
        LotType::Multiple => LotTables::for_lot(manager.uid.as_str()),
    }
}

/// Validates an exchange lot name; the shared staging name is reserved in any
/// letter case because `SQLite` table names ignore case.
fn exchange_tables(lot: &str) -> Result<LotTables, SqliteStoreError> {
    if lot.eq_ignore_ascii_case(UNIQUE_LOT) {
        return Err(SqliteStoreError::Invalid(format!("exchange lot name {lot} is reserved")));
    }
    LotTables::for_lot(lot)
}

/// Reads a READY lot's rows, flips it to RUNNING, and deletes the source rows.
/// Returns no rows when the lot is absent or no longer READY.
fn take_staged(tx: &Connection, manager: &Manager) -> Result<Vec<Certificate>, SqliteStoreError> {
    let Some(current) = load_manager(tx, &manager.owner, &manager.uid)? else {
        return Ok(Vec::new());
    };
    if current.status != ProcessingStatus::Ready {
        return Ok(Vec::new());
    }
    let tables = lot_tables(&current)?;
    let certificates = match current.lot_type {
        LotType::Unique => {
            let certificates = select_certificates(tx, &tables, Some(current.uid.as_str()))?;
            delete_certificate(tx, &tables, current.uid.as_str())?;
            certificates
        }
        LotType::Multiple => {
            if !tables.exist(tx)? {
                return Err(SqliteStoreError::Corrupt(format!(
                    "tables for lot {} are missing",
                    current.uid
                )));
            }
            let certificates = select_certificates(tx, &tables, None)?;
            tables.clear(tx)?;
            certificates
        }
    };
    if certificates.is_empty() {
        return Err(SqliteStoreError::Corrupt(format!(
            "lot {} has no staged certificates",
            current.uid
        )));
    }
    set_status(tx, &current, ProcessingStatus::Running)?;
    Ok(certificates)
}

/// Writes coded results for a RUNNING lot and flips it to FINISHED.
fn store_results(
    tx: &Connection,
    manager: &Manager,
    results: Vec<Certificate>,
) -> Result<(), SqliteStoreError> {
    let current = load_manager(tx, &manager.owner, &manager.uid)?
        .ok_or_else(|| SqliteStoreError::NotFound(manager.uid.to_string()))?;
    if current.status != ProcessingStatus::Running {
        return Err(SqliteStoreError::Conflict(format!("lot {} is not running", current.uid)));
    }
    match current.lot_type {
        LotType::Unique => insert_certificates(tx, &LotTables::unique(), &results)?,
        LotType::Multiple => {
            let snapshot = serde_json::to_string(&results)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "INSERT INTO codedLot (uid, owner, certificates) VALUES (?1, ?2, ?3)",
                params![current.uid.as_str(), current.owner.as_str(), snapshot],
            )
            .map_err(db_err)?;
            lot_tables(&current)?.drop_tables(tx)?;
        }
    }
    set_status(tx, &current, ProcessingStatus::Finished)
}

/// Updates the status of a manager row.
fn set_status(
    tx: &Connection,
    manager: &Manager,
    status: ProcessingStatus,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "UPDATE manager SET status = ?1 WHERE uid = ?2 AND owner = ?3",
        params![status.code(), manager.uid.as_str(), manager.owner.as_str()],
    )
    .map_err(db_err)?;
    Ok(())
}

// ============================================================================
// SECTION: Manager Rows
// ============================================================================

/// Manager row as stored.
type RawManager = (String, String, i64, i64, i64, i64);

/// Loads a manager row by its natural key.
fn load_manager(
    tx: &Connection,
    owner: &OwnerId,
    uid: &LotUid,
) -> Result<Option<Manager>, SqliteStoreError> {
    tx.query_row(
        "SELECT uid, owner, created, accessed, lotType, status FROM manager WHERE uid = ?1 AND \
         owner = ?2",
        params![uid.as_str(), owner.as_str()],
        raw_manager,
    )
    .optional()
    .map_err(db_err)?
    .map(manager_from_raw)
    .transpose()
}

/// Reads the manager columns of a row.
fn raw_manager(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawManager> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

/// Decodes stored enum codes; unknown codes are corruption.
fn manager_from_raw(raw: RawManager) -> Result<Manager, SqliteStoreError> {
    let (uid, owner, created, accessed, lot_type, status) = raw;
    let lot_type = LotType::from_code(lot_type).ok_or_else(|| {
        SqliteStoreError::Corrupt(format!("lot {uid} has unknown lotType {lot_type}"))
    })?;
    let status = ProcessingStatus::from_code(status).ok_or_else(|| {
        SqliteStoreError::Corrupt(format!("lot {uid} has unknown status {status}"))
    })?;
    Ok(Manager {
        uid: LotUid::new(uid),
        owner: OwnerId::new(owner),
        created,
        accessed,
        lot_type,
        status,
    })
}
