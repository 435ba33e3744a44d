// crates/iris-lots-store-sqlite/src/sync/file.rs
// ============================================================================
// Module: File Exchange
// Description: Exchange strategy over an external database file.
// Purpose: Copy lots into the tool's own file and read coded rows back.
// Dependencies: iris-lots-core, rusqlite, crate::rows
// ============================================================================

//! ## Overview
//! The tool owns a separate database file holding one `<lot>Ident` and one
//! `<lot>MedCod` table. Export empties both tables and writes the lot row by
//! row; the tool is then run with `lname=<lot>`. Import reads both tables in
//! scan order and reattaches cause lines with a forward linear scan.
//!
//! The scan expects cause lines grouped by certificate in the same order as
//! the certificate rows. A line that matches neither the current nor the next
//! certificate falls back to a lookup by key, and later lines are compared
//! against that certificate. Lines interleaved across certificates can
//! therefore attach to the wrong row when keys repeat out of order; the file
//! format carries no ordering guarantee to rule this out.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use iris_lots_core::CauseLine;
use iris_lots_core::Certificate;
use iris_lots_core::ExchangeHandle;
use iris_lots_core::LotStore;
use iris_lots_core::Manager;
use iris_lots_core::SyncError;
use iris_lots_core::SyncStrategy;
use rusqlite::Connection;

use crate::backend::LotTables;
use crate::backend::SqliteStoreError;
use crate::backend::open_existing;
use crate::rows::insert_certificates;
use crate::rows::select_cause_lines;
use crate::rows::select_idents;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Busy timeout for the exchange file.
const EXCHANGE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Exchange through a table pair in an external database file.
#[derive(Clone)]
pub struct FileSync {
    /// Queue store.
    store: Arc<dyn LotStore>,
    /// Exchange file path.
    path: PathBuf,
    /// Exchange lot name, passed to the tool.
    lot: String,
    /// Exchange table pair.
    tables: LotTables,
}

impl FileSync {
    /// Opens the strategy after checking that the file and both tables exist.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Invalid`] when the lot name is unusable, the file
    /// is missing, or either table is absent.
    pub fn new(
        store: Arc<dyn LotStore>,
        path: impl Into<PathBuf>,
        lot: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let path = path.into();
        let lot = lot.into();
        let tables = LotTables::for_lot(&lot).map_err(|err| SyncError::Invalid(err.to_string()))?;
        let connection = open_file(&path).map_err(|err| SyncError::Invalid(err.to_string()))?;
        let present = tables.exist(&connection).map_err(exchange_err)?;
        if !present {
            return Err(SyncError::Invalid(format!(
                "exchange file {} has no {} and {} tables",
                path.display(),
                tables.ident,
                tables.med_cod
            )));
        }
        Ok(Self {
            store,
            path,
            lot,
            tables,
        })
    }

    /// Returns the exchange file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the exchange lot name.
    #[must_use]
    pub fn lot(&self) -> &str {
        &self.lot
    }
}

impl SyncStrategy for FileSync {
    fn export_lot(&self, manager: &Manager) -> Result<ExchangeHandle, SyncError> {
        let certificates = self.store.stage_for_export(manager)?;
        if certificates.is_empty() {
            return Ok(ExchangeHandle {
                lot_name: Some(self.lot.clone()),
                certificates: 0,
            });
        }
        let mut connection = open_file(&self.path).map_err(exchange_err)?;
        let tx = connection.transaction().map_err(|err| SyncError::Exchange(err.to_string()))?;
        self.tables.clear(&tx).map_err(exchange_err)?;
        insert_certificates(&tx, &self.tables, &certificates).map_err(exchange_err)?;
        tx.commit().map_err(|err| SyncError::Exchange(err.to_string()))?;
        Ok(ExchangeHandle {
            lot_name: Some(self.lot.clone()),
            certificates: certificates.len(),
        })
    }

    fn import_lot(&self, manager: &Manager) -> Result<(), SyncError> {
        let connection = open_file(&self.path).map_err(exchange_err)?;
        let mut certificates =
            select_idents(&connection, &self.tables, None).map_err(exchange_err)?;
        let lines = select_cause_lines(&connection, &self.tables, None).map_err(exchange_err)?;
        drop(connection);
        attach_in_scan_order(&mut certificates, lines)?;
        self.store.commit_import(manager, certificates)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens the exchange file.
fn open_file(path: &Path) -> Result<Connection, SqliteStoreError> {
    open_existing(path, EXCHANGE_BUSY_TIMEOUT)
}

/// Maps a storage error on the exchange file.
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err adapter.")]
fn exchange_err(err: SqliteStoreError) -> SyncError {
    SyncError::Exchange(err.to_string())
}

/// Attaches cause lines to certificates by forward linear scan.
fn attach_in_scan_order(
    certificates: &mut [Certificate],
    lines: Vec<CauseLine>,
) -> Result<(), SyncError> {
    let mut index = 0;
    let mut current = 0;
    for line in lines {
        let key = line.certificate_key.as_str();
        let matches = |position: usize| {
            certificates.get(position).is_some_and(|certificate| certificate.key().as_str() == key)
        };
        if !matches(current) {
            index += 1;
            current = if matches(index) {
                index
            } else {
                certificates
                    .iter()
                    .position(|certificate| certificate.key().as_str() == key)
                    .ok_or_else(|| {
                        SyncError::Exchange(format!("cause line for unknown certificate {key}"))
                    })?
            };
        }
        certificates[current]
            .add_cause_line(line)
            .map_err(|err| SyncError::Exchange(err.to_string()))?;
    }
    Ok(())
}
