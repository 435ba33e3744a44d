// crates/iris-lots-store-sqlite/src/sync/database.rs
// ============================================================================
// Module: Direct-Database Exchange
// Description: Exchange strategy where the tool reads the queue database.
// Purpose: Move lot rows table-to-table inside the queue database.
// Dependencies: iris-lots-core, crate::store
// ============================================================================

//! ## Overview
//! The coding tool is pointed at the queue database itself and reads one
//! fixed exchange pair (`<lot>Ident`/`<lot>MedCod`). Export and import are
//! single transactions on the store, so the tool needs no lot argument.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use iris_lots_core::ExchangeHandle;
use iris_lots_core::Manager;
use iris_lots_core::StoreError;
use iris_lots_core::SyncError;
use iris_lots_core::SyncStrategy;

use crate::backend::SqliteStoreError;
use crate::store::SqliteLotStore;

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Exchange through a table pair in the queue database.
#[derive(Clone)]
pub struct DatabaseSync {
    /// Queue store sharing the database with the tool.
    store: Arc<SqliteLotStore>,
    /// Exchange lot name.
    lot: String,
}

impl DatabaseSync {
    /// Creates the strategy and ensures the exchange pair exists.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Invalid`] for an unusable lot name and
    /// [`SyncError::Store`] when the tables cannot be created.
    pub fn new(store: Arc<SqliteLotStore>, lot: impl Into<String>) -> Result<Self, SyncError> {
        let lot = lot.into();
        store.ensure_exchange_tables(&lot).map_err(|err| match err {
            SqliteStoreError::Invalid(message) => SyncError::Invalid(message),
            other => SyncError::Store(StoreError::from(other)),
        })?;
        Ok(Self {
            store,
            lot,
        })
    }

    /// Returns the exchange lot name.
    #[must_use]
    pub fn lot(&self) -> &str {
        &self.lot
    }
}

impl SyncStrategy for DatabaseSync {
    fn export_lot(&self, manager: &Manager) -> Result<ExchangeHandle, SyncError> {
        let certificates = self
            .store
            .stage_into_exchange(manager, &self.lot)
            .map_err(|err| SyncError::Store(err.into()))?;
        Ok(ExchangeHandle {
            lot_name: None,
            certificates,
        })
    }

    fn import_lot(&self, manager: &Manager) -> Result<(), SyncError> {
        self.store
            .commit_from_exchange(manager, &self.lot)
            .map_err(|err| SyncError::Store(err.into()))?;
        Ok(())
    }
}
