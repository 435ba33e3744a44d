// crates/iris-lots-store-sqlite/src/sync/mod.rs
// ============================================================================
// Module: Exchange Strategies
// Description: Selects the exchange medium used to hand lots to the tool.
// Purpose: Dispatch to the direct-database or file strategy chosen at startup.
// Dependencies: iris-lots-core
// ============================================================================

//! ## Overview
//! [`Synchronizer`] is chosen once from configuration and then used by the
//! worker through the [`SyncStrategy`] contract.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod database;
pub mod file;

// ============================================================================
// SECTION: Imports
// ============================================================================

use iris_lots_core::ExchangeHandle;
use iris_lots_core::Manager;
use iris_lots_core::SyncError;
use iris_lots_core::SyncStrategy;

pub use self::database::DatabaseSync;
pub use self::file::FileSync;

// ============================================================================
// SECTION: Synchronizer
// ============================================================================

/// Exchange strategy selected at configuration time.
#[derive(Clone)]
pub enum Synchronizer {
    /// Tool reads the queue database directly.
    Database(DatabaseSync),
    /// Tool reads an external database file.
    File(FileSync),
}

impl Synchronizer {
    /// Returns the strategy label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::File(_) => "file",
        }
    }
}

impl SyncStrategy for Synchronizer {
    fn export_lot(&self, manager: &Manager) -> Result<ExchangeHandle, SyncError> {
        match self {
            Self::Database(sync) => sync.export_lot(manager),
            Self::File(sync) => sync.export_lot(manager),
        }
    }

    fn import_lot(&self, manager: &Manager) -> Result<(), SyncError> {
        match self {
            Self::Database(sync) => sync.import_lot(manager),
            Self::File(sync) => sync.import_lot(manager),
        }
    }
}
