// crates/iris-lots-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Lot Store
// Description: Durable lot queue and exchange strategies on SQLite.
// Purpose: Provide the production storage backend for iris-lots.
// Dependencies: iris-lots-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides the SQLite-backed [`LotStore`](iris_lots_core::LotStore)
//! and both exchange strategies: the direct-database table pair and the
//! external exchange file. Table names are built only from validated lot
//! names.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backend;
pub mod rows;
pub mod store;
pub mod sync;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backend::LotTables;
pub use backend::SqliteStoreConfig;
pub use backend::SqliteStoreError;
pub use backend::SqliteStoreMode;
pub use backend::SqliteSyncMode;
pub use backend::UNIQUE_LOT;
pub use backend::table_exists;
pub use backend::validate_lot_name;
pub use store::SqliteLotStore;
pub use sync::DatabaseSync;
pub use sync::FileSync;
pub use sync::Synchronizer;
