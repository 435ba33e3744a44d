// crates/iris-lots-core/src/interfaces/mod.rs
// ============================================================================
// Module: Iris Lots Interfaces
// Description: Storage and exchange contracts used by the lot worker.
// Purpose: Keep the worker independent of concrete databases and media.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! [`LotStore`] owns manager rows and certificate tables. [`SyncStrategy`]
//! moves a staged lot into the coding tool's exchange medium and back. The
//! worker only talks to storage through these two traits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::Certificate;
use crate::core::CertificateBatch;
use crate::core::LotUid;
use crate::core::Manager;
use crate::core::OwnerId;
use crate::core::Recovery;

// ============================================================================
// SECTION: Lot Store
// ============================================================================

/// Lot store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No manager row for the requested `(uid, owner)`.
    #[error("lot not found: {0}")]
    NotFound(String),
    /// Request collides with existing data.
    #[error("lot store conflict: {0}")]
    Conflict(String),
    /// Request data is invalid.
    #[error("lot store invalid data: {0}")]
    Invalid(String),
    /// Store I/O error.
    #[error("lot store io error: {0}")]
    Io(String),
    /// Stored data is malformed.
    #[error("lot store corruption: {0}")]
    Corrupt(String),
    /// Stored schema version is incompatible.
    #[error("lot store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store reported an error.
    #[error("lot store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true when the error is caused by the request, not the backend.
    #[must_use]
    pub const fn is_frontend(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Conflict(_) | Self::Invalid(_))
    }
}

/// Durable queue of lots and their certificate rows.
pub trait LotStore: Send + Sync {
    /// Stages a batch and inserts a READY manager row.
    ///
    /// Single-certificate batches go to the shared staging tables under their
    /// own key; larger batches get a fresh per-lot table pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when staging fails.
    fn submit(&self, owner: &OwnerId, batch: CertificateBatch) -> Result<Manager, StoreError>;

    /// Returns the oldest READY manager without mutating it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the queue cannot be read.
    fn next_ready(&self) -> Result<Option<Manager>, StoreError>;

    /// Consumes a READY lot: returns its rows, flips it to RUNNING, and deletes
    /// the source rows in one transaction. A lot that is no longer READY
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when staging fails.
    fn stage_for_export(&self, manager: &Manager) -> Result<Vec<Certificate>, StoreError>;

    /// Stores coded results for a RUNNING lot and flips it to FINISHED.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lot is missing or not running.
    fn commit_import(&self, manager: &Manager, results: Vec<Certificate>) -> Result<(), StoreError>;

    /// Polls a lot. Pending lots get `accessed` touched; finished lots return
    /// their results once and lose their manager row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown or already delivered lots.
    fn recover(&self, owner: &OwnerId, uid: &LotUid) -> Result<Recovery, StoreError>;
}

// ============================================================================
// SECTION: Synchronization Strategy
// ============================================================================

/// Synchronization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Underlying lot store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Exchange medium could not be read or written.
    #[error("exchange medium error: {0}")]
    Exchange(String),
    /// Exchange medium held malformed rows.
    #[error("exchange medium invalid data: {0}")]
    Invalid(String),
}

/// Result of exporting a lot to the exchange medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeHandle {
    /// Lot name passed to the tool as `lname=<lot>`, when the medium needs one.
    pub lot_name: Option<String>,
    /// Number of certificates written.
    pub certificates: usize,
}

/// Moves lots between the lot store and the coding tool's exchange medium.
pub trait SyncStrategy: Send + Sync {
    /// Stages a lot and writes it to the exchange medium.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when staging or writing fails.
    fn export_lot(&self, manager: &Manager) -> Result<ExchangeHandle, SyncError>;

    /// Reads coded rows back and commits them to the lot store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when reading or committing fails.
    fn import_lot(&self, manager: &Manager) -> Result<(), SyncError>;
}
