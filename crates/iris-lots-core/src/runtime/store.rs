// crates/iris-lots-core/src/runtime/store.rs
// ============================================================================
// Module: Iris Lots In-Memory Store
// Description: Simple in-memory lot store for tests and local demos.
// Purpose: Provide a deterministic LotStore without external dependencies.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`LotStore`] with the
//! same queue semantics as the durable store. It is not intended for
//! production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::Certificate;
use crate::core::CertificateBatch;
use crate::core::LotType;
use crate::core::LotUid;
use crate::core::Manager;
use crate::core::OwnerId;
use crate::core::ProcessingStatus;
use crate::core::Recovery;
use crate::core::unix_millis;
use crate::interfaces::LotStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Stored lot with its queue position.
#[derive(Debug, Clone)]
struct LotEntry {
    /// Queue entry.
    manager: Manager,
    /// Insertion sequence used to break `created` ties.
    sequence: u64,
    /// Certificates awaiting export.
    staged: Vec<Certificate>,
    /// Coded certificates awaiting recovery.
    coded: Vec<Certificate>,
}

/// Mutable store contents.
#[derive(Debug, Default)]
struct LotTable {
    /// Lots keyed by `(owner, uid)`.
    lots: BTreeMap<(OwnerId, LotUid), LotEntry>,
    /// Next insertion sequence.
    next_sequence: u64,
}

/// In-memory lot store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLotStore {
    /// Lot table protected by a mutex.
    table: Arc<Mutex<LotTable>>,
}

impl InMemoryLotStore {
    /// Creates a new in-memory lot store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the manager row for a lot, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the mutex is poisoned.
    pub fn manager(&self, owner: &OwnerId, uid: &LotUid) -> Result<Option<Manager>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.lots.get(&(owner.clone(), uid.clone())).map(|entry| entry.manager.clone()))
    }

    /// Locks the lot table.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LotTable>, StoreError> {
        self.table.lock().map_err(|_| StoreError::Store("lot store mutex poisoned".to_string()))
    }
}

impl LotStore for InMemoryLotStore {
    fn submit(&self, owner: &OwnerId, batch: CertificateBatch) -> Result<Manager, StoreError> {
        let mut guard = self.lock()?;
        let (uid, lot_type) = if batch.is_single() {
            let key = batch.certificates()[0].key().as_str();
            let uid = LotUid::new(key);
            uid.validate().map_err(|err| StoreError::Invalid(err.to_string()))?;
            if guard.lots.keys().any(|(_, uid)| uid.as_str() == key) {
                return Err(StoreError::Conflict(format!("certificate {key} already staged")));
            }
            (uid, LotType::Unique)
        } else {
            (LotUid::generate(), LotType::Multiple)
        };
        let manager = Manager::ready(uid.clone(), owner.clone(), lot_type);
        let sequence = guard.next_sequence;
        guard.next_sequence += 1;
        guard.lots.insert(
            (owner.clone(), uid),
            LotEntry {
                manager: manager.clone(),
                sequence,
                staged: batch.into_inner(),
                coded: Vec::new(),
            },
        );
        drop(guard);
        Ok(manager)
    }

    fn next_ready(&self) -> Result<Option<Manager>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .lots
            .values()
            .filter(|entry| entry.manager.status == ProcessingStatus::Ready)
            .min_by_key(|entry| (entry.manager.created, entry.sequence))
            .map(|entry| entry.manager.clone()))
    }

    fn stage_for_export(&self, manager: &Manager) -> Result<Vec<Certificate>, StoreError> {
        let mut guard = self.lock()?;
        let key = (manager.owner.clone(), manager.uid.clone());
        let Some(entry) = guard.lots.get_mut(&key) else {
            return Ok(Vec::new());
        };
        if entry.manager.status != ProcessingStatus::Ready {
            return Ok(Vec::new());
        }
        entry.manager.status = ProcessingStatus::Running;
        Ok(std::mem::take(&mut entry.staged))
    }

    fn commit_import(
        &self,
        manager: &Manager,
        results: Vec<Certificate>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let key = (manager.owner.clone(), manager.uid.clone());
        let entry = guard
            .lots
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(manager.uid.to_string()))?;
        if entry.manager.status != ProcessingStatus::Running {
            return Err(StoreError::Conflict(format!("lot {} is not running", manager.uid)));
        }
        entry.coded = results;
        entry.manager.status = ProcessingStatus::Finished;
        Ok(())
    }

    fn recover(&self, owner: &OwnerId, uid: &LotUid) -> Result<Recovery, StoreError> {
        let mut guard = self.lock()?;
        let key = (owner.clone(), uid.clone());
        let entry = guard.lots.get_mut(&key).ok_or_else(|| StoreError::NotFound(uid.to_string()))?;
        if entry.manager.status.is_pending() {
            entry.manager.accessed = unix_millis();
            return Ok(Recovery::Pending(entry.manager.status));
        }
        let coded = guard.lots.remove(&key).map(|entry| entry.coded).unwrap_or_default();
        drop(guard);
        Ok(Recovery::Finished(coded))
    }
}
