// crates/iris-lots-core/src/runtime/service.rs
// ============================================================================
// Module: Iris Lots Service
// Description: Request facade for submissions and recovery polls.
// Purpose: Validate requests, classify faults, and trigger the worker.
// Dependencies: crate::core, crate::interfaces, crate::runtime::worker
// ============================================================================

//! ## Overview
//! [`LotService`] is what a front end calls. Backend faults are cached: once
//! one is seen (here or in the worker) every later request gets it back
//! without touching storage. Frontend faults go to the caller only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use crate::core::Certificate;
use crate::core::CertificateBatch;
use crate::core::CertificateKey;
use crate::core::LotUid;
use crate::core::OwnerId;
use crate::core::Recovery;
use crate::events::LotEvent;
use crate::events::LotEventSink;
use crate::interfaces::LotStore;
use crate::runtime::fault::LotFault;
use crate::runtime::worker::LotWorker;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Front-end facade over the lot store and worker.
pub struct LotService {
    /// Lot queue.
    store: Arc<dyn LotStore>,
    /// Background worker.
    worker: Arc<LotWorker>,
    /// Event sink.
    sink: Arc<dyn LotEventSink>,
    /// Backend fault seen while serving requests.
    fault: Mutex<Option<LotFault>>,
}

impl LotService {
    /// Creates a service.
    #[must_use]
    pub fn new(
        store: Arc<dyn LotStore>,
        worker: Arc<LotWorker>,
        sink: Arc<dyn LotEventSink>,
    ) -> Self {
        Self {
            store,
            worker,
            sink,
            fault: Mutex::new(None),
        }
    }

    /// Returns the worker.
    #[must_use]
    pub fn worker(&self) -> &LotWorker {
        &self.worker
    }

    /// Returns the cached backend fault, if any.
    #[must_use]
    pub fn fault(&self) -> Option<LotFault> {
        let cached = match self.fault.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Some(LotFault::Backend("service fault cell poisoned".to_string())),
        };
        cached.or_else(|| self.worker.fault())
    }

    /// Submits a batch and triggers the worker. Single-certificate batches are
    /// re-keyed with a fresh random key, which becomes the lot uid.
    ///
    /// # Errors
    ///
    /// Returns [`LotFault::Frontend`] for invalid input and the cached or new
    /// backend fault otherwise.
    pub fn submit(
        &self,
        owner: &OwnerId,
        certificates: Vec<Certificate>,
    ) -> Result<LotUid, LotFault> {
        self.ensure_healthy()?;
        owner.validate().map_err(|err| LotFault::Frontend(err.to_string()))?;
        let certificates = if certificates.len() == 1 {
            certificates.into_iter().map(|cert| cert.rekey(CertificateKey::generate())).collect()
        } else {
            certificates
        };
        let batch =
            CertificateBatch::new(certificates).map_err(|err| LotFault::Frontend(err.to_string()))?;
        let count = batch.len();
        let manager = self.store.submit(owner, batch).map_err(|err| self.escalate(err.into()))?;
        self.sink.record(&LotEvent::new("lot_submitted").lot(&manager).count(count));
        self.trigger()?;
        Ok(manager.uid)
    }

    /// Polls a lot; pending lots re-trigger the worker.
    ///
    /// # Errors
    ///
    /// Returns [`LotFault::Frontend`] for unknown lots and the cached or new
    /// backend fault otherwise.
    pub fn recover(&self, owner: &OwnerId, uid: &LotUid) -> Result<Recovery, LotFault> {
        self.ensure_healthy()?;
        owner.validate().map_err(|err| LotFault::Frontend(err.to_string()))?;
        uid.validate().map_err(|err| LotFault::Frontend(err.to_string()))?;
        let recovery = self.store.recover(owner, uid).map_err(|err| self.escalate(err.into()))?;
        match &recovery {
            Recovery::Pending(_) => {
                self.trigger()?;
            }
            Recovery::Finished(certificates) => {
                self.sink.record(
                    &LotEvent::new("lot_recovered").ids(owner, uid).count(certificates.len()),
                );
            }
        }
        Ok(recovery)
    }

    /// Ensures the worker is running.
    ///
    /// # Errors
    ///
    /// Returns the worker's fault when it has stopped on one.
    pub fn trigger(&self) -> Result<bool, LotFault> {
        self.worker.process().map_err(|fault| self.escalate(fault))
    }

    /// Fails with the cached fault, if any.
    fn ensure_healthy(&self) -> Result<(), LotFault> {
        self.fault().map_or(Ok(()), Err)
    }

    /// Caches fatal faults and passes every fault through.
    fn escalate(&self, fault: LotFault) -> LotFault {
        if fault.is_fatal()
            && let Ok(mut guard) = self.fault.lock()
            && guard.is_none()
        {
            *guard = Some(fault.clone());
        }
        fault
    }
}
