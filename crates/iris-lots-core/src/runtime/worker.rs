// crates/iris-lots-core/src/runtime/worker.rs
// ============================================================================
// Module: Iris Lots Worker
// Description: Background loop that drains READY lots through the tool.
// Purpose: Tie the lot store, exchange medium, and supervisor together.
// Dependencies: crate::interfaces, crate::runtime::supervisor
// ============================================================================

//! ## Overview
//! [`LotWorker`] owns at most one background thread. [`LotWorker::process`]
//! starts it only when no loop is alive, so triggers are idempotent. Each
//! pass pops the oldest READY lot, exports it, runs the tool, and imports the
//! results. The first fault is recorded and the loop stops for good: later
//! triggers return the recorded fault until the process restarts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;

use crate::events::LotEvent;
use crate::events::LotEventSink;
use crate::interfaces::LotStore;
use crate::interfaces::SyncStrategy;
use crate::runtime::fault::LotFault;
use crate::runtime::supervisor::ProcessSupervisor;

// ============================================================================
// SECTION: Worker State
// ============================================================================

/// State shared between the worker handle and its loop thread.
struct WorkerShared {
    /// Lot queue.
    store: Arc<dyn LotStore>,
    /// Exchange medium strategy.
    sync: Arc<dyn SyncStrategy>,
    /// Coding tool supervisor.
    supervisor: ProcessSupervisor,
    /// Event sink.
    sink: Arc<dyn LotEventSink>,
    /// First fatal fault, if any.
    fault: Mutex<Option<LotFault>>,
    /// Lots completed since start.
    processed: AtomicUsize,
}

impl WorkerShared {
    /// Returns the recorded fault.
    fn fault(&self) -> Option<LotFault> {
        match self.fault.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Some(LotFault::Backend("worker fault cell poisoned".to_string())),
        }
    }

    /// Records a fault unless one is already present.
    fn record_fault(&self, fault: LotFault) {
        self.sink.record(&LotEvent::new("worker_fault").message(fault.to_string()));
        if let Ok(mut guard) = self.fault.lock()
            && guard.is_none()
        {
            *guard = Some(fault);
        }
    }

    /// Runs passes until the queue is empty or a fault stops the loop.
    fn run(&self) {
        loop {
            if self.fault().is_some() {
                return;
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => {
                    self.sink.record(
                        &LotEvent::new("worker_idle").count(self.processed.load(Ordering::SeqCst)),
                    );
                    return;
                }
                Err(fault) => {
                    self.record_fault(fault);
                    return;
                }
            }
        }
    }

    /// Processes the oldest READY lot. Returns false when none is queued.
    fn step(&self) -> Result<bool, LotFault> {
        let Some(manager) =
            self.store.next_ready().map_err(|err| LotFault::Backend(err.to_string()))?
        else {
            return Ok(false);
        };
        let handle = self.sync.export_lot(&manager)?;
        self.sink.record(&LotEvent::new("lot_staged").lot(&manager).count(handle.certificates));
        if handle.certificates == 0 {
            // Another consumer already staged this lot.
            return Ok(true);
        }
        self.supervisor.run(handle.lot_name.as_deref())?;
        self.sync.import_lot(&manager)?;
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.sink.record(&LotEvent::new("lot_finished").lot(&manager));
        Ok(true)
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Single background lot worker guarded by a start-once gate.
pub struct LotWorker {
    /// State shared with the loop thread.
    shared: Arc<WorkerShared>,
    /// Handle of the current or last loop thread.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LotWorker {
    /// Creates an idle worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn LotStore>,
        sync: Arc<dyn SyncStrategy>,
        supervisor: ProcessSupervisor,
        sink: Arc<dyn LotEventSink>,
    ) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                store,
                sync,
                supervisor,
                sink,
                fault: Mutex::new(None),
                processed: AtomicUsize::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Ensures a loop is running. Returns true when a new loop was started.
    ///
    /// # Errors
    ///
    /// Returns the recorded fault once the worker has stopped on one, or a
    /// backend fault when the previous loop panicked or the thread cannot be
    /// started.
    pub fn process(&self) -> Result<bool, LotFault> {
        if let Some(fault) = self.shared.fault() {
            return Err(fault);
        }
        let mut guard =
            self.handle.lock().map_err(|_| LotFault::Backend("worker gate poisoned".to_string()))?;
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(false);
        }
        if let Some(finished) = guard.take()
            && finished.join().is_err()
        {
            drop(guard);
            let fault = LotFault::Backend("worker thread panicked".to_string());
            self.shared.record_fault(fault.clone());
            return Err(fault);
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("iris-lot-worker".to_string())
            .spawn(move || shared.run())
            .map_err(|err| LotFault::Backend(format!("failed to start worker: {err}")))?;
        *guard = Some(handle);
        drop(guard);
        Ok(true)
    }

    /// Blocks until the current loop (if any) stops. Returns the number of
    /// lots completed since the worker was created.
    ///
    /// # Errors
    ///
    /// Returns the recorded fault when the loop stopped on one.
    pub fn wait_idle(&self) -> Result<usize, LotFault> {
        let handle = self
            .handle
            .lock()
            .map_err(|_| LotFault::Backend("worker gate poisoned".to_string()))?
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            let fault = LotFault::Backend("worker thread panicked".to_string());
            self.shared.record_fault(fault.clone());
            return Err(fault);
        }
        match self.shared.fault() {
            Some(fault) => Err(fault),
            None => Ok(self.processed()),
        }
    }

    /// Returns the recorded fault, if any.
    #[must_use]
    pub fn fault(&self) -> Option<LotFault> {
        self.shared.fault()
    }

    /// Returns true while a loop thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Lots completed since the worker was created.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.shared.processed.load(Ordering::SeqCst)
    }
}
