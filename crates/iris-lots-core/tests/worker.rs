// crates/iris-lots-core/tests/worker.rs
// ============================================================================
// Module: Lot Worker and Service Tests
// Description: Validate the worker loop, its start-once gate, and the facade.
// Purpose: Ensure fail-stop behavior and fault caching across requests.
// Dependencies: iris-lots-core, tempfile
// ============================================================================

//! ## Overview
//! Drives the worker against the in-memory lot store, an in-memory exchange,
//! and stub tool scripts. Covers queue draining, idempotent triggers,
//! fail-stop on tool faults, and the service's fault classification.

#![cfg(unix)]
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use iris_lots_core::Certificate;
use iris_lots_core::CertificateBatch;
use iris_lots_core::InMemoryLotStore;
use iris_lots_core::LineNumber;
use iris_lots_core::LotFault;
use iris_lots_core::LotService;
use iris_lots_core::LotStore;
use iris_lots_core::LotType;
use iris_lots_core::LotUid;
use iris_lots_core::LotWorker;
use iris_lots_core::Manager;
use iris_lots_core::MemoryEventSink;
use iris_lots_core::NoopEventSink;
use iris_lots_core::OwnerId;
use iris_lots_core::ProcessSupervisor;
use iris_lots_core::ProcessingStatus;
use iris_lots_core::Recovery;
use iris_lots_core::StoreError;
use iris_lots_core::ToolFault;
use tempfile::TempDir;

use crate::common::CODED_CAUSE;
use crate::common::MemorySync;
use crate::common::certificate;
use crate::common::script_tool;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Worker wiring kept alive for one test.
struct Harness {
    /// Temp dir holding the stub tool.
    _dir: TempDir,
    /// Shared in-memory store.
    store: Arc<InMemoryLotStore>,
    /// Worker under test.
    worker: Arc<LotWorker>,
    /// Event sink.
    sink: Arc<MemoryEventSink>,
}

/// Builds a worker whose tool runs the given script body.
fn harness(body: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let command = script_tool(dir.path(), "tool.sh", body, Duration::from_secs(10));
    let store = Arc::new(InMemoryLotStore::new());
    let sink = Arc::new(MemoryEventSink::new());
    let supervisor = ProcessSupervisor::new(command, sink.clone())
        .with_poll_interval(Duration::from_millis(10));
    let worker = Arc::new(LotWorker::new(
        store.clone(),
        Arc::new(MemorySync::new(store.clone())),
        supervisor,
        sink.clone(),
    ));
    Harness {
        _dir: dir,
        store,
        worker,
        sink,
    }
}

/// Submits a batch straight to the store.
fn enqueue(store: &InMemoryLotStore, owner: &str, certificates: Vec<Certificate>) -> Manager {
    store.submit(&OwnerId::new(owner), CertificateBatch::new(certificates).unwrap()).unwrap()
}

/// Three-certificate batch A, B, C.
fn abc() -> Vec<Certificate> {
    vec![
        certificate("A", &[(LineNumber::A, "sepsis")]),
        certificate("B", &[(LineNumber::A, "stroke"), (LineNumber::Contributing, "diabetes")]),
        certificate("C", &[]),
    ]
}

/// Lot store that fails every call and counts them.
#[derive(Default)]
struct FailingStore {
    /// Number of store calls.
    calls: AtomicUsize,
}

impl FailingStore {
    /// Records a call and returns a backend error.
    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Io("disk unplugged".to_string()))
    }
}

impl LotStore for FailingStore {
    fn submit(&self, _owner: &OwnerId, _batch: CertificateBatch) -> Result<Manager, StoreError> {
        self.fail()
    }

    fn next_ready(&self) -> Result<Option<Manager>, StoreError> {
        self.fail()
    }

    fn stage_for_export(&self, _manager: &Manager) -> Result<Vec<Certificate>, StoreError> {
        self.fail()
    }

    fn commit_import(&self, _manager: &Manager, _results: Vec<Certificate>) -> Result<(), StoreError> {
        self.fail()
    }

    fn recover(&self, _owner: &OwnerId, _uid: &LotUid) -> Result<Recovery, StoreError> {
        self.fail()
    }
}

/// Lot store whose queue lookup panics, killing the loop thread.
#[derive(Default)]
struct PanickingStore {
    /// Number of queue lookups.
    lookups: AtomicUsize,
}

impl LotStore for PanickingStore {
    fn submit(&self, _owner: &OwnerId, _batch: CertificateBatch) -> Result<Manager, StoreError> {
        Err(StoreError::Invalid("read only".to_string()))
    }

    fn next_ready(&self) -> Result<Option<Manager>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        panic!("queue index corrupted");
    }

    fn stage_for_export(&self, _manager: &Manager) -> Result<Vec<Certificate>, StoreError> {
        Ok(Vec::new())
    }

    fn commit_import(&self, _manager: &Manager, _results: Vec<Certificate>) -> Result<(), StoreError> {
        Ok(())
    }

    fn recover(&self, _owner: &OwnerId, uid: &LotUid) -> Result<Recovery, StoreError> {
        Err(StoreError::NotFound(uid.to_string()))
    }
}

// ============================================================================
// SECTION: Worker Tests
// ============================================================================

#[test]
fn worker_drains_queue_in_order() {
    let h = harness("exit 0");
    let first = enqueue(&h.store, "owner", abc());
    let second = enqueue(&h.store, "owner", vec![certificate("D", &[])]);
    assert!(h.worker.process().unwrap());
    assert_eq!(h.worker.wait_idle().unwrap(), 2);

    let finished: Vec<_> = h.sink.named("lot_finished").into_iter().map(|e| e.uid.unwrap()).collect();
    assert_eq!(finished, vec![first.uid.clone(), second.uid.clone()]);

    let Recovery::Finished(coded) = h.store.recover(&first.owner, &first.uid).unwrap() else {
        panic!("lot should be finished");
    };
    assert_eq!(coded.len(), 3);
    assert!(coded.iter().all(|cert| cert.fields().uc_code.as_deref() == Some(CODED_CAUSE)));
    assert_eq!(coded[1].cause_lines().len(), 2);
    assert_eq!(h.sink.named("worker_idle").len(), 1);
}

#[test]
fn trigger_is_idempotent_while_running() {
    let h = harness("sleep 1\nexit 0");
    enqueue(&h.store, "owner", vec![certificate("A", &[])]);
    assert!(h.worker.process().unwrap());
    assert!(h.worker.is_running());
    assert!(!h.worker.process().unwrap());
    assert!(!h.worker.process().unwrap());
    assert_eq!(h.worker.wait_idle().unwrap(), 1);
    assert_eq!(h.sink.named("tool_finished").len(), 1);
}

#[test]
fn idle_worker_can_be_restarted() {
    let h = harness("exit 0");
    assert!(h.worker.process().unwrap());
    assert_eq!(h.worker.wait_idle().unwrap(), 0);
    enqueue(&h.store, "owner", vec![certificate("A", &[])]);
    assert!(h.worker.process().unwrap());
    assert_eq!(h.worker.wait_idle().unwrap(), 1);
}

#[test]
fn tool_fault_stops_worker_for_good() {
    let h = harness("exit 6");
    let first = enqueue(&h.store, "owner", abc());
    let second = enqueue(&h.store, "owner", vec![certificate("D", &[])]);
    h.worker.process().unwrap();
    let fault = h.worker.wait_idle().unwrap_err();
    assert_eq!(fault, LotFault::Tool(ToolFault::CodingFailure));
    assert_eq!(h.worker.fault(), Some(fault.clone()));

    let first_row = h.store.manager(&first.owner, &first.uid).unwrap().unwrap();
    assert_eq!(first_row.status, ProcessingStatus::Running);
    let second_row = h.store.manager(&second.owner, &second.uid).unwrap().unwrap();
    assert_eq!(second_row.status, ProcessingStatus::Ready);

    assert_eq!(h.worker.process(), Err(fault));
    assert!(!h.worker.is_running());
    assert_eq!(h.sink.named("worker_fault").len(), 1);
    assert_eq!(h.sink.named("tool_finished").len(), 1);
}

#[test]
fn store_fault_stops_worker() {
    let sink = Arc::new(NoopEventSink);
    let store = Arc::new(FailingStore::default());
    let dir = TempDir::new().unwrap();
    let command = script_tool(dir.path(), "tool.sh", "exit 0", Duration::from_secs(5));
    let worker = LotWorker::new(
        store.clone(),
        Arc::new(MemorySync::new(Arc::new(InMemoryLotStore::new()))),
        ProcessSupervisor::new(command, sink.clone()),
        sink,
    );
    worker.process().unwrap();
    let fault = worker.wait_idle().unwrap_err();
    assert!(matches!(fault, LotFault::Backend(ref message) if message.contains("disk unplugged")));
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn panicked_loop_is_recorded_on_next_trigger() {
    let sink = Arc::new(MemoryEventSink::new());
    let store = Arc::new(PanickingStore::default());
    let dir = TempDir::new().unwrap();
    let command = script_tool(dir.path(), "tool.sh", "exit 0", Duration::from_secs(5));
    let worker = LotWorker::new(
        store.clone(),
        Arc::new(MemorySync::new(Arc::new(InMemoryLotStore::new()))),
        ProcessSupervisor::new(command, sink.clone()),
        sink.clone(),
    );
    assert!(worker.process().unwrap());
    for _ in 0 .. 500 {
        if !worker.is_running() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!worker.is_running());

    let expected = LotFault::Backend("worker thread panicked".to_string());
    assert_eq!(worker.process(), Err(expected.clone()));
    assert_eq!(worker.fault(), Some(expected.clone()));
    assert_eq!(worker.process(), Err(expected.clone()));
    assert_eq!(worker.wait_idle(), Err(expected));
    assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(sink.named("worker_fault").len(), 1);
}

#[test]
fn in_memory_store_rejects_unsafe_single_key() {
    let store = InMemoryLotStore::new();
    let batch = CertificateBatch::new(vec![certificate("A-1", &[])]).unwrap();
    let err = store.submit(&OwnerId::new("owner"), batch).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert_eq!(store.next_ready().unwrap(), None);
}

// ============================================================================
// SECTION: Service Tests
// ============================================================================

#[test]
fn service_round_trip_delivers_results_once() {
    let h = harness("exit 0");
    let service = LotService::new(h.store.clone(), h.worker.clone(), h.sink.clone());
    let owner = OwnerId::new("session-1");
    let uid = service.submit(&owner, abc()).unwrap();
    h.worker.wait_idle().unwrap();

    let manager = h.store.manager(&owner, &uid).unwrap().unwrap();
    assert_eq!(manager.lot_type, LotType::Multiple);
    let Recovery::Finished(coded) = service.recover(&owner, &uid).unwrap() else {
        panic!("lot should be finished");
    };
    let keys: Vec<&str> = coded.iter().map(|cert| cert.key().as_str()).collect();
    assert_eq!(keys, vec!["A", "B", "C"]);

    let err = service.recover(&owner, &uid).unwrap_err();
    assert!(matches!(err, LotFault::Frontend(ref message) if message.contains("not found")));
    assert_eq!(service.fault(), None);
}

#[test]
fn service_rekeys_single_certificate() {
    let h = harness("exit 0");
    let service = LotService::new(h.store.clone(), h.worker.clone(), h.sink.clone());
    let owner = OwnerId::new("session-1");
    let uid = service.submit(&owner, vec![certificate("mine", &[(LineNumber::A, "x")])]).unwrap();
    assert_eq!(uid.as_str().len(), 30);
    assert_ne!(uid.as_str(), "mine");
    h.worker.wait_idle().unwrap();
    let Recovery::Finished(coded) = service.recover(&owner, &uid).unwrap() else {
        panic!("lot should be finished");
    };
    assert_eq!(coded.len(), 1);
    assert_eq!(coded[0].key().as_str(), uid.as_str());
    assert_eq!(coded[0].cause_lines().get(LineNumber::A).unwrap().certificate_key.as_str(), uid.as_str());
}

#[test]
fn service_pending_recover_retriggers_worker() {
    let h = harness("exit 0");
    let service = LotService::new(h.store.clone(), h.worker.clone(), h.sink.clone());
    let manager = enqueue(&h.store, "owner", abc());
    assert_eq!(
        service.recover(&manager.owner, &manager.uid).unwrap(),
        Recovery::Pending(ProcessingStatus::Ready)
    );
    assert_eq!(h.worker.wait_idle().unwrap(), 1);
    assert!(matches!(
        service.recover(&manager.owner, &manager.uid).unwrap(),
        Recovery::Finished(_)
    ));
}

#[test]
fn service_rejects_bad_input_without_caching() {
    let h = harness("exit 0");
    let service = LotService::new(h.store.clone(), h.worker.clone(), h.sink.clone());
    let owner = OwnerId::new("owner");
    assert!(matches!(service.submit(&owner, Vec::new()), Err(LotFault::Frontend(_))));
    let dupes = vec![certificate("A", &[]), certificate("A", &[])];
    assert!(matches!(service.submit(&owner, dupes), Err(LotFault::Frontend(_))));
    let long_owner = OwnerId::new("x".repeat(33));
    assert!(matches!(service.submit(&long_owner, abc()), Err(LotFault::Frontend(_))));
    assert!(matches!(
        service.recover(&owner, &LotUid::new("unknown")),
        Err(LotFault::Frontend(_))
    ));
    assert_eq!(service.fault(), None);
    assert!(service.submit(&owner, abc()).is_ok());
}

#[test]
fn service_caches_tool_fault() {
    let h = harness("exit 9");
    let service = LotService::new(h.store.clone(), h.worker.clone(), h.sink.clone());
    let owner = OwnerId::new("owner");
    let uid = service.submit(&owner, abc()).unwrap();
    h.worker.wait_idle().unwrap_err();
    let expected = LotFault::Tool(ToolFault::MissingCodingFile);
    assert_eq!(service.fault(), Some(expected.clone()));
    assert_eq!(service.submit(&owner, abc()), Err(expected.clone()));
    assert_eq!(service.recover(&owner, &uid), Err(expected));
}

#[test]
fn service_caches_backend_store_fault() {
    let sink = Arc::new(NoopEventSink);
    let store = Arc::new(FailingStore::default());
    let dir = TempDir::new().unwrap();
    let command = script_tool(dir.path(), "tool.sh", "exit 0", Duration::from_secs(5));
    let worker = Arc::new(LotWorker::new(
        store.clone(),
        Arc::new(MemorySync::new(Arc::new(InMemoryLotStore::new()))),
        ProcessSupervisor::new(command, sink.clone()),
        sink.clone(),
    ));
    let service = LotService::new(store.clone(), worker, sink);
    let owner = OwnerId::new("owner");
    let first = service.submit(&owner, abc()).unwrap_err();
    assert!(matches!(first, LotFault::Backend(_)));
    let second = service.recover(&owner, &LotUid::new("abc")).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}
