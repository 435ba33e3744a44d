// crates/iris-lots-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Lot Store Tests
// Description: Queue lifecycle, staging layout, and schema handling.
// Purpose: Ensure lots are staged once, delivered once, and survive reopen.
// Dependencies: iris-lots-store-sqlite, iris-lots-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Exercises the durable lot store end to end: table layout for single and
//! multi-certificate lots, exactly-once staging, single-use recovery, reset,
//! schema version checks, and the direct-database exchange driven by the
//! worker.

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
use std::sync::Barrier;
use std::thread;

use iris_lots_core::LineNumber;
use iris_lots_core::LotStore;
use iris_lots_core::LotType;
use iris_lots_core::LotUid;
use iris_lots_core::OwnerId;
use iris_lots_core::ProcessingStatus;
use iris_lots_core::Recovery;
use iris_lots_core::StoreError;
use iris_lots_core::SyncError;
use iris_lots_core::SyncStrategy;
use iris_lots_store_sqlite::DatabaseSync;
use iris_lots_store_sqlite::SqliteLotStore;
use iris_lots_store_sqlite::SqliteStoreConfig;
use iris_lots_store_sqlite::SqliteStoreError;
use iris_lots_store_sqlite::UNIQUE_LOT;
use proptest::prelude::*;
use rusqlite::Connection;
use tempfile::TempDir;

use crate::common::abc;
use crate::common::certificate;
use crate::common::code_all;
use crate::common::store_in;
use crate::common::submit;

// ============================================================================
// SECTION: Staging Layout
// ============================================================================

#[test]
fn single_certificate_uses_shared_table() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let manager = submit(&store, "owner", vec![certificate("KEYONE", &[(LineNumber::A, "x")])]);
    assert_eq!(manager.uid.as_str(), "KEYONE");
    assert_eq!(manager.lot_type, LotType::Unique);
    assert_eq!(manager.status, ProcessingStatus::Ready);
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(1));
    assert_eq!(store.lot_size("KEYONE").unwrap(), None);
}

#[test]
fn multi_certificate_lot_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let manager = submit(&store, "owner", abc());
    assert_eq!(manager.lot_type, LotType::Multiple);
    assert_eq!(manager.uid.as_str().len(), 30);
    assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), Some(3));
    assert_eq!(store.next_ready().unwrap(), Some(manager.clone()));

    let staged = store.stage_for_export(&manager).unwrap();
    assert_eq!(staged.len(), 3);
    assert_eq!(staged[1].cause_lines().len(), 2);
    assert_eq!(staged[0].fields().status.as_deref(), Some("Initial"));
    assert_eq!(staged[0].fields().manner_of_death, Some(1));
    assert!(store.stage_for_export(&manager).unwrap().is_empty());
    assert_eq!(store.next_ready().unwrap(), None);
    let running = store.manager(&manager.owner, &manager.uid).unwrap().unwrap();
    assert_eq!(running.status, ProcessingStatus::Running);

    store.commit_import(&manager, staged.clone()).unwrap();
    assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), None);
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(0));
    let finished = store.manager(&manager.owner, &manager.uid).unwrap().unwrap();
    assert_eq!(finished.status, ProcessingStatus::Finished);

    let Recovery::Finished(coded) = store.recover(&manager.owner, &manager.uid).unwrap() else {
        panic!("lot should be finished");
    };
    assert_eq!(coded, staged);
    assert!(store.manager(&manager.owner, &manager.uid).unwrap().is_none());
    let err = store.recover(&manager.owner, &manager.uid).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn unique_lot_results_return_to_shared_table() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let manager = submit(&store, "owner", vec![certificate("SOLO", &[])]);
    let mut staged = store.stage_for_export(&manager).unwrap();
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(0));
    staged[0].fields_mut().uc_code = Some("R99".to_string());
    store.commit_import(&manager, staged).unwrap();
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(1));
    let Recovery::Finished(coded) = store.recover(&manager.owner, &manager.uid).unwrap() else {
        panic!("lot should be finished");
    };
    assert_eq!(coded[0].fields().uc_code.as_deref(), Some("R99"));
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(0));
}

#[test]
fn single_certificate_with_unsafe_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let batch = iris_lots_core::CertificateBatch::new(vec![certificate("A-1", &[])]).unwrap();
    let err = store.submit(&OwnerId::new("owner"), batch).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(err.is_frontend());
    assert!(store.manager(&OwnerId::new("owner"), &LotUid::new("A-1")).unwrap().is_none());
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(0));
    assert_eq!(store.next_ready().unwrap(), None);
}

#[test]
fn duplicate_unique_key_conflicts() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    submit(&store, "one", vec![certificate("SAME", &[])]);
    let batch = iris_lots_core::CertificateBatch::new(vec![certificate("SAME", &[])]).unwrap();
    let err = store.submit(&OwnerId::new("two"), batch).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert!(err.is_frontend());
}

// ============================================================================
// SECTION: Queue Semantics
// ============================================================================

#[test]
fn next_ready_returns_oldest_lot() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let first = submit(&store, "owner", abc());
    let second = submit(&store, "owner", vec![certificate("LATER", &[])]);
    assert_eq!(store.next_ready().unwrap().unwrap().uid, first.uid);
    store.stage_for_export(&first).unwrap();
    assert_eq!(store.next_ready().unwrap().unwrap().uid, second.uid);
}

#[test]
fn pending_recover_touches_accessed() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let manager = submit(&store, "owner", abc());
    std::thread::sleep(std::time::Duration::from_millis(5));
    let recovery = store.recover(&manager.owner, &manager.uid).unwrap();
    assert_eq!(recovery, Recovery::Pending(ProcessingStatus::Ready));
    let row = store.manager(&manager.owner, &manager.uid).unwrap().unwrap();
    assert!(row.accessed > manager.accessed);
    assert_eq!(row.created, manager.created);
}

#[test]
fn recover_is_scoped_to_owner() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let manager = submit(&store, "owner", abc());
    let err = store.recover(&OwnerId::new("intruder"), &manager.uid).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    let err = store.recover(&manager.owner, &LotUid::new("missing")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn commit_requires_running_lot() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let manager = submit(&store, "owner", abc());
    let err = store.commit_import(&manager, Vec::new()).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), Some(3));
}

#[test]
fn concurrent_staging_across_handles_is_exactly_once() {
    let dir = TempDir::new().unwrap();
    for _ in 0 .. 10 {
        let first = store_in(dir.path());
        let second = store_in(dir.path());
        let manager = submit(&first, "owner", abc());
        let barrier = Barrier::new(2);
        let (left, right) = thread::scope(|scope| {
            let left = scope.spawn(|| {
                barrier.wait();
                first.stage_for_export(&manager).unwrap()
            });
            let right = scope.spawn(|| {
                barrier.wait();
                second.stage_for_export(&manager).unwrap()
            });
            (left.join().unwrap(), right.join().unwrap())
        });
        let mut sizes = [left.len(), right.len()];
        sizes.sort_unstable();
        assert_eq!(sizes, [0, 3]);
        let row = second.manager(&manager.owner, &manager.uid).unwrap().unwrap();
        assert_eq!(row.status, ProcessingStatus::Running);
        assert_eq!(first.next_ready().unwrap(), None);
        first.commit_import(&manager, if left.is_empty() { right } else { left }).unwrap();
        assert!(matches!(
            second.recover(&manager.owner, &manager.uid).unwrap(),
            Recovery::Finished(_)
        ));
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

#[test]
fn lots_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let manager = {
        let store = store_in(dir.path());
        submit(&store, "owner", abc())
    };
    let store = store_in(dir.path());
    assert_eq!(store.next_ready().unwrap(), Some(manager));
}

#[test]
fn reset_drops_every_lot() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let multi = submit(&store, "owner", abc());
    let single = submit(&store, "owner", vec![certificate("SOLO", &[])]);
    store.reset().unwrap();
    assert_eq!(store.lot_size(multi.uid.as_str()).unwrap(), None);
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(0));
    assert_eq!(store.next_ready().unwrap(), None);
    assert!(store.manager(&single.owner, &single.uid).unwrap().is_none());
    submit(&store, "owner", abc());
}

#[test]
fn unsupported_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("iris.db");
    drop(store_in(dir.path()));
    Connection::open(&path).unwrap().execute("UPDATE store_meta SET version = 99", []).unwrap();
    let err = SqliteLotStore::new(SqliteStoreConfig::new(&path)).err().unwrap();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn unknown_status_code_is_corruption() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    let manager = submit(&store, "owner", abc());
    Connection::open(dir.path().join("iris.db"))
        .unwrap()
        .execute("UPDATE manager SET status = 7", [])
        .unwrap();
    let err = store.manager(&manager.owner, &manager.uid).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Corrupt(_)));
    assert!(!StoreError::from(err).is_frontend());
}

#[test]
fn unsafe_lot_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    assert!(matches!(store.lot_size("x\"; DROP TABLE manager"), Err(SqliteStoreError::Invalid(_))));
    for name in [UNIQUE_LOT, "Unique", "UNIQUE"] {
        assert!(matches!(store.ensure_exchange_tables(name), Err(SqliteStoreError::Invalid(_))));
    }
}

#[test]
fn database_exchange_cannot_alias_the_shared_pair() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store_in(dir.path()));
    let solo = submit(&store, "other", vec![certificate("SOLO", &[])]);
    assert!(matches!(DatabaseSync::new(store.clone(), "Unique"), Err(SyncError::Invalid(_))));
    let multi = submit(&store, "owner", abc());
    assert!(matches!(
        store.stage_into_exchange(&multi, "Unique"),
        Err(SqliteStoreError::Invalid(_))
    ));
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(1));
    assert_eq!(store.stage_for_export(&solo).unwrap().len(), 1);
}

// ============================================================================
// SECTION: Direct-Database Exchange
// ============================================================================

#[test]
fn database_exchange_moves_rows_through_the_exchange_pair() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store_in(dir.path()));
    let sync = DatabaseSync::new(store.clone(), "iris").unwrap();
    let manager = submit(&store, "owner", abc());

    let handle = sync.export_lot(&manager).unwrap();
    assert_eq!(handle.lot_name, None);
    assert_eq!(handle.certificates, 3);
    assert_eq!(store.lot_size("iris").unwrap(), Some(3));
    assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), Some(0));
    assert_eq!(sync.export_lot(&manager).unwrap().certificates, 0);

    code_all(&dir.path().join("iris.db"), "iris", "I219");
    sync.import_lot(&manager).unwrap();
    assert_eq!(store.lot_size("iris").unwrap(), Some(0));
    assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), None);

    let Recovery::Finished(coded) = store.recover(&manager.owner, &manager.uid).unwrap() else {
        panic!("lot should be finished");
    };
    let keys: Vec<&str> = coded.iter().map(|cert| cert.key().as_str()).collect();
    assert_eq!(keys, vec!["A", "B", "C"]);
    assert!(coded.iter().all(|cert| cert.fields().uc_code.as_deref() == Some("I219")));
    assert_eq!(coded[1].cause_lines().get(LineNumber::Contributing).unwrap().text_line.as_deref(), Some("diabetes"));
}

#[cfg(unix)]
#[test]
fn worker_drains_three_certificate_lot() {
    use iris_lots_core::LotWorker;
    use iris_lots_core::NoopEventSink;
    use iris_lots_core::ProcessSupervisor;
    use iris_lots_core::ToolCommand;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(store_in(dir.path()));
    let sync = Arc::new(DatabaseSync::new(store.clone(), "iris").unwrap());
    let script = dir.path().join("tool.sh");
    std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
    let command = ToolCommand::new(script).with_wrapper("/bin/sh");
    let sink = Arc::new(NoopEventSink);
    let worker = LotWorker::new(store.clone(), sync, ProcessSupervisor::new(command, sink.clone()), sink);

    let manager = submit(&store, "owner", abc());
    assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), Some(3));
    assert!(worker.process().unwrap());
    assert_eq!(worker.wait_idle().unwrap(), 1);

    assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), None);
    assert_eq!(store.lot_size(UNIQUE_LOT).unwrap(), Some(0));
    let row = store.manager(&manager.owner, &manager.uid).unwrap().unwrap();
    assert_eq!(row.status, ProcessingStatus::Finished);
    let Recovery::Finished(coded) = store.recover(&manager.owner, &manager.uid).unwrap() else {
        panic!("lot should be finished");
    };
    assert_eq!(coded.len(), 3);
    assert!(store.manager(&manager.owner, &manager.uid).unwrap().is_none());
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn multi_lot_tables_hold_every_certificate(count in 2usize .. 8) {
        let dir = TempDir::new().unwrap();
        let store = store_in(dir.path());
        let certificates = (0 .. count).map(|index| certificate(&format!("K{index}"), &[])).collect();
        let manager = submit(&store, "owner", certificates);
        prop_assert_eq!(manager.lot_type, LotType::Multiple);
        prop_assert_eq!(store.lot_size(manager.uid.as_str()).unwrap(), Some(count));
        let staged = store.stage_for_export(&manager).unwrap();
        prop_assert_eq!(staged.len(), count);
        prop_assert!(store.stage_for_export(&manager).unwrap().is_empty());
    }
}
