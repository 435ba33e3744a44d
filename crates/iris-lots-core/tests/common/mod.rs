// crates/iris-lots-core/tests/common/mod.rs
// =============================================================================
// Module: Core Test Helpers
// Description: Shared certificates, stub tools, and an in-memory exchange.
// Purpose: Reduce duplication across integration tests for iris-lots-core.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use iris_lots_core::CauseLine;
use iris_lots_core::Certificate;
use iris_lots_core::CertificateKey;
use iris_lots_core::ExchangeHandle;
use iris_lots_core::IdentFields;
use iris_lots_core::InMemoryLotStore;
use iris_lots_core::LineNumber;
use iris_lots_core::LotEvent;
use iris_lots_core::LotStore;
use iris_lots_core::LotUid;
use iris_lots_core::Manager;
use iris_lots_core::MemoryEventSink;
use iris_lots_core::SyncError;
use iris_lots_core::SyncStrategy;
use iris_lots_core::ToolCommand;

/// Shell used to run stub tool scripts.
pub const SHELL: &str = "/bin/sh";
/// Underlying cause written by the in-memory exchange on import.
pub const CODED_CAUSE: &str = "I219";

/// Builds a certificate with one text line per provided slot.
pub fn certificate(key: &str, lines: &[(LineNumber, &str)]) -> Certificate {
    let key = CertificateKey::new(key);
    let fields = IdentFields {
        date_death: Some("2024-01-02".to_string()),
        sex: Some("1".to_string()),
        ..IdentFields::default()
    };
    let mut certificate = Certificate::new(key.clone(), fields);
    for (line_nb, text) in lines {
        let mut line = CauseLine::new(key.clone(), *line_nb);
        line.text_line = Some((*text).to_string());
        certificate.add_cause_line(line).expect("cause line");
    }
    certificate
}

/// Writes a shell script and returns a tool command running it through `sh`.
pub fn script_tool(dir: &Path, name: &str, body: &str, timeout: Duration) -> ToolCommand {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    ToolCommand::new(path).with_wrapper(SHELL).with_timeout(timeout)
}

/// Waits until the sink holds at least `count` events named `event`.
pub fn wait_for_events(sink: &MemoryEventSink, event: &str, count: usize) -> Vec<LotEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let events = sink.named(event);
        if events.len() >= count || Instant::now() >= deadline {
            return events;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Exchange medium kept in memory; import marks every certificate as coded.
pub struct MemorySync {
    /// Backing lot store.
    store: Arc<InMemoryLotStore>,
    /// Exported certificates keyed by lot uid.
    exchange: Mutex<BTreeMap<LotUid, Vec<Certificate>>>,
}

impl MemorySync {
    /// Creates an exchange over the given store.
    pub fn new(store: Arc<InMemoryLotStore>) -> Self {
        Self {
            store,
            exchange: Mutex::new(BTreeMap::new()),
        }
    }
}

impl SyncStrategy for MemorySync {
    fn export_lot(&self, manager: &Manager) -> Result<ExchangeHandle, SyncError> {
        let certificates = self.store.stage_for_export(manager)?;
        let count = certificates.len();
        self.exchange.lock().unwrap().insert(manager.uid.clone(), certificates);
        Ok(ExchangeHandle {
            lot_name: Some(manager.uid.to_string()),
            certificates: count,
        })
    }

    fn import_lot(&self, manager: &Manager) -> Result<(), SyncError> {
        let staged = self
            .exchange
            .lock()
            .unwrap()
            .remove(&manager.uid)
            .ok_or_else(|| SyncError::Exchange("lot missing from exchange".to_string()))?;
        let coded = staged
            .into_iter()
            .map(|mut certificate| {
                certificate.fields_mut().uc_code = Some(CODED_CAUSE.to_string());
                certificate
            })
            .collect();
        self.store.commit_import(manager, coded)?;
        Ok(())
    }
}
