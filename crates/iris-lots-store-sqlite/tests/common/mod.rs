// crates/iris-lots-store-sqlite/tests/common/mod.rs
// =============================================================================
// Module: SQLite Store Test Helpers
// Description: Shared stores, certificates, and exchange-file fixtures.
// Purpose: Reduce duplication across iris-lots-store-sqlite integration tests.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::path::Path;
use std::path::PathBuf;

use iris_lots_core::CauseLine;
use iris_lots_core::Certificate;
use iris_lots_core::CertificateBatch;
use iris_lots_core::CertificateKey;
use iris_lots_core::IdentFields;
use iris_lots_core::LineNumber;
use iris_lots_core::LotStore;
use iris_lots_core::Manager;
use iris_lots_core::OwnerId;
use iris_lots_store_sqlite::LotTables;
use iris_lots_store_sqlite::SqliteLotStore;
use iris_lots_store_sqlite::SqliteStoreConfig;
use rusqlite::Connection;

/// Opens a store at `<dir>/iris.db`.
pub fn store_in(dir: &Path) -> SqliteLotStore {
    SqliteLotStore::new(SqliteStoreConfig::new(dir.join("iris.db"))).expect("open store")
}

/// Builds a certificate with one text line per provided slot.
pub fn certificate(key: &str, lines: &[(LineNumber, &str)]) -> Certificate {
    let key = CertificateKey::new(key);
    let fields = IdentFields {
        date_death: Some("2024-01-02".to_string()),
        sex: Some("2".to_string()),
        manner_of_death: Some(1),
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

/// Three certificates A, B, C; B carries two lines and C none.
pub fn abc() -> Vec<Certificate> {
    vec![
        certificate("A", &[(LineNumber::A, "sepsis")]),
        certificate("B", &[(LineNumber::A, "stroke"), (LineNumber::Contributing, "diabetes")]),
        certificate("C", &[]),
    ]
}

/// Submits a batch for `owner`.
pub fn submit(store: &SqliteLotStore, owner: &str, certificates: Vec<Certificate>) -> Manager {
    store
        .submit(&OwnerId::new(owner), CertificateBatch::new(certificates).expect("batch"))
        .expect("submit")
}

/// Creates an exchange file holding an empty `<lot>Ident`/`<lot>MedCod` pair.
pub fn exchange_file(dir: &Path, lot: &str) -> PathBuf {
    let path = dir.join("exchange.db");
    let connection = Connection::open(&path).expect("open exchange file");
    LotTables::for_lot(lot).expect("lot name").create(&connection).expect("create tables");
    path
}

/// Sets `ucCode` on every certificate row of an exchange pair.
pub fn code_all(path: &Path, lot: &str, code: &str) {
    let connection = Connection::open(path).expect("open database");
    connection
        .execute(&format!("UPDATE \"{lot}Ident\" SET ucCode = ?1, status = 'Coded'"), [code])
        .expect("code rows");
}
