// crates/iris-lots-store-sqlite/src/rows.rs
// ============================================================================
// Module: Certificate Row Codec
// Description: Moves certificates in and out of `Ident`/`MedCod` table pairs.
// Purpose: Share one column mapping across the queue and exchange tables.
// Dependencies: iris-lots-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Certificate fields are mapped to columns through their JSON form, whose
//! names match the column names. Absent fields are left out of the insert so
//! column defaults apply. Reads return certificates in insertion order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use iris_lots_core::CauseLine;
use iris_lots_core::Certificate;
use iris_lots_core::CertificateKey;
use iris_lots_core::IdentFields;
use iris_lots_core::LineNumber;
use rusqlite::Connection;
use rusqlite::Row;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use rusqlite::types::ValueRef;
use serde_json::Map;
use serde_json::Value;

use crate::backend::LotTables;
use crate::backend::SqliteStoreError;
use crate::backend::db_err;

// ============================================================================
// SECTION: Columns
// ============================================================================

/// Certificate table columns after `certificateKey`, in DDL order.
pub const IDENT_COLUMNS: [&str; 44] = [
    "lastChange",
    "dateBirth",
    "dateDeath",
    "age",
    "sex",
    "mannerOfDeath",
    "ucCode",
    "mainInjury",
    "status",
    "reject",
    "coding",
    "codingVersion",
    "codingFlags",
    "selectedCodes",
    "substitutedCodes",
    "ernCodes",
    "acmeCodes",
    "multipleCodes",
    "comments",
    "freeText",
    "toDoList",
    "coderReject",
    "diagnosisModified",
    "residence",
    "name",
    "address",
    "autopsyRequested",
    "autopsyUsed",
    "recentSurgery",
    "dateOfSurgery",
    "reasonSurgery",
    "dateOfInjury",
    "placeOfOccurrence",
    "activityCode",
    "externalFreeText",
    "pregnancy",
    "pregnancyContributeDeath",
    "stillbirth",
    "multiplePregnancy",
    "completedWeeks",
    "birthWeight",
    "ageOfMother",
    "conditionsMother",
    "certImage",
];

/// The only integer column of the certificate table.
const INTEGER_COLUMN: &str = "mannerOfDeath";

/// Cause-line columns in DDL order.
const MED_COD_SELECT: &str =
    "certificateKey, lineNb, textLine, codeLine, intervalLine, codeOnly, lineCoded";

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Inserts certificates and their cause lines one row at a time.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when a field cannot be mapped or an insert
/// fails.
pub fn insert_certificates(
    connection: &Connection,
    tables: &LotTables,
    certificates: &[Certificate],
) -> Result<(), SqliteStoreError> {
    for certificate in certificates {
        insert_ident(connection, tables, certificate)?;
        for line in certificate.cause_lines().iter() {
            connection
                .execute(
                    &format!(
                        "INSERT INTO \"{}\" ({MED_COD_SELECT}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        tables.med_cod
                    ),
                    params![
                        line.certificate_key.as_str(),
                        i64::from(line.line_nb.index()),
                        line.text_line,
                        line.code_line,
                        line.interval_line,
                        line.code_only,
                        line.line_coded,
                    ],
                )
                .map_err(db_err)?;
        }
    }
    Ok(())
}

/// Inserts one certificate row with its non-null fields.
fn insert_ident(
    connection: &Connection,
    tables: &LotTables,
    certificate: &Certificate,
) -> Result<(), SqliteStoreError> {
    let Value::Object(fields) = serde_json::to_value(certificate.fields())
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?
    else {
        return Err(SqliteStoreError::Invalid("certificate fields must be an object".to_string()));
    };
    let mut columns = vec!["certificateKey"];
    let mut values = vec![SqlValue::Text(certificate.key().to_string())];
    for column in IDENT_COLUMNS {
        match fields.get(column) {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => {
                columns.push(column);
                values.push(SqlValue::Text(text.clone()));
            }
            Some(Value::Number(number)) => {
                let integer = number.as_i64().ok_or_else(|| {
                    SqliteStoreError::Invalid(format!("{column} must be an integer"))
                })?;
                columns.push(column);
                values.push(SqlValue::Integer(integer));
            }
            Some(_) => {
                return Err(SqliteStoreError::Invalid(format!("{column} has an unsupported type")));
            }
        }
    }
    let placeholders: Vec<String> = (1 ..= values.len()).map(|index| format!("?{index}")).collect();
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        tables.ident,
        columns.join(", "),
        placeholders.join(", ")
    );
    connection.execute(&sql, params_from_iter(values)).map_err(|err| {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err
            && failure.code == rusqlite::ErrorCode::ConstraintViolation
        {
            return SqliteStoreError::Conflict(format!(
                "certificate {} already staged",
                certificate.key()
            ));
        }
        db_err(err)
    })?;
    Ok(())
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Reads certificate rows without cause lines, in insertion order.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when a query fails or a row is malformed.
pub fn select_idents(
    connection: &Connection,
    tables: &LotTables,
    key: Option<&str>,
) -> Result<Vec<Certificate>, SqliteStoreError> {
    let columns = IDENT_COLUMNS.join(", ");
    let filter = if key.is_some() { " WHERE certificateKey = ?1" } else { "" };
    let sql = format!(
        "SELECT certificateKey, {columns} FROM \"{}\"{filter} ORDER BY rowid",
        tables.ident
    );
    let mut statement = connection.prepare(&sql).map_err(db_err)?;
    let mut rows = match key {
        Some(key) => statement.query(params![key]),
        None => statement.query(params![]),
    }
    .map_err(db_err)?;
    let mut certificates = Vec::new();
    while let Some(row) = rows.next().map_err(db_err)? {
        certificates.push(ident_from_row(row)?);
    }
    Ok(certificates)
}

/// Reads cause-line rows in insertion order.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when a query fails or a row is malformed.
pub fn select_cause_lines(
    connection: &Connection,
    tables: &LotTables,
    key: Option<&str>,
) -> Result<Vec<CauseLine>, SqliteStoreError> {
    let filter = if key.is_some() { " WHERE certificateKey = ?1" } else { "" };
    let sql = format!("SELECT {MED_COD_SELECT} FROM \"{}\"{filter} ORDER BY rowid", tables.med_cod);
    let mut statement = connection.prepare(&sql).map_err(db_err)?;
    let mut rows = match key {
        Some(key) => statement.query(params![key]),
        None => statement.query(params![]),
    }
    .map_err(db_err)?;
    let mut lines = Vec::new();
    while let Some(row) = rows.next().map_err(db_err)? {
        lines.push(cause_line_from_row(row)?);
    }
    Ok(lines)
}

/// Reads complete certificates, attaching cause lines by key lookup.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when a query fails or rows are malformed.
pub fn select_certificates(
    connection: &Connection,
    tables: &LotTables,
    key: Option<&str>,
) -> Result<Vec<Certificate>, SqliteStoreError> {
    let mut certificates = select_idents(connection, tables, key)?;
    for certificate in &mut certificates {
        let lines = select_cause_lines(connection, tables, Some(certificate.key().as_str()))?;
        for line in lines {
            certificate
                .add_cause_line(line)
                .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        }
    }
    Ok(certificates)
}

/// Deletes one certificate and its cause lines.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when a delete fails.
pub fn delete_certificate(
    connection: &Connection,
    tables: &LotTables,
    key: &str,
) -> Result<(), SqliteStoreError> {
    connection
        .execute(&format!("DELETE FROM \"{}\" WHERE certificateKey = ?1", tables.ident), params![
            key
        ])
        .map_err(db_err)?;
    connection
        .execute(&format!("DELETE FROM \"{}\" WHERE certificateKey = ?1", tables.med_cod), params![
            key
        ])
        .map_err(db_err)?;
    Ok(())
}

/// Counts certificate rows of a table pair.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the count query fails.
pub fn count_idents(
    connection: &Connection,
    tables: &LotTables,
) -> Result<usize, SqliteStoreError> {
    let count: i64 = connection
        .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", tables.ident), params![], |row| {
            row.get(0)
        })
        .map_err(db_err)?;
    usize::try_from(count).map_err(|_| SqliteStoreError::Corrupt("negative row count".to_string()))
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Builds a certificate without cause lines from a selected row.
fn ident_from_row(row: &Row<'_>) -> Result<Certificate, SqliteStoreError> {
    let key: String = row.get(0).map_err(db_err)?;
    let mut fields = Map::new();
    for (offset, column) in IDENT_COLUMNS.iter().enumerate() {
        let value = row.get_ref(offset + 1).map_err(db_err)?;
        if let Some(json) = column_value(column, value)? {
            fields.insert((*column).to_string(), json);
        }
    }
    let fields: IdentFields = serde_json::from_value(Value::Object(fields))
        .map_err(|err| SqliteStoreError::Corrupt(format!("certificate {key}: {err}")))?;
    Ok(Certificate::new(CertificateKey::new(key), fields))
}

/// Converts one stored column into its JSON field value.
fn column_value(column: &str, value: ValueRef<'_>) -> Result<Option<Value>, SqliteStoreError> {
    let json = match value {
        ValueRef::Null => return Ok(None),
        ValueRef::Integer(number) if column == INTEGER_COLUMN => Value::from(number),
        ValueRef::Integer(number) => Value::String(number.to_string()),
        ValueRef::Real(number) => Value::String(number.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                SqliteStoreError::Corrupt(format!("{column} is not valid utf-8"))
            })?;
            if column == INTEGER_COLUMN {
                let number: i64 = text.trim().parse().map_err(|_| {
                    SqliteStoreError::Corrupt(format!("{column} must be an integer"))
                })?;
                Value::from(number)
            } else {
                Value::String(text.to_string())
            }
        }
    };
    Ok(Some(json))
}

/// Builds a cause line from a selected row.
fn cause_line_from_row(row: &Row<'_>) -> Result<CauseLine, SqliteStoreError> {
    let key: String = row.get(0).map_err(db_err)?;
    let line_nb: i64 = row.get(1).map_err(db_err)?;
    let line_nb = u8::try_from(line_nb)
        .ok()
        .and_then(|index| LineNumber::try_from(index).ok())
        .ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("certificate {key}: invalid line number {line_nb}"))
        })?;
    let mut line = CauseLine::new(CertificateKey::new(key), line_nb);
    line.text_line = row.get(2).map_err(db_err)?;
    line.code_line = row.get(3).map_err(db_err)?;
    line.interval_line = row.get(4).map_err(db_err)?;
    line.code_only = row.get(5).map_err(db_err)?;
    line.line_coded = row.get(6).map_err(db_err)?;
    Ok(line)
}
