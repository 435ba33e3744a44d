// crates/iris-lots-core/src/core/certificate.rs
// ============================================================================
// Module: Iris Lots Certificates
// Description: Certificate records, cause-of-death lines, and batches.
// Purpose: Enforce structural invariants before records reach storage.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`Certificate`] pairs identification fields with at most six cause lines.
//! Lines are held in a fixed set keyed by [`LineNumber`], so duplicates and
//! lines that point at another certificate are rejected when the certificate
//! is built or deserialized. Field-level value checks are left to callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::CertificateKey;
use crate::core::identifiers::IdentifierError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structural certificate and batch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    /// Line number outside 0..=5.
    #[error("invalid cause line number: {0}")]
    InvalidLine(u8),
    /// Two lines share a line number.
    #[error("certificate {key} has duplicate cause line {line}")]
    DuplicateLine {
        /// Owning certificate.
        key: CertificateKey,
        /// Repeated line number.
        line: LineNumber,
    },
    /// A line references a different certificate.
    #[error("cause line for {line_key} attached to certificate {key}")]
    ParentMismatch {
        /// Owning certificate.
        key: CertificateKey,
        /// Key carried by the line.
        line_key: CertificateKey,
    },
    /// Identifier failed validation.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    /// Batch contained no certificates.
    #[error("certificate batch must be non-empty")]
    EmptyBatch,
    /// Batch repeats a certificate key.
    #[error("duplicate certificate key in batch: {0}")]
    DuplicateKey(CertificateKey),
}

// ============================================================================
// SECTION: Line Numbers
// ============================================================================

/// Cause-of-death line slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LineNumber {
    /// Primary cause line a.
    A,
    /// Primary cause line b.
    B,
    /// Primary cause line c.
    C,
    /// Primary cause line d.
    D,
    /// Primary cause line e.
    E,
    /// Contributing cause line.
    Contributing,
}

impl LineNumber {
    /// All line slots in stored order.
    pub const ALL: [Self; 6] = [Self::A, Self::B, Self::C, Self::D, Self::E, Self::Contributing];

    /// Returns the stored line number.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
            Self::E => 4,
            Self::Contributing => 5,
        }
    }

    /// Slot position inside [`CauseLines`].
    const fn slot(self) -> usize {
        self.index() as usize
    }
}

impl TryFrom<u8> for LineNumber {
    type Error = CertificateError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(value)).copied().ok_or(CertificateError::InvalidLine(value))
    }
}

impl From<LineNumber> for u8 {
    fn from(value: LineNumber) -> Self {
        value.index()
    }
}

impl fmt::Display for LineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.index().fmt(f)
    }
}

// ============================================================================
// SECTION: Cause Lines
// ============================================================================

/// One cause-of-death line ("MedCod" row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseLine {
    /// Parent certificate key.
    pub certificate_key: CertificateKey,
    /// Line slot.
    pub line_nb: LineNumber,
    /// Free text as written on the certificate.
    #[serde(default)]
    pub text_line: Option<String>,
    /// Codes assigned to the line.
    #[serde(default)]
    pub code_line: Option<String>,
    /// Reported interval.
    #[serde(default)]
    pub interval_line: Option<String>,
    /// Code-only marker.
    #[serde(default)]
    pub code_only: Option<String>,
    /// Coding outcome for the line.
    #[serde(default)]
    pub line_coded: Option<String>,
}

impl CauseLine {
    /// Creates an empty line for the given certificate and slot.
    #[must_use]
    pub fn new(certificate_key: CertificateKey, line_nb: LineNumber) -> Self {
        Self {
            certificate_key,
            line_nb,
            text_line: None,
            code_line: None,
            interval_line: None,
            code_only: None,
            line_coded: None,
        }
    }
}

/// Fixed-capacity set of cause lines keyed by [`LineNumber`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CauseLine>", into = "Vec<CauseLine>")]
pub struct CauseLines {
    /// One optional slot per line number.
    slots: [Option<CauseLine>; 6],
}

impl CauseLines {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a line, rejecting an occupied slot.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::DuplicateLine`] when the slot is taken.
    pub fn insert(&mut self, line: CauseLine) -> Result<(), CertificateError> {
        let slot = &mut self.slots[line.line_nb.slot()];
        if slot.is_some() {
            return Err(CertificateError::DuplicateLine {
                key: line.certificate_key,
                line: line.line_nb,
            });
        }
        *slot = Some(line);
        Ok(())
    }

    /// Returns the line stored in a slot.
    #[must_use]
    pub fn get(&self, line: LineNumber) -> Option<&CauseLine> {
        self.slots[line.slot()].as_ref()
    }

    /// Iterates lines in line-number order.
    pub fn iter(&self) -> impl Iterator<Item = &CauseLine> {
        self.slots.iter().flatten()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true when no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl TryFrom<Vec<CauseLine>> for CauseLines {
    type Error = CertificateError;

    fn try_from(lines: Vec<CauseLine>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for line in lines {
            set.insert(line)?;
        }
        Ok(set)
    }
}

impl From<CauseLines> for Vec<CauseLine> {
    fn from(lines: CauseLines) -> Self {
        lines.slots.into_iter().flatten().collect()
    }
}

// ============================================================================
// SECTION: Identification Fields
// ============================================================================

/// Identification and coding fields of a certificate ("Ident" row).
///
/// Serialized names match the persisted column names. Absent fields fall back
/// to column defaults when stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs, reason = "Field names mirror the persisted column set.")]
pub struct IdentFields {
    pub last_change: Option<String>,
    pub date_birth: Option<String>,
    pub date_death: Option<String>,
    pub age: Option<String>,
    pub sex: Option<String>,
    pub manner_of_death: Option<u8>,
    pub uc_code: Option<String>,
    pub main_injury: Option<String>,
    pub status: Option<String>,
    pub reject: Option<String>,
    pub coding: Option<String>,
    pub coding_version: Option<String>,
    pub coding_flags: Option<String>,
    pub selected_codes: Option<String>,
    pub substituted_codes: Option<String>,
    pub ern_codes: Option<String>,
    pub acme_codes: Option<String>,
    pub multiple_codes: Option<String>,
    pub comments: Option<String>,
    pub free_text: Option<String>,
    pub to_do_list: Option<String>,
    pub coder_reject: Option<String>,
    pub diagnosis_modified: Option<String>,
    pub residence: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub autopsy_requested: Option<String>,
    pub autopsy_used: Option<String>,
    pub recent_surgery: Option<String>,
    pub date_of_surgery: Option<String>,
    pub reason_surgery: Option<String>,
    pub date_of_injury: Option<String>,
    pub place_of_occurrence: Option<String>,
    pub activity_code: Option<String>,
    pub external_free_text: Option<String>,
    pub pregnancy: Option<String>,
    pub pregnancy_contribute_death: Option<String>,
    pub stillbirth: Option<String>,
    pub multiple_pregnancy: Option<String>,
    pub completed_weeks: Option<String>,
    pub birth_weight: Option<String>,
    pub age_of_mother: Option<String>,
    pub conditions_mother: Option<String>,
    pub cert_image: Option<String>,
}

// ============================================================================
// SECTION: Certificate
// ============================================================================

/// A certificate with its cause lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "CertificateRecord")]
pub struct Certificate {
    /// Certificate key.
    certificate_key: CertificateKey,
    /// Identification fields.
    #[serde(flatten)]
    fields: IdentFields,
    /// Cause lines keyed by line number.
    cause_lines: CauseLines,
}

/// Unchecked wire form of a certificate.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateRecord {
    /// Certificate key.
    certificate_key: CertificateKey,
    /// Identification fields.
    #[serde(flatten)]
    fields: IdentFields,
    /// Cause lines in any order.
    #[serde(default)]
    cause_lines: Vec<CauseLine>,
}

impl TryFrom<CertificateRecord> for Certificate {
    type Error = CertificateError;

    fn try_from(record: CertificateRecord) -> Result<Self, Self::Error> {
        let mut certificate = Self::new(record.certificate_key, record.fields);
        for line in record.cause_lines {
            certificate.add_cause_line(line)?;
        }
        Ok(certificate)
    }
}

impl Certificate {
    /// Creates a certificate without cause lines.
    #[must_use]
    pub fn new(certificate_key: CertificateKey, fields: IdentFields) -> Self {
        Self {
            certificate_key,
            fields,
            cause_lines: CauseLines::new(),
        }
    }

    /// Adds a cause line owned by this certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError`] on parent mismatch or duplicate slot.
    pub fn add_cause_line(&mut self, line: CauseLine) -> Result<(), CertificateError> {
        if line.certificate_key != self.certificate_key {
            return Err(CertificateError::ParentMismatch {
                key: self.certificate_key.clone(),
                line_key: line.certificate_key,
            });
        }
        self.cause_lines.insert(line)
    }

    /// Builder form of [`Certificate::add_cause_line`].
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError`] on parent mismatch or duplicate slot.
    pub fn with_cause_line(mut self, line: CauseLine) -> Result<Self, CertificateError> {
        self.add_cause_line(line)?;
        Ok(self)
    }

    /// Returns the certificate key.
    #[must_use]
    pub const fn key(&self) -> &CertificateKey {
        &self.certificate_key
    }

    /// Returns the identification fields.
    #[must_use]
    pub const fn fields(&self) -> &IdentFields {
        &self.fields
    }

    /// Returns mutable identification fields.
    pub const fn fields_mut(&mut self) -> &mut IdentFields {
        &mut self.fields
    }

    /// Returns the cause lines.
    #[must_use]
    pub const fn cause_lines(&self) -> &CauseLines {
        &self.cause_lines
    }

    /// Moves the certificate and all its lines under a new key.
    #[must_use]
    pub fn rekey(mut self, key: CertificateKey) -> Self {
        for line in self.cause_lines.slots.iter_mut().flatten() {
            line.certificate_key = key.clone();
        }
        self.certificate_key = key;
        self
    }
}

// ============================================================================
// SECTION: Batches
// ============================================================================

/// Non-empty set of certificates with distinct, valid keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBatch {
    /// Certificates in submission order.
    certificates: Vec<Certificate>,
}

impl CertificateBatch {
    /// Validates and wraps a list of certificates.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError`] for empty batches, invalid keys, or
    /// repeated keys.
    pub fn new(certificates: Vec<Certificate>) -> Result<Self, CertificateError> {
        if certificates.is_empty() {
            return Err(CertificateError::EmptyBatch);
        }
        let mut seen = BTreeSet::new();
        for certificate in &certificates {
            certificate.key().validate()?;
            if !seen.insert(certificate.key()) {
                return Err(CertificateError::DuplicateKey(certificate.key().clone()));
            }
        }
        Ok(Self {
            certificates,
        })
    }

    /// Number of certificates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always false; batches are non-empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Returns true for single-certificate batches.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.certificates.len() == 1
    }

    /// Returns the certificates.
    #[must_use]
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Consumes the batch.
    #[must_use]
    pub fn into_inner(self) -> Vec<Certificate> {
        self.certificates
    }
}
