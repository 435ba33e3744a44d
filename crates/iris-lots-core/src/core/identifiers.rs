// crates/iris-lots-core/src/core/identifiers.rs
// ============================================================================
// Module: Iris Lots Identifiers
// Description: Opaque identifiers for lots, owners, and certificates.
// Purpose: Provide strongly typed, serializable IDs with bounded lengths.
// Dependencies: rand, serde, thiserror
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings that serialize transparently. Construction is
//! unchecked; boundaries call [`LotUid::validate`], [`OwnerId::validate`] or
//! [`CertificateKey::validate`] before anything reaches storage, because the
//! persisted schema caps each column length.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a lot uid.
pub const MAX_LOT_UID_LENGTH: usize = 30;
/// Maximum length of an owner identifier.
pub const MAX_OWNER_LENGTH: usize = 32;
/// Maximum length of a certificate key.
pub const MAX_CERTIFICATE_KEY_LENGTH: usize = 30;
/// Length of generated lot uids and certificate keys.
pub const GENERATED_KEY_LENGTH: usize = 30;

/// Alphabet used for generated keys; single case so uids stay distinct as
/// `SQLite` table names.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier was empty or whitespace.
    #[error("{kind} must be non-empty")]
    Empty {
        /// Identifier kind label.
        kind: &'static str,
    },
    /// Identifier exceeded its maximum length.
    #[error("{kind} exceeds {max} characters")]
    TooLong {
        /// Identifier kind label.
        kind: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
    /// Identifier contains characters not allowed in table names.
    #[error("{kind} must be ascii alphanumeric")]
    Charset {
        /// Identifier kind label.
        kind: &'static str,
    },
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Lot identifier; names per-lot tables for multi-certificate lots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotUid(String);

impl LotUid {
    /// Creates a new lot uid.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random alphabetic lot uid.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_key())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates length and charset.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the uid cannot name a lot.
    pub fn validate(&self) -> Result<(), IdentifierError> {
        validate_bounded("lot uid", &self.0, MAX_LOT_UID_LENGTH)?;
        if !self.0.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(IdentifierError::Charset {
                kind: "lot uid",
            });
        }
        Ok(())
    }
}

impl fmt::Display for LotUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for LotUid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LotUid {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Owner (requesting session) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates a new owner identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates the owner length.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the owner is blank or too long.
    pub fn validate(&self) -> Result<(), IdentifierError> {
        validate_bounded("owner", &self.0, MAX_OWNER_LENGTH)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Certificate key, unique within a lot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateKey(String);

impl CertificateKey {
    /// Creates a new certificate key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generates a random alphabetic certificate key.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_key())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates the key length.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the key is blank or too long.
    pub fn validate(&self) -> Result<(), IdentifierError> {
        validate_bounded("certificate key", &self.0, MAX_CERTIFICATE_KEY_LENGTH)
    }
}

impl fmt::Display for CertificateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CertificateKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CertificateKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Checks that a value is non-blank and at most `max` characters long.
fn validate_bounded(kind: &'static str, value: &str, max: usize) -> Result<(), IdentifierError> {
    if value.trim().is_empty() {
        return Err(IdentifierError::Empty {
            kind,
        });
    }
    if value.chars().count() > max {
        return Err(IdentifierError::TooLong {
            kind,
            max,
        });
    }
    Ok(())
}

/// Returns a random string of uppercase ascii letters.
fn random_key() -> String {
    let mut rng = rand::thread_rng();
    (0 .. GENERATED_KEY_LENGTH)
        .map(|_| char::from(KEY_ALPHABET[rng.gen_range(0 .. KEY_ALPHABET.len())]))
        .collect()
}
