// crates/iris-lots-core/src/core/mod.rs
// ============================================================================
// Module: Iris Lots Core Types
// Description: Lot queue entries, certificates, and identifiers.
// Purpose: Provide stable, serializable types shared by every crate.
// Dependencies: rand, serde, thiserror
// ============================================================================

//! ## Overview
//! Core types describe what flows through the lot queue: identifiers, the
//! manager row, and certificate batches with their cause lines.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod certificate;
pub mod identifiers;
pub mod lot;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use certificate::CauseLine;
pub use certificate::CauseLines;
pub use certificate::Certificate;
pub use certificate::CertificateBatch;
pub use certificate::CertificateError;
pub use certificate::IdentFields;
pub use certificate::LineNumber;
pub use identifiers::CertificateKey;
pub use identifiers::GENERATED_KEY_LENGTH;
pub use identifiers::IdentifierError;
pub use identifiers::LotUid;
pub use identifiers::MAX_CERTIFICATE_KEY_LENGTH;
pub use identifiers::MAX_LOT_UID_LENGTH;
pub use identifiers::MAX_OWNER_LENGTH;
pub use identifiers::OwnerId;
pub use lot::LotType;
pub use lot::Manager;
pub use lot::ProcessingStatus;
pub use lot::Recovery;
pub use lot::unix_millis;
