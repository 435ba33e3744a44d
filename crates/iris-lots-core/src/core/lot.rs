// crates/iris-lots-core/src/core/lot.rs
// ============================================================================
// Module: Iris Lots Queue Model
// Description: Manager rows, lot types, and processing status.
// Purpose: Describe queue entries as they are persisted and exchanged.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Manager`] is the queue entry for one in-flight lot. Its status moves
//! `Ready -> Running -> Finished` and the row disappears once results are
//! delivered. Enum discriminants match the integers stored in the `manager`
//! table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

use crate::core::certificate::Certificate;
use crate::core::identifiers::LotUid;
use crate::core::identifiers::OwnerId;

// ============================================================================
// SECTION: Enums
// ============================================================================

/// Storage layout of a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotType {
    /// Single certificate kept in the shared staging pair.
    Unique,
    /// Several certificates kept in a per-lot table pair.
    Multiple,
}

impl LotType {
    /// Returns the persisted integer code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Unique => 0,
            Self::Multiple => 1,
        }
    }

    /// Parses a persisted integer code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Unique),
            1 => Some(Self::Multiple),
            _ => None,
        }
    }
}

/// Processing status of a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Waiting for the worker.
    Ready,
    /// Consumed by the worker and handed to the tool.
    Running,
    /// Coded results are available for recovery.
    Finished,
}

impl ProcessingStatus {
    /// Returns the persisted integer code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Ready => 0,
            Self::Running => 1,
            Self::Finished => 2,
        }
    }

    /// Parses a persisted integer code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Ready),
            1 => Some(Self::Running),
            2 => Some(Self::Finished),
            _ => None,
        }
    }

    /// Returns true while the lot still awaits results.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Queue entry tracking one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    /// Lot identifier.
    pub uid: LotUid,
    /// Requesting owner.
    pub owner: OwnerId,
    /// Creation time (unix millis).
    pub created: i64,
    /// Last access time (unix millis).
    pub accessed: i64,
    /// Storage layout.
    pub lot_type: LotType,
    /// Processing status.
    pub status: ProcessingStatus,
}

impl Manager {
    /// Creates a READY manager stamped with the current time.
    #[must_use]
    pub fn ready(uid: LotUid, owner: OwnerId, lot_type: LotType) -> Self {
        let now = unix_millis();
        Self {
            uid,
            owner,
            created: now,
            accessed: now,
            lot_type,
            status: ProcessingStatus::Ready,
        }
    }
}

/// Outcome of a recovery poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Recovery {
    /// Lot is still queued or running.
    Pending(ProcessingStatus),
    /// Coded certificates; the manager row is gone.
    Finished(Vec<Certificate>),
}

// ============================================================================
// SECTION: Time
// ============================================================================

/// Returns the current unix epoch in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
