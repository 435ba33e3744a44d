// crates/iris-lots-core/src/runtime/fault.rs
// ============================================================================
// Module: Iris Lots Faults
// Description: Fault taxonomy for requests, the worker, and the coding tool.
// Purpose: Map tool exit codes and storage failures to cacheable faults.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`ToolFault`] covers everything the coding tool can report: the fixed exit
//! code table, timeouts, and spawn failures. [`LotFault`] is what callers see.
//! Frontend faults are returned to the caller only; backend and tool faults
//! stop the worker and are cached until the process restarts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::interfaces::StoreError;
use crate::interfaces::SyncError;

// ============================================================================
// SECTION: Tool Faults
// ============================================================================

/// Faults reported while running the coding tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolFault {
    /// Exit code 2.
    #[error("(2) No records coded")]
    NoRecordsCoded,
    /// Exit code 4.
    #[error("(4) MUSE initialization error")]
    InitializationError,
    /// Exit code 5.
    #[error("(5) Table database problem")]
    TableProblem,
    /// Exit code 6.
    #[error("(6) Coding failure")]
    CodingFailure,
    /// Exit code 7.
    #[error("(7) Lot-specific error")]
    LotSpecificError,
    /// Exit code 8.
    #[error("(8) Invalid parameter(s)")]
    InvalidParameters,
    /// Exit code 9.
    #[error("(9) Technical failure or coding file is missing")]
    MissingCodingFile,
    /// Any other nonzero exit code.
    #[error("exit code {0}")]
    ExitCode(i32),
    /// Tool did not exit before the deadline and was killed.
    #[error("tool did not respond within {seconds} seconds")]
    Timeout {
        /// Configured timeout.
        seconds: u64,
    },
    /// Tool exited without a code (killed by a signal).
    #[error("tool terminated without an exit code")]
    Terminated,
    /// Tool could not be started.
    #[error("failed to start tool: {0}")]
    Spawn(String),
    /// Waiting on the tool failed.
    #[error("tool supervision error: {0}")]
    Io(String),
}

impl ToolFault {
    /// Maps an exit code to a fault; zero is success.
    #[must_use]
    pub const fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => None,
            2 => Some(Self::NoRecordsCoded),
            4 => Some(Self::InitializationError),
            5 => Some(Self::TableProblem),
            6 => Some(Self::CodingFailure),
            7 => Some(Self::LotSpecificError),
            8 => Some(Self::InvalidParameters),
            9 => Some(Self::MissingCodingFile),
            other => Some(Self::ExitCode(other)),
        }
    }
}

// ============================================================================
// SECTION: Lot Faults
// ============================================================================

/// Fault returned to callers of the lot service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LotFault {
    /// Request-scoped fault (unknown lot, bad input).
    #[error("frontend fault: {0}")]
    Frontend(String),
    /// Storage or infrastructure fault; fatal to the worker.
    #[error("backend fault: {0}")]
    Backend(String),
    /// Coding tool fault; fatal to the worker.
    #[error("tool fault: {0}")]
    Tool(ToolFault),
}

impl LotFault {
    /// Returns true for faults that stop the worker and are cached.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Frontend(_))
    }
}

impl From<StoreError> for LotFault {
    fn from(error: StoreError) -> Self {
        if error.is_frontend() {
            Self::Frontend(error.to_string())
        } else {
            Self::Backend(error.to_string())
        }
    }
}

impl From<SyncError> for LotFault {
    fn from(error: SyncError) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<ToolFault> for LotFault {
    fn from(fault: ToolFault) -> Self {
        Self::Tool(fault)
    }
}
