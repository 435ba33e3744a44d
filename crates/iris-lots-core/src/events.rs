// crates/iris-lots-core/src/events.rs
// ============================================================================
// Module: Iris Lots Events
// Description: Structured JSON-line events for queue and worker activity.
// Purpose: Emit operational logs without a global logger.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Components report activity as [`LotEvent`] values through a
//! [`LotEventSink`]. Sinks serialize one JSON object per line so deployments
//! can route events wherever they like.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::LotUid;
use crate::core::Manager;
use crate::core::OwnerId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Lot activity event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Lot the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<LotUid>,
    /// Owner of the lot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,
    /// Output stream label for tool output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<&'static str>,
    /// Free-form detail (tool line, fault message).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Certificate or lot count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl LotEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            timestamp_ms: now_millis(),
            uid: None,
            owner: None,
            stream: None,
            message: None,
            count: None,
        }
    }

    /// Attaches the lot identity of a manager row.
    #[must_use]
    pub fn lot(mut self, manager: &Manager) -> Self {
        self.uid = Some(manager.uid.clone());
        self.owner = Some(manager.owner.clone());
        self
    }

    /// Attaches an owner and uid pair.
    #[must_use]
    pub fn ids(mut self, owner: &OwnerId, uid: &LotUid) -> Self {
        self.uid = Some(uid.clone());
        self.owner = Some(owner.clone());
        self
    }

    /// Attaches an output stream label.
    #[must_use]
    pub const fn stream(mut self, stream: &'static str) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a count.
    #[must_use]
    pub const fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Event sink for lot activity.
pub trait LotEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &LotEvent);
}

/// Event sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl LotEventSink for StderrEventSink {
    fn record(&self, event: &LotEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Event sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LotEventSink for FileEventSink {
    fn record(&self, event: &LotEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op event sink.
pub struct NoopEventSink;

impl LotEventSink for NoopEventSink {
    fn record(&self, _event: &LotEvent) {}
}

/// Event sink that keeps events in memory for inspection.
#[derive(Default)]
pub struct MemoryEventSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<LotEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LotEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the recorded events with the given identifier.
    #[must_use]
    pub fn named(&self, event: &str) -> Vec<LotEvent> {
        self.events().into_iter().filter(|recorded| recorded.event == event).collect()
    }
}

impl LotEventSink for MemoryEventSink {
    fn record(&self, event: &LotEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current unix epoch in milliseconds.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
