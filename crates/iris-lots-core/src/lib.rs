// crates/iris-lots-core/src/lib.rs
// ============================================================================
// Module: Iris Lots Core Library
// Description: Public API surface for the lot queue core.
// Purpose: Expose lot types, storage interfaces, and runtime components.
// Dependencies: crate::{core, events, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Iris Lots batches death certificates into lots, hands each lot to an
//! external coding tool, and returns coded results. This crate holds the
//! storage-agnostic parts: the lot model, the [`LotStore`] and
//! [`SyncStrategy`] contracts, the process supervisor, the background worker,
//! and the [`LotService`] facade.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod events;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use events::FileEventSink;
pub use events::LotEvent;
pub use events::LotEventSink;
pub use events::MemoryEventSink;
pub use events::NoopEventSink;
pub use events::StderrEventSink;
pub use interfaces::ExchangeHandle;
pub use interfaces::LotStore;
pub use interfaces::StoreError;
pub use interfaces::SyncError;
pub use interfaces::SyncStrategy;
pub use runtime::InMemoryLotStore;
pub use runtime::LotFault;
pub use runtime::LotService;
pub use runtime::LotWorker;
pub use runtime::ProcessSupervisor;
pub use runtime::SupervisorState;
pub use runtime::ToolCommand;
pub use runtime::ToolFault;
pub use runtime::ToolRun;
