// crates/iris-lots-core/src/runtime/mod.rs
// ============================================================================
// Module: Iris Lots Runtime
// Description: Tool supervision, the lot worker, and the request facade.
// Purpose: Drive lots from submission through coding to recovery.
// Dependencies: crate::{core, events, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules execute the lot lifecycle. Storage and the exchange medium
//! are reached only through [`crate::interfaces`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod fault;
pub mod service;
pub mod store;
pub mod supervisor;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fault::LotFault;
pub use fault::ToolFault;
pub use service::LotService;
pub use store::InMemoryLotStore;
pub use supervisor::DEFAULT_TOOL_TIMEOUT_SECONDS;
pub use supervisor::ProcessSupervisor;
pub use supervisor::SupervisorState;
pub use supervisor::ToolCommand;
pub use supervisor::ToolRun;
pub use worker::LotWorker;
