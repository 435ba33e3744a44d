// crates/iris-lots-cli/src/lib.rs
// ============================================================================
// Module: Iris Lots CLI Library
// Description: Shared wiring for the iris-lots command-line interface.
// Purpose: Assemble store, exchange, supervisor, worker, and service from config.
// Dependencies: iris-lots-config, iris-lots-core, iris-lots-store-sqlite
// ============================================================================

//! ## Overview
//! The binary entry point (`src/main.rs`) parses arguments and renders output;
//! this library turns a validated configuration into a running
//! [`LotRuntime`](wiring::LotRuntime) so the same assembly can be exercised by
//! integration tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Runtime assembly from configuration.
pub mod wiring;
