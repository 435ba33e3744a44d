// crates/iris-lots-config/src/lib.rs
// ============================================================================
// Module: Iris Lots Config Library
// Description: Configuration model and validation for iris-lots.
// Purpose: Single source of truth for iris-lots.toml semantics.
// Dependencies: iris-lots-core, iris-lots-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `iris-lots-config` loads `iris-lots.toml` with strict size and path limits
//! and validates it before any store, exchange file, or tool is touched.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
