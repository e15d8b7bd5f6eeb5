// crates/graph-gateway-config/src/lib.rs
// ============================================================================
// Module: Graph Gateway Config Library
// Description: Canonical config model, environment overlay, and validation.
// Purpose: Single source of truth for gateway runtime settings.
// Dependencies: graph-gateway-core, serde, toml
// ============================================================================

//! ## Overview
//! `graph-gateway-config` defines the configuration model for the gateway.
//! Settings come from an optional TOML file, are overlaid with environment
//! variables, and are validated fail-closed before the server starts.
//!
//! Security posture: config inputs are untrusted; the signing secret is never
//! rendered by `Debug`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
