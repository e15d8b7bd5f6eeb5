// crates/graph-gateway-core/src/lib.rs
// ============================================================================
// Module: Graph Gateway Core
// Description: Tool identifiers, the static tool catalog, and request signing.
// Purpose: Shared, I/O-free building blocks for the gateway pipeline.
// Dependencies: serde, serde_jcs, hmac, sha2, subtle
// ============================================================================

//! ## Overview
//! `graph-gateway-core` holds the pieces of the gateway that never touch the
//! network: canonical tool names, the immutable tool catalog served to
//! callers, and the HMAC signer used for both outgoing upstream calls and
//! inbound message verification.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod signing;
pub mod tooling;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::SERVER_VERSION;
pub use catalog::ToolDescriptor;
pub use catalog::descriptor;
pub use catalog::tool_catalog;
pub use signing::SignedBody;
pub use signing::SigningError;
pub use signing::SigningSecret;
pub use signing::sign_payload;
pub use signing::verify_payload;
pub use tooling::ToolName;
