// crates/graph-gateway-mcp/src/lib.rs
// ============================================================================
// Module: Graph Gateway MCP
// Description: Tool pipeline and transports for the knowledge-graph gateway.
// Purpose: Authenticate, rate-limit, sign, forward, and audit tool calls.
// Dependencies: graph-gateway-core, graph-gateway-config, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! The gateway exposes the graph tool catalog over JSON-RPC 2.0. Every call
//! flows through [`tools::ToolRouter`]: argument validation, identity
//! resolution, simulation gating, signed forwarding to the upstream graph
//! API, and structured audit. Transports (stdio, one-shot HTTP, and
//! session-based SSE) live in [`server`].
//!
//! Security posture: all inbound data is untrusted. Protected HTTP routes are
//! rate limited and require an HMAC signature over the raw request bytes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod dispatch;
pub mod identity;
pub mod protocol;
pub mod rate_limit;
pub mod server;
pub mod sessions;
pub mod tools;
pub mod upstream;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::McpAuditEvent;
pub use audit::McpAuditSink;
pub use audit::McpFileAuditSink;
pub use audit::McpMemoryAuditSink;
pub use audit::McpNoopAuditSink;
pub use audit::McpStderrAuditSink;
pub use identity::CallerIdentity;
pub use identity::IdentityError;
pub use identity::IdentityPolicy;
pub use rate_limit::RateDecision;
pub use rate_limit::RateLimiter;
pub use server::McpServer;
pub use server::McpServerError;
pub use sessions::SessionError;
pub use sessions::SessionRegistry;
pub use tools::ToolCall;
pub use tools::ToolError;
pub use tools::ToolRouter;
pub use upstream::GraphApi;
pub use upstream::HttpGraphApi;
pub use upstream::OutboundRequest;
pub use upstream::UpstreamError;
pub use upstream::UpstreamResponse;
