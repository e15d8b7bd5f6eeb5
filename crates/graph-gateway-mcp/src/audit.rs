// crates/graph-gateway-mcp/src/audit.rs
// ============================================================================
// Module: MCP Audit Logging
// Description: Structured audit events for tool calls and transport activity.
// Purpose: Emit redacted JSON-line audit records without blocking requests.
// Dependencies: graph-gateway-core, serde
// ============================================================================

//! ## Overview
//! Every terminal outcome of the tool pipeline produces exactly one audit
//! event. Sinks are fire-and-forget: serialization or write failures are
//! swallowed so logging never changes a response.

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

use graph_gateway_core::ToolName;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of identity characters kept in rate-limit events.
const IDENTITY_PREFIX_CHARS: usize = 8;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit event envelope.
#[derive(Debug, Clone, Serialize)]
pub struct McpAuditEvent {
    /// Event identifier (for example `mcp.tool_call`).
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Outcome-specific fields.
    #[serde(flatten)]
    pub detail: AuditDetail,
}

/// Outcome-specific audit fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AuditDetail {
    /// Successful upstream call.
    ToolCall(ToolCallAudit),
    /// Failed tool call after identity resolution.
    ToolError(ToolErrorAudit),
    /// Simulation echo served instead of an upstream call.
    Simulation(SimulationAudit),
    /// Rate limiter rejection.
    RateLimit(RateLimitAudit),
    /// Session lifecycle change.
    Session(SessionAudit),
    /// Server lifecycle or misconfiguration notice.
    Server(ServerAudit),
}

impl AuditDetail {
    /// Returns the event identifier for this detail.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ToolCall(_) => "mcp.tool_call",
            Self::ToolError(_) => "mcp.tool_error",
            Self::Simulation(_) => "mcp.tool_call.simulation",
            Self::RateLimit(_) => "mcp.rate_limit",
            Self::Session(_) => "mcp.session",
            Self::Server(_) => "mcp.server",
        }
    }
}

/// Successful upstream call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallAudit {
    /// Tool invoked.
    pub tool: ToolName,
    /// Graph identifier when supplied.
    #[serde(rename = "graphId")]
    pub graph_id: Option<String>,
    /// Attributed user identifier.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Upstream HTTP status.
    pub status: u16,
    /// Wall-clock duration of the upstream call.
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    /// Upstream-reported usage figure (zero when absent).
    pub billable_units: Value,
    /// Determinism flag from the tool catalog.
    pub deterministic: bool,
    /// Emitting layer label.
    pub layer: &'static str,
}

/// Failed tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolErrorAudit {
    /// Tool invoked.
    pub tool: ToolName,
    /// Graph identifier when supplied.
    #[serde(rename = "graphId")]
    pub graph_id: Option<String>,
    /// Attributed user identifier.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Upstream status, or a generic server error code.
    pub status: u16,
    /// Wall-clock duration until failure.
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    /// Best-effort human-readable message.
    pub error: String,
}

/// Simulation echo.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationAudit {
    /// Tool that would have been invoked.
    pub tool: ToolName,
    /// Graph identifier when supplied.
    #[serde(rename = "graphId")]
    pub graph_id: Option<String>,
    /// Attributed user identifier.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Always true for this event.
    pub simulation_mode: bool,
    /// Accepted simulation directive.
    pub simulation_type: &'static str,
}

/// Rate limiter rejection.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitAudit {
    /// Truncated identity key.
    #[serde(rename = "apiKey")]
    pub identity: String,
    /// Request count observed in the current window.
    pub count: u32,
    /// Configured maximum per window.
    pub limit: u32,
}

impl RateLimitAudit {
    /// Builds a rejection record, truncating the identity key.
    #[must_use]
    pub fn new(identity: &str, count: u32, limit: u32) -> Self {
        Self {
            identity: redact_identity(identity),
            count,
            limit,
        }
    }
}

/// Session lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    /// Session registered.
    Opened,
    /// Session removed.
    Closed,
}

/// Session lifecycle change.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAudit {
    /// Session identifier.
    pub session_id: String,
    /// Lifecycle action.
    pub action: SessionAction,
    /// Sessions open after the change.
    pub active: usize,
}

/// Severity of server notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational lifecycle notice.
    Info,
    /// Degraded but serving.
    Warning,
    /// Deployment defect.
    Critical,
}

/// Server lifecycle or misconfiguration notice.
#[derive(Debug, Clone, Serialize)]
pub struct ServerAudit {
    /// Notice severity.
    pub severity: Severity,
    /// Notice message.
    pub message: String,
}

impl McpAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(detail: AuditDetail) -> Self {
        Self {
            event: detail.event_name(),
            timestamp_ms: unix_millis(),
            detail,
        }
    }

    /// Convenience constructor for server notices.
    #[must_use]
    pub fn server(severity: Severity, message: impl Into<String>) -> Self {
        Self::new(AuditDetail::Server(ServerAudit {
            severity,
            message: message.into(),
        }))
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait McpAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &McpAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct McpStderrAuditSink;

impl McpAuditSink for McpStderrAuditSink {
    fn record(&self, event: &McpAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct McpFileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl McpFileAuditSink {
    /// Opens the audit log file in append mode.
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

impl McpAuditSink for McpFileAuditSink {
    fn record(&self, event: &McpAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct McpNoopAuditSink;

impl McpAuditSink for McpNoopAuditSink {
    fn record(&self, _event: &McpAuditEvent) {}
}

/// In-memory sink for tests and embedding.
#[derive(Default)]
pub struct McpMemoryAuditSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<McpAuditEvent>>,
}

impl McpMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<McpAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the event identifiers recorded so far.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.event).collect()
    }
}

impl McpAuditSink for McpMemoryAuditSink {
    fn record(&self, event: &McpAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// Truncates an identity key for logging.
#[must_use]
pub fn redact_identity(identity: &str) -> String {
    let prefix: String = identity.chars().take(IDENTITY_PREFIX_CHARS).collect();
    format!("{prefix}...")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
