// crates/graph-gateway-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared upstream fakes and router builders for gateway tests.
// Purpose: Observe upstream traffic without a network.
// Dependencies: graph-gateway-mcp, graph-gateway-config
// ============================================================================

//! ## Overview
//! [`RecordingApi`] answers every request with a fixed reply and records what
//! it was sent, so tests can assert both the forwarded request and that no
//! request was made at all.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use graph_gateway_config::RuntimePosture;
use graph_gateway_core::SigningSecret;
use graph_gateway_mcp::GraphApi;
use graph_gateway_mcp::IdentityPolicy;
use graph_gateway_mcp::McpAuditSink;
use graph_gateway_mcp::OutboundRequest;
use graph_gateway_mcp::ToolCall;
use graph_gateway_mcp::ToolRouter;
use graph_gateway_mcp::UpstreamError;
use graph_gateway_mcp::UpstreamResponse;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Upstream Fake
// ============================================================================

/// Upstream fake that records requests and replays one reply.
pub struct RecordingApi {
    /// Requests received so far.
    requests: Mutex<Vec<OutboundRequest>>,
    /// Reply returned for every request.
    reply: Result<UpstreamResponse, UpstreamError>,
}

impl RecordingApi {
    /// Creates a fake answering 200 with `body`.
    pub fn ok(body: Value) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            reply: Ok(UpstreamResponse {
                status: 200,
                body,
            }),
        })
    }

    /// Creates a fake failing every request with `error`.
    pub fn failing(error: UpstreamError) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            reply: Err(error),
        })
    }

    /// Returns the recorded requests.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Returns how many requests were sent.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Decodes the body of the only recorded request.
    pub fn single_body(&self) -> Value {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one upstream request");
        serde_json::from_slice(requests[0].body.as_deref().unwrap()).unwrap()
    }
}

#[async_trait]
impl GraphApi for RecordingApi {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().unwrap().push(request);
        self.reply.clone()
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Creates a router over the fake with a fixed signing secret.
pub fn router(
    posture: RuntimePosture,
    internal_keys: &[&str],
    api: Arc<RecordingApi>,
    audit: Arc<dyn McpAuditSink>,
) -> ToolRouter {
    ToolRouter::new(
        api,
        IdentityPolicy::new(posture, internal_keys.iter().map(ToString::to_string)),
        Some(SigningSecret::new("router-secret").unwrap()),
        audit,
    )
}

/// Builds a tool call from JSON arguments.
pub fn call(name: &str, arguments: Value, meta: Option<Value>) -> ToolCall {
    ToolCall {
        name: name.to_string(),
        arguments: arguments.as_object().cloned().unwrap_or_default(),
        meta,
    }
}

/// Builds `_meta` carrying a bearer credential.
pub fn bearer(key: &str) -> Value {
    json!({ "authorization": format!("Bearer {key}") })
}

/// Builds `_meta` requesting the simulation echo.
pub fn simulating(key: &str) -> Value {
    json!({ "authorization": format!("Bearer {key}"), "test_mode": "gemini_echo" })
}
