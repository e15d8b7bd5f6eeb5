// crates/graph-gateway-mcp/src/protocol.rs
// ============================================================================
// Module: JSON-RPC Protocol
// Description: JSON-RPC 2.0 envelopes and MCP method handling.
// Purpose: Translate wire messages into tool router calls and back.
// Dependencies: graph-gateway-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Supports `initialize`, `ping`, `tools/list`, and `tools/call`. Messages
//! without an `id` are notifications and never produce a response. Tool
//! validation failures become JSON-RPC errors; other tool failures become a
//! normal result flagged with `isError`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use graph_gateway_core::SERVER_VERSION;
use graph_gateway_core::ToolDescriptor;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::tools::ToolCall;
use crate::tools::ToolError;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Server name advertised by `initialize`.
pub const SERVER_NAME: &str = "graph-gateway";
/// Protocol revisions the server speaks, newest first.
const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];
/// Invalid request.
pub const INVALID_REQUEST: i64 = -32600;
/// Method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid params.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error.
pub const INTERNAL_ERROR: i64 = -32603;

// ============================================================================
// SECTION: Envelopes
// ============================================================================

/// Incoming JSON-RPC request or notification.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    pub jsonrpc: String,
    /// Request identifier.
    pub id: Value,
    /// Successful result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Serializes the response, falling back to a fixed internal error.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{{\"code\":{INTERNAL_ERROR},\
                 \"message\":\"serialization failed\"}}}}"
            )
        })
    }
}

/// `tools/call` parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Tool arguments.
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
    /// Out-of-band metadata.
    #[serde(default, rename = "_meta")]
    meta: Option<Value>,
}

/// Tool list response payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Registered tool definitions.
    tools: &'static [ToolDescriptor],
}

/// Tool call response payload.
#[derive(Debug, Serialize)]
struct ToolCallResult {
    /// Tool output content.
    content: Vec<ToolContent>,
    /// Set when the call failed after validation.
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

/// Tool output payloads.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    /// Text payload carrying JSON or an error message.
    Text {
        /// Text body.
        text: String,
    },
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handles one raw JSON-RPC message.
///
/// Returns `None` for notifications.
pub async fn handle_message(router: &ToolRouter, bytes: &[u8]) -> Option<JsonRpcResponse> {
    let Ok(raw) = serde_json::from_slice::<Value>(bytes) else {
        return Some(JsonRpcResponse::failure(Value::Null, INVALID_REQUEST, "invalid json-rpc request"));
    };
    let request_id = raw.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(_) => {
            return Some(JsonRpcResponse::failure(
                request_id,
                INVALID_REQUEST,
                "invalid json-rpc request",
            ));
        }
    };
    let id = request.id?;
    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::failure(id, INVALID_REQUEST, "invalid json-rpc version"));
    }
    Some(handle_request(router, id, &request.method, request.params).await)
}

/// Echoes a supported client revision, otherwise offers the newest one.
fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|requested| {
            SUPPORTED_PROTOCOL_VERSIONS.iter().copied().find(|version| *version == requested)
        })
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

/// Dispatches a request that expects a response.
async fn handle_request(
    router: &ToolRouter,
    id: Value,
    method: &str,
    params: Option<Value>,
) -> JsonRpcResponse {
    match method {
        "initialize" => {
            let requested = params
                .as_ref()
                .and_then(|params| params.get("protocolVersion"))
                .and_then(Value::as_str);
            JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": negotiate_protocol_version(requested),
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                    "capabilities": { "tools": {} },
                }),
            )
        }
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => match serde_json::to_value(ToolListResult {
            tools: router.list_tools(),
        }) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(_) => JsonRpcResponse::failure(id, INTERNAL_ERROR, "serialization failed"),
        },
        "tools/call" => {
            let params = params.unwrap_or(Value::Null);
            let Ok(params) = serde_json::from_value::<ToolCallParams>(params) else {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, "invalid tool params");
            };
            let call = ToolCall {
                name: params.name,
                arguments: params.arguments.unwrap_or_default(),
                meta: params.meta,
            };
            tool_call_response(id, router.call_tool(call).await)
        }
        _ => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, "method not found"),
    }
}

/// Maps a tool outcome onto the response envelope.
fn tool_call_response(id: Value, outcome: Result<String, ToolError>) -> JsonRpcResponse {
    let (text, is_error) = match outcome {
        Ok(text) => (text, false),
        Err(error) if error.is_validation() => {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, error.to_string());
        }
        Err(error) => (error.to_string(), true),
    };
    let result = ToolCallResult {
        content: vec![ToolContent::Text {
            text,
        }],
        is_error,
    };
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(_) => JsonRpcResponse::failure(id, INTERNAL_ERROR, "serialization failed"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::sync::Arc;

    use async_trait::async_trait;
    use graph_gateway_config::RuntimePosture;
    use serde_json::Value;
    use serde_json::json;

    use super::INVALID_PARAMS;
    use super::INVALID_REQUEST;
    use super::METHOD_NOT_FOUND;
    use super::handle_message;
    use crate::audit::McpNoopAuditSink;
    use crate::identity::IdentityPolicy;
    use crate::tools::ToolRouter;
    use crate::upstream::GraphApi;
    use crate::upstream::OutboundRequest;
    use crate::upstream::UpstreamError;
    use crate::upstream::UpstreamResponse;

    struct Unreachable;

    #[async_trait]
    impl GraphApi for Unreachable {
        async fn send(&self, _request: OutboundRequest) -> Result<UpstreamResponse, UpstreamError> {
            Err(UpstreamError::Transport("connection refused".to_string()))
        }
    }

    fn router(posture: RuntimePosture) -> ToolRouter {
        ToolRouter::new(
            Arc::new(Unreachable),
            IdentityPolicy::new(posture, Vec::new()),
            None,
            Arc::new(McpNoopAuditSink),
        )
    }

    async fn call(router: &ToolRouter, message: Value) -> Value {
        let bytes = serde_json::to_vec(&message).unwrap();
        let response = handle_message(router, &bytes).await.expect("response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let message = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let bytes = serde_json::to_vec(&message).unwrap();
        assert!(handle_message(&router(RuntimePosture::Standard), &bytes).await.is_none());
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let response = call(
            &router(RuntimePosture::Standard),
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2025-03-26"}}),
        )
        .await;
        assert_eq!(response["result"]["serverInfo"]["name"], "graph-gateway");
        assert_eq!(response["result"]["serverInfo"]["version"], "1.1.0");
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
    }

    #[tokio::test]
    async fn initialize_offers_the_newest_revision_for_unknown_requests() {
        let router = router(RuntimePosture::Standard);
        for params in [json!({"protocolVersion": "1999-01-01"}), json!({"protocolVersion": 7}), json!({})] {
            let response = call(
                &router,
                json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": params}),
            )
            .await;
            assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
        }
    }


    #[tokio::test]
    async fn tools_list_returns_catalog() {
        let response = call(
            &router(RuntimePosture::Standard),
            json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}),
        )
        .await;
        assert_eq!(response["id"], "a");
        assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 6);
        assert_eq!(response["result"]["tools"][0]["name"], "search_graph");
    }

    #[tokio::test]
    async fn malformed_and_unknown_requests_are_rejected() {
        let router = router(RuntimePosture::Standard);
        let response = handle_message(&router, b"{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);

        let response = call(&router, json!({"jsonrpc": "1.0", "id": 2, "method": "ping"})).await;
        assert_eq!(response["error"]["code"], INVALID_REQUEST);

        let response = call(&router, json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"})).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        let response =
            call(&router, json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {}})).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn validation_errors_are_protocol_errors() {
        let response = call(
            &router(RuntimePosture::Development),
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "get_node", "arguments": {"nodeId": "n"}}}),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert!(response["error"]["message"].as_str().unwrap().contains("graphId"));
    }

    #[tokio::test]
    async fn auth_and_upstream_errors_are_tool_results() {
        let response = call(
            &router(RuntimePosture::Standard),
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"name": "get_node", "arguments": {"graphId": "g", "nodeId": "n", "userId": "u"}}}),
        )
        .await;
        assert_eq!(response["result"]["isError"], true);
        assert!(response["result"]["content"][0]["text"].as_str().unwrap().contains("No API Key"));

        let response = call(
            &router(RuntimePosture::Development),
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "get_node", "arguments": {"graphId": "g", "nodeId": "n"}}}),
        )
        .await;
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(
            response["result"]["content"][0]["text"],
            "Error calling graph API: connection refused"
        );
    }
}
