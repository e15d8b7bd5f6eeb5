// crates/graph-gateway-mcp/tests/http_transport.rs
// ============================================================================
// Module: HTTP Transport Tests
// Description: Loopback tests for the HTTP, SSE, and discovery endpoints.
// Purpose: Validate middleware order, session routing, and shutdown.
// Dependencies: graph-gateway-mcp, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! Each test binds a stub upstream and a gateway on `127.0.0.1:0` and drives
//! them with reqwest. The stub upstream is a small axum app so forwarded
//! bodies and headers cross a real socket.
//!
//! Security posture: protected routes must fail closed without a signature
//! or a configured secret, and rate limiting must reject before any handler.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::use_debug,
    reason = "Test-only fixtures use unwraps for clarity."
)]

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::Path;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use graph_gateway_config::GatewayConfig;
use graph_gateway_config::RateLimitConfig;
use graph_gateway_config::RuntimePosture;
use graph_gateway_config::ServerConfig;
use graph_gateway_core::SigningSecret;
use graph_gateway_core::sign_payload;
use graph_gateway_mcp::HttpGraphApi;
use graph_gateway_mcp::McpMemoryAuditSink;
use graph_gateway_mcp::McpServer;
use graph_gateway_mcp::McpServerError;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const SECRET: &str = "loopback-secret";
const TIMESTAMP: &str = "1700000000000";

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Running gateway under test.
struct Gateway {
    /// Base URL of the gateway.
    base: String,
    /// Audit records captured by the gateway.
    audit: Arc<McpMemoryAuditSink>,
    /// Triggers graceful shutdown.
    stop: oneshot::Sender<()>,
    /// Server task.
    handle: JoinHandle<Result<(), McpServerError>>,
}

impl Gateway {
    /// Binds and serves a gateway against `upstream`.
    async fn start(config: GatewayConfig, upstream: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let audit = Arc::new(McpMemoryAuditSink::new());
        let api = Arc::new(HttpGraphApi::new(upstream).unwrap());
        let server = McpServer::with_parts(config, api, audit.clone());
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_listener(listener, async move {
            let _ = stopped.await;
        }));
        Self {
            base,
            audit,
            stop,
            handle,
        }
    }

    /// Joins `path` onto the base URL.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Triggers shutdown and returns the server outcome.
    async fn shutdown(self) -> Result<(), McpServerError> {
        let _ = self.stop.send(());
        tokio::time::timeout(Duration::from_secs(10), self.handle).await.unwrap().unwrap()
    }
}

/// Development config with an optional signing secret.
fn config(secret: Option<&str>) -> GatewayConfig {
    GatewayConfig {
        posture: RuntimePosture::Development,
        signing_secret: secret.map(|value| SigningSecret::new(value).unwrap()),
        server: ServerConfig {
            port: Some(0),
            shutdown_grace_ms: 2_000,
            ..ServerConfig::default()
        },
        ..GatewayConfig::default()
    }
}

/// Serves a stub upstream graph API, delaying overview answers by `delay`.
async fn spawn_upstream(delay: Duration) -> String {
    let app = axum::Router::new()
        .route(
            "/v1/psfk/overview",
            post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
                tokio::time::sleep(delay).await;
                let api_key = headers
                    .get("x-api-key")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "received": body,
                    "apiKey": api_key,
                    "usage": { "total_billable_units": 2 },
                }))
            }),
        )
        .route(
            "/v1/graphs/{graph_id}/nodes/{node_id}",
            get(|Path((graph_id, node_id)): Path<(String, String)>| async move {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "message": format!("Node {node_id} not found in {graph_id}") })),
                )
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// Signs `body` with the shared test secret and timestamp.
fn signature_for(body: &[u8]) -> String {
    sign_payload(&SigningSecret::new(SECRET).unwrap(), Some(TIMESTAMP), body).unwrap()
}

/// Posts a signed JSON body.
async fn signed_post(client: &reqwest::Client, url: &str, body: &Value) -> reqwest::Response {
    let bytes = serde_json::to_vec(body).unwrap();
    client
        .post(url)
        .header("content-type", "application/json")
        .header("x-fodda-timestamp", TIMESTAMP)
        .header("x-fodda-signature", signature_for(&bytes))
        .body(bytes)
        .send()
        .await
        .unwrap()
}

/// Opens a signed SSE stream.
async fn open_stream(client: &reqwest::Client, url: &str) -> reqwest::Response {
    let response = client
        .get(url)
        .header("x-fodda-timestamp", TIMESTAMP)
        .header("x-fodda-signature", signature_for(b""))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
}

/// Reads the next named SSE event, skipping keep-alive comments.
async fn next_event(response: &mut reqwest::Response, buffer: &mut String) -> Option<(String, String)> {
    loop {
        if let Some(end) = buffer.find("\n\n") {
            let block: String = buffer.drain(.. end + 2).collect();
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim_start());
                }
            }
            if event.is_none() && data.is_empty() {
                continue;
            }
            return Some((event.unwrap_or_else(|| "message".to_string()), data));
        }
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("sse read timed out")
            .ok()??;
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
}

/// Builds a JSON-RPC request.
fn rpc(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

// ============================================================================
// SECTION: Public Endpoints
// ============================================================================

#[tokio::test]
async fn public_endpoints_need_no_signature() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let gateway = Gateway::start(config(None), &upstream).await;
    let client = reqwest::Client::new();

    let health: Value = client.get(gateway.url("/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let tools: Value =
        client.get(gateway.url("/mcp/tools")).send().await.unwrap().json().await.unwrap();
    assert_eq!(tools["count"], 6);
    assert_eq!(tools["tools"].as_array().unwrap().len(), 6);

    let descriptor: Value = client
        .get(gateway.url("/.well-known/mcp.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(descriptor["transport"]["type"], "sse");
    assert_eq!(descriptor["transport"]["url"], gateway.url("/sse"));
    assert_eq!(descriptor["health_endpoint"], gateway.url("/health"));

    gateway.shutdown().await.unwrap();
}

// ============================================================================
// SECTION: Protected Endpoints
// ============================================================================

#[tokio::test]
async fn rpc_requires_a_valid_signature() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let gateway = Gateway::start(config(Some(SECRET)), &upstream).await;
    let client = reqwest::Client::new();
    let body = rpc(1, "tools/list", json!({}));

    let unsigned = client.post(gateway.url("/rpc")).json(&body).send().await.unwrap();
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);
    let error: Value = unsigned.json().await.unwrap();
    assert_eq!(error["error"], "Missing or invalid signature");

    let forged = client
        .post(gateway.url("/rpc"))
        .header("x-fodda-signature", "00".repeat(32))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    let error: Value = forged.json().await.unwrap();
    assert_eq!(error["error"], "Invalid signature");

    let signed = signed_post(&client, &gateway.url("/rpc"), &body).await;
    assert_eq!(signed.status(), StatusCode::OK);
    assert!(signed.headers().contains_key("x-ratelimit-remaining"));
    let response: Value = signed.json().await.unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 6);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_secret_fails_closed() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let gateway = Gateway::start(config(None), &upstream).await;
    let client = reqwest::Client::new();

    let response = signed_post(&client, &gateway.url("/rpc"), &rpc(1, "ping", json!({}))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Server misconfiguration");

    let records: Vec<Value> =
        gateway.audit.events().iter().map(|event| serde_json::to_value(event).unwrap()).collect();
    assert!(records.iter().any(|record| record["event"] == "mcp.server" && record["severity"] == "critical"));
    assert!(records.iter().any(|record| record["event"] == "mcp.server" && record["severity"] == "warning"));

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn oversize_bodies_are_rejected_first() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let mut gateway_config = config(Some(SECRET));
    gateway_config.server.max_body_bytes = 256;
    let gateway = Gateway::start(gateway_config, &upstream).await;
    let client = reqwest::Client::new();

    let response = client.post(gateway.url("/rpc")).body(vec![b'a'; 4096]).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn rate_limit_rejects_after_budget() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let gateway_config = GatewayConfig {
        rate_limit: RateLimitConfig {
            max_requests: 2,
            ..RateLimitConfig::default()
        },
        ..config(Some(SECRET))
    };
    let gateway = Gateway::start(gateway_config, &upstream).await;
    let client = reqwest::Client::new();
    let body = rpc(1, "ping", json!({}));

    for _ in 0 .. 2 {
        let response = signed_post(&client, &gateway.url("/rpc"), &body).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let rejected = signed_post(&client, &gateway.url("/rpc"), &body).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(rejected.headers().contains_key("retry-after"));
    assert_eq!(rejected.headers()["x-ratelimit-limit"], "2");
    assert_eq!(rejected.headers()["x-ratelimit-remaining"], "0");
    let payload: Value = rejected.json().await.unwrap();
    assert_eq!(payload["error"], "Rate limit exceeded");
    assert_eq!(payload["window"], "60s");

    let health = client.get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert!(gateway.audit.event_names().contains(&"mcp.rate_limit"));

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn tool_calls_cross_the_wire() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let gateway = Gateway::start(config(Some(SECRET)), &upstream).await;
    let client = reqwest::Client::new();

    let overview = rpc(
        1,
        "tools/call",
        json!({
            "name": "psfk_overview",
            "arguments": { "industry": "Retail", "region": "EMEA" },
            "_meta": { "authorization": "Bearer live-key" },
        }),
    );
    let response: Value =
        signed_post(&client, &gateway.url("/rpc"), &overview).await.json().await.unwrap();
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    let upstream_body: Value = serde_json::from_str(text).unwrap();
    assert_eq!(upstream_body["received"], json!({ "industry": "Retail", "region": "EMEA" }));
    assert_eq!(upstream_body["apiKey"], "live-key");
    assert!(response["result"].get("isError").is_none());

    let missing = rpc(
        2,
        "tools/call",
        json!({ "name": "get_node", "arguments": { "graphId": "retail", "nodeId": "ghost" } }),
    );
    let response: Value =
        signed_post(&client, &gateway.url("/rpc"), &missing).await.json().await.unwrap();
    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Error calling graph API: Node ghost not found in retail"
    );

    let invalid = rpc(3, "tools/call", json!({ "name": "get_node", "arguments": {} }));
    let response: Value =
        signed_post(&client, &gateway.url("/rpc"), &invalid).await.json().await.unwrap();
    assert_eq!(response["error"]["code"], -32602);

    gateway.shutdown().await.unwrap();
}

// ============================================================================
// SECTION: Sessions
// ============================================================================

#[tokio::test]
async fn sse_sessions_receive_routed_messages() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let gateway = Gateway::start(config(Some(SECRET)), &upstream).await;
    let client = reqwest::Client::new();

    let mut first = open_stream(&client, &gateway.url("/sse")).await;
    let mut first_buffer = String::new();
    let (event, endpoint) = next_event(&mut first, &mut first_buffer).await.unwrap();
    assert_eq!(event, "endpoint");
    assert!(endpoint.starts_with("/messages?sessionId="));

    let accepted = signed_post(&client, &gateway.url("/messages"), &rpc(7, "ping", json!({}))).await;
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    let (event, data) = next_event(&mut first, &mut first_buffer).await.unwrap();
    assert_eq!(event, "message");
    let message: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(message["id"], 7);

    let mut second = open_stream(&client, &gateway.url("/sse")).await;
    let mut second_buffer = String::new();
    let (_, second_endpoint) = next_event(&mut second, &mut second_buffer).await.unwrap();

    let ambiguous = signed_post(&client, &gateway.url("/messages"), &rpc(8, "ping", json!({}))).await;
    assert_eq!(ambiguous.status(), StatusCode::BAD_REQUEST);
    let error: Value = ambiguous.json().await.unwrap();
    assert_eq!(error["error"], "Multiple SSE sessions active. Specify sessionId query parameter.");

    let routed = signed_post(&client, &gateway.url(&second_endpoint), &rpc(9, "ping", json!({}))).await;
    assert_eq!(routed.status(), StatusCode::ACCEPTED);
    let (_, data) = next_event(&mut second, &mut second_buffer).await.unwrap();
    let message: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(message["id"], 9);

    let unknown =
        signed_post(&client, &gateway.url("/messages?sessionId=feedface"), &rpc(10, "ping", json!({})))
            .await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    gateway.shutdown().await.unwrap();
    assert!(next_event(&mut first, &mut first_buffer).await.is_none());
    assert!(next_event(&mut second, &mut second_buffer).await.is_none());
}

#[tokio::test]
async fn message_posts_are_accepted_before_the_upstream_answers() {
    let upstream = spawn_upstream(Duration::from_millis(1_500)).await;
    let gateway = Gateway::start(config(Some(SECRET)), &upstream).await;
    let client = reqwest::Client::new();

    let mut stream = open_stream(&client, &gateway.url("/sse")).await;
    let mut buffer = String::new();
    let (_, endpoint) = next_event(&mut stream, &mut buffer).await.unwrap();

    let body = rpc(
        3,
        "tools/call",
        json!({ "name": "psfk_overview", "arguments": { "industry": "Retail" } }),
    );
    let started = tokio::time::Instant::now();
    let accepted = signed_post(&client, &gateway.url(&endpoint), &body).await;
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    assert!(started.elapsed() < Duration::from_millis(1_000), "post waited for the upstream");

    let (event, data) = next_event(&mut stream, &mut buffer).await.unwrap();
    assert_eq!(event, "message");
    let message: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(message["id"], 3);
    assert!(started.elapsed() >= Duration::from_millis(1_500));

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn messages_without_sessions_are_rejected() {
    let upstream = spawn_upstream(Duration::ZERO).await;
    let gateway = Gateway::start(config(Some(SECRET)), &upstream).await;
    let client = reqwest::Client::new();

    let response = signed_post(&client, &gateway.url("/messages"), &rpc(1, "ping", json!({}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    gateway.shutdown().await.unwrap();
}

// ============================================================================
// SECTION: Shutdown
// ============================================================================

#[tokio::test]
async fn shutdown_times_out_when_requests_do_not_drain() {
    let upstream = spawn_upstream(Duration::from_secs(30)).await;
    let mut gateway_config = config(Some(SECRET));
    gateway_config.server.shutdown_grace_ms = 200;
    let gateway = Gateway::start(gateway_config, &upstream).await;
    let client = reqwest::Client::new();

    let url = gateway.url("/rpc");
    let slow = tokio::spawn(async move {
        let body = rpc(
            1,
            "tools/call",
            json!({ "name": "psfk_overview", "arguments": { "sector": "Beauty" } }),
        );
        let _ = signed_post(&client, &url, &body).await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let outcome = gateway.shutdown().await;
    assert!(matches!(outcome, Err(McpServerError::ShutdownTimeout)), "{outcome:?}");
    slow.abort();
}
