// crates/graph-gateway-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: stdio, one-shot HTTP, and SSE session transports.
// Purpose: Expose the gateway tool router over JSON-RPC 2.0.
// Dependencies: axum, tokio, tokio-stream, graph-gateway-config
// ============================================================================

//! ## Overview
//! Without a configured port the server speaks newline-delimited JSON-RPC on
//! stdin/stdout. With a port it binds an axum HTTP server exposing:
//! - public discovery routes (`/health`, `/mcp/tools`, `/.well-known/mcp.json`)
//! - protected routes (`/sse`, `/messages`, `/rpc`) behind a body-size limit,
//!   the rate limiter, and inbound signature verification, in that order.
//!
//! Shutdown closes every open session, stops the listener, and waits up to
//! the configured grace period for in-flight requests before giving up.
//!
//! Security posture: all inbound data is untrusted. Protected routes fail
//! closed when no signing secret is configured.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::HOST;
use axum::http::header::RETRY_AFTER;
use axum::middleware::Next;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::routing::get;
use axum::routing::post;
use graph_gateway_config::GatewayConfig;
use graph_gateway_config::ServerConfig;
use graph_gateway_core::SERVER_VERSION;
use graph_gateway_core::SigningSecret;
use graph_gateway_core::verify_payload;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use crate::audit::AuditDetail;
use crate::audit::McpAuditEvent;
use crate::audit::McpAuditSink;
use crate::audit::McpFileAuditSink;
use crate::audit::McpStderrAuditSink;
use crate::audit::RateLimitAudit;
use crate::audit::Severity;
use crate::audit::unix_millis;
use crate::protocol::INVALID_REQUEST;
use crate::protocol::JsonRpcResponse;
use crate::protocol::SERVER_NAME;
use crate::protocol::handle_message;
use crate::rate_limit::RateDecision;
use crate::rate_limit::RateLimiter;
use crate::rate_limit::request_identity;
use crate::sessions::SessionError;
use crate::sessions::SessionRegistry;
use crate::tools::ToolRouter;
use crate::upstream::GraphApi;
use crate::upstream::HttpGraphApi;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Session stream route.
pub const SSE_PATH: &str = "/sse";
/// Session follow-up message route.
pub const MESSAGES_PATH: &str = "/messages";
/// One-shot JSON-RPC route.
pub const RPC_PATH: &str = "/rpc";
/// Liveness route.
pub const HEALTH_PATH: &str = "/health";
/// Tool registry route.
pub const TOOLS_PATH: &str = "/mcp/tools";
/// Service descriptor route.
pub const DISCOVERY_PATH: &str = "/.well-known/mcp.json";
/// Inbound signature header.
const SIGNATURE_HEADER: &str = "x-fodda-signature";
/// Inbound timestamp header.
const TIMESTAMP_HEADER: &str = "x-fodda-timestamp";
/// Forwarded protocol header used to derive the public base URL.
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
/// Human-readable service title for discovery.
const SERVICE_TITLE: &str = "Graph Gateway";
/// Service description for discovery.
const SERVICE_DESCRIPTION: &str =
    "Knowledge-graph tools for agents: search, traverse, and summarize curated trend graphs.";
/// Lower bound on the rate-limit sweep period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Validated gateway configuration.
    config: GatewayConfig,
    /// Tool router shared by every transport.
    router: ToolRouter,
    /// Audit sink for server and transport events.
    audit: Arc<dyn McpAuditSink>,
}

impl McpServer {
    /// Builds a server from configuration with the HTTP upstream client.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when validation or initialization fails.
    pub fn from_config(config: GatewayConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let api = HttpGraphApi::new(&config.upstream_url)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        let audit: Arc<dyn McpAuditSink> = match &config.audit.path {
            Some(path) => Arc::new(McpFileAuditSink::new(path).map_err(|err| {
                McpServerError::Init(format!("audit log {}: {err}", path.display()))
            })?),
            None => Arc::new(McpStderrAuditSink),
        };
        Ok(Self::with_parts(config, Arc::new(api), audit))
    }

    /// Builds a server from explicit parts.
    #[must_use]
    pub fn with_parts(
        config: GatewayConfig,
        api: Arc<dyn GraphApi>,
        audit: Arc<dyn McpAuditSink>,
    ) -> Self {
        let router = ToolRouter::from_config(&config, api, Arc::clone(&audit));
        Self {
            config,
            router,
            audit,
        }
    }

    /// Serves requests using the configured transport until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the transport fails or shutdown does
    /// not drain within the grace period.
    pub async fn serve(self) -> Result<(), McpServerError> {
        let Some(port) = self.config.server.port else {
            self.audit
                .record(&McpAuditEvent::server(Severity::Info, "serving json-rpc over stdio"));
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            return serve_lines(
                &self.router,
                reader,
                tokio::io::stdout(),
                self.config.server.max_body_bytes,
            )
            .await;
        };
        let host = self.config.server.bind_host.clone();
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|err| McpServerError::Transport(format!("bind {host}:{port} failed: {err}")))?;
        self.serve_listener(listener, shutdown_signal()).await
    }

    /// Serves HTTP on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Transport`] when the server fails and
    /// [`McpServerError::ShutdownTimeout`] when draining exceeds the grace
    /// period.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), McpServerError> {
        let local = listener
            .local_addr()
            .map_err(|err| McpServerError::Transport(format!("listener address: {err}")))?;
        if self.config.missing_secret_for_network() {
            self.audit.record(&McpAuditEvent::server(
                Severity::Warning,
                "no signing secret configured; protected endpoints will answer 500",
            ));
        }
        let grace = self.config.server.shutdown_grace();
        let state = Arc::new(ServerState {
            sessions: SessionRegistry::new(
                self.config.server.single_session_fallback,
                Arc::clone(&self.audit),
            ),
            limiter: Arc::new(RateLimiter::new(self.config.rate_limit.clone())),
            secret: self.config.signing_secret.clone(),
            server: self.config.server.clone(),
            router: self.router,
            audit: Arc::clone(&self.audit),
        });
        let sweeper = spawn_sweeper(Arc::clone(&state.limiter));
        let app = build_app(Arc::clone(&state));
        self.audit.record(&McpAuditEvent::server(
            Severity::Info,
            format!("listening on {local} ({} posture)", self.config.posture.label()),
        ));

        let stopping = Arc::new(Notify::new());
        let graceful = {
            let sessions = Arc::clone(&state.sessions);
            let stopping = Arc::clone(&stopping);
            async move {
                shutdown.await;
                sessions.shutdown();
                stopping.notify_one();
            }
        };
        let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(graceful)
            .into_future();
        tokio::pin!(server);

        let outcome = tokio::select! {
            result = &mut server => result.map_err(|err| McpServerError::Transport(err.to_string())),
            () = stopping.notified() => match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result.map_err(|err| McpServerError::Transport(err.to_string())),
                Err(_) => Err(McpServerError::ShutdownTimeout),
            },
        };
        sweeper.abort();
        let (severity, message) = match &outcome {
            Ok(()) => (Severity::Info, "server stopped".to_string()),
            Err(err) => (Severity::Warning, format!("server stopped: {err}")),
        };
        self.audit.record(&McpAuditEvent::server(severity, message));
        outcome
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

/// Periodically drops expired rate-limit entries.
fn spawn_sweeper(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    let period = limiter.config().sweep_interval().max(MIN_SWEEP_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.sweep(now_ms());
        }
    })
}

/// Current time in milliseconds as `u64`.
fn now_ms() -> u64 {
    u64::try_from(unix_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves newline-delimited JSON-RPC until the reader is exhausted.
///
/// Lines longer than `max_line_bytes` are discarded and answered with an
/// invalid-request error; blank lines are skipped.
///
/// # Errors
///
/// Returns [`McpServerError::Transport`] on read or write failures.
pub async fn serve_lines<R, W>(
    router: &ToolRouter,
    mut reader: R,
    mut writer: W,
    max_line_bytes: usize,
) -> Result<(), McpServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let limit = u64::try_from(max_line_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = AsyncReadExt::take(&mut reader, limit)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|err| McpServerError::Transport(format!("stdio read failed: {err}")))?;
        if read == 0 {
            return Ok(());
        }
        let terminated = line.last() == Some(&b'\n');
        if terminated {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        if line.len() > max_line_bytes {
            if !terminated {
                discard_line(&mut reader).await?;
            }
            let response =
                JsonRpcResponse::failure(Value::Null, INVALID_REQUEST, "request too large");
            write_line(&mut writer, &response).await?;
            continue;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        if let Some(response) = handle_message(router, &line).await {
            write_line(&mut writer, &response).await?;
        }
    }
}

/// Consumes input through the next newline.
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<(), McpServerError> {
    loop {
        let (consumed, done) = {
            let buffer = reader
                .fill_buf()
                .await
                .map_err(|err| McpServerError::Transport(format!("stdio read failed: {err}")))?;
            match buffer.iter().position(|byte| *byte == b'\n') {
                Some(index) => (index + 1, true),
                None => (buffer.len(), buffer.is_empty()),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

/// Writes one response line and flushes.
async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<(), McpServerError> {
    let mut payload = response.to_json().into_bytes();
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|err| McpServerError::Transport(format!("stdio write failed: {err}")))?;
    writer
        .flush()
        .await
        .map_err(|err| McpServerError::Transport(format!("stdio write failed: {err}")))
}

// ============================================================================
// SECTION: HTTP Application
// ============================================================================

/// Shared state for HTTP handlers and middleware.
struct ServerState {
    /// Tool router for request dispatch.
    router: ToolRouter,
    /// Open SSE sessions.
    sessions: Arc<SessionRegistry>,
    /// Rate limiter for protected routes.
    limiter: Arc<RateLimiter>,
    /// Audit sink.
    audit: Arc<dyn McpAuditSink>,
    /// Inbound verification secret.
    secret: Option<SigningSecret>,
    /// Transport settings.
    server: ServerConfig,
}

/// Raw request bytes captured before any handler parses them.
#[derive(Clone)]
struct RawBody(Bytes);

/// Query parameters for follow-up messages.
#[derive(Debug, Deserialize)]
struct MessageQuery {
    /// Target session, when the caller correlates explicitly.
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Builds the axum application.
fn build_app(state: Arc<ServerState>) -> Router {
    let max_body_bytes = state.server.max_body_bytes;
    let protected = Router::new()
        .route(SSE_PATH, get(open_session))
        .route(MESSAGES_PATH, post(post_message))
        .route(RPC_PATH, post(handle_rpc))
        .layer(from_fn_with_state(Arc::clone(&state), verify_signature))
        .layer(from_fn_with_state(Arc::clone(&state), enforce_rate_limit))
        .layer(from_fn_with_state(Arc::clone(&state), buffer_body))
        .layer(DefaultBodyLimit::max(max_body_bytes));
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(TOOLS_PATH, get(list_tools))
        .route(DISCOVERY_PATH, get(discovery))
        .merge(protected)
        .with_state(state)
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Buffers the body up to the size limit and keeps the raw bytes for
/// signature verification.
async fn buffer_body(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, state.server.max_body_bytes).await else {
        return json_error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
    };
    let mut request = Request::from_parts(parts, Body::from(bytes.clone()));
    request.extensions_mut().insert(RawBody(bytes));
    next.run(request).await
}

/// Applies the per-identity fixed-window budget.
async fn enforce_rate_limit(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
    let identity = request_identity(request.headers(), peer, state.server.trust_forwarded_for);
    let decision = state.limiter.admit(&identity, now_ms());
    if !decision.allowed {
        state.audit.record(&McpAuditEvent::new(AuditDetail::RateLimit(RateLimitAudit::new(
            &identity,
            decision.count,
            decision.limit,
        ))));
        let retry_after = decision.retry_after_secs.unwrap_or_default();
        let body = json!({
            "error": "Rate limit exceeded",
            "limit": decision.limit,
            "window": state.limiter.window_label(),
            "retry_after": retry_after,
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        attach_rate_headers(response.headers_mut(), &decision);
        response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }
    let mut response = next.run(request).await;
    attach_rate_headers(response.headers_mut(), &decision);
    response
}

/// Writes the `X-RateLimit-*` headers.
fn attach_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_secs));
}

/// Verifies the inbound HMAC signature over the raw body.
async fn verify_signature(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.secret.as_ref() else {
        state.audit.record(&McpAuditEvent::server(
            Severity::Critical,
            "signing secret not configured; rejecting protected request",
        ));
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server misconfiguration");
    };
    let Some(signature) = header_str(request.headers(), SIGNATURE_HEADER) else {
        return json_error(StatusCode::UNAUTHORIZED, "Missing or invalid signature");
    };
    let timestamp = header_str(request.headers(), TIMESTAMP_HEADER);
    let raw = request.extensions().get::<RawBody>().map(|raw| raw.0.clone()).unwrap_or_default();
    if !verify_payload(secret, signature, timestamp, &raw) {
        return json_error(StatusCode::UNAUTHORIZED, "Invalid signature");
    }
    next.run(request).await
}

// ============================================================================
// SECTION: Protected Handlers
// ============================================================================

/// Opens an SSE session and streams its messages.
async fn open_session(State(state): State<Arc<ServerState>>) -> Response {
    let session = match state.sessions.open() {
        Ok(session) => session,
        Err(err) => return json_error(session_status(&err), &err.to_string()),
    };
    let endpoint = format!("{MESSAGES_PATH}?sessionId={}", session.id());
    let stream = tokio_stream::once(Event::default().event("endpoint").data(endpoint))
        .chain(session.map(|payload| Event::default().event("message").data(payload)))
        .map(Ok::<Event, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.server.keep_alive()))
        .into_response()
}

/// Routes a follow-up message to its session.
///
/// Routing errors are answered inline. The JSON-RPC work runs on a spawned
/// task whose response is pushed to the session stream.
async fn post_message(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let target = match state.sessions.resolve(query.session_id.as_deref()) {
        Ok(target) => target,
        Err(err) => return json_error(session_status(&err), &err.to_string()),
    };
    tokio::spawn(async move {
        let Some(response) = handle_message(&state.router, &body).await else {
            return;
        };
        if let Err(err) = state.sessions.deliver(&target, response.to_json()) {
            state.audit.record(&McpAuditEvent::server(
                Severity::Warning,
                format!("response for session {target} not delivered: {err}"),
            ));
        }
    });
    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Answers a JSON-RPC request directly.
async fn handle_rpc(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match handle_message(&state.router, &body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Maps session failures onto HTTP statuses.
const fn session_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::UnknownSession(_) | SessionError::NoSessions | SessionError::Ambiguous => {
            StatusCode::BAD_REQUEST
        }
        SessionError::ShuttingDown | SessionError::Backlogged => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Closed => StatusCode::GONE,
    }
}

// ============================================================================
// SECTION: Public Handlers
// ============================================================================

/// Liveness probe.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": SERVER_VERSION }))
}

/// Tool registry listing.
async fn list_tools(State(state): State<Arc<ServerState>>) -> Json<Value> {
    let tools = state.router.list_tools();
    Json(json!({ "tools": tools, "count": tools.len(), "version": SERVER_VERSION }))
}

/// Machine-readable service descriptor.
async fn discovery(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Json<Value> {
    let base = public_base_url(&state.server, &headers);
    Json(json!({
        "name": SERVER_NAME,
        "title": SERVICE_TITLE,
        "description": SERVICE_DESCRIPTION,
        "version": SERVER_VERSION,
        "transport": { "type": "sse", "url": format!("{base}{SSE_PATH}") },
        "tools_endpoint": format!("{base}{TOOLS_PATH}"),
        "health_endpoint": format!("{base}{HEALTH_PATH}"),
    }))
}

/// Returns the externally visible base URL without a trailing slash.
fn public_base_url(server: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(url) = &server.public_base_url {
        return url.trim_end_matches('/').to_string();
    }
    let proto = header_str(headers, FORWARDED_PROTO_HEADER)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| matches!(*value, "http" | "https"))
        .unwrap_or("http");
    let host = header_str(headers, HOST.as_str()).unwrap_or("localhost");
    format!("{proto}://{host}")
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns a trimmed, non-empty header value.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Builds a `{"error": message}` response.
fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
    /// In-flight work did not drain within the grace period.
    #[error("shutdown grace period elapsed before the server drained")]
    ShutdownTimeout,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
