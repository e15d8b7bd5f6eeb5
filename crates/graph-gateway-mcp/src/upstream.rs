// crates/graph-gateway-mcp/src/upstream.rs
// ============================================================================
// Module: Upstream Graph API Client
// Description: Signed outbound requests to the knowledge-graph API.
// Purpose: Isolate network access behind a trait the pipeline can fake.
// Dependencies: graph-gateway-core, reqwest, async-trait
// ============================================================================

//! ## Overview
//! [`sign_call`] turns a dispatched [`UpstreamCall`] into an
//! [`OutboundRequest`] carrying identity headers, a millisecond timestamp,
//! canonical body bytes, and (when a secret is configured) a signature. The
//! [`GraphApi`] trait sends it; [`HttpGraphApi`] is the reqwest
//! implementation. No retries are attempted and no timeout is imposed beyond
//! the HTTP client's own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use graph_gateway_core::SigningError;
use graph_gateway_core::SigningSecret;
use graph_gateway_core::signing::canonical_json_bytes;
use graph_gateway_core::signing::sign_path;
use graph_gateway_core::signing::sign_json;
use serde_json::Value;
use thiserror::Error;

use crate::dispatch::CallMethod;
use crate::dispatch::UpstreamCall;
use crate::identity::CallerIdentity;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Outbound credential header.
pub const API_KEY_HEADER: &str = "X-API-Key";
/// Outbound user attribution header.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Outbound and inbound timestamp header.
pub const TIMESTAMP_HEADER: &str = "X-Fodda-Timestamp";
/// Outbound and inbound signature header.
pub const SIGNATURE_HEADER: &str = "X-Fodda-Signature";
/// Status reported when the upstream returned no response.
const GENERIC_FAILURE_STATUS: u16 = 500;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Fully prepared upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Method shape.
    pub method: CallMethod,
    /// Percent-encoded path beginning with `/`.
    pub path: String,
    /// Credential for `X-API-Key`.
    pub api_key: String,
    /// User identifier for `X-User-Id`.
    pub user_id: String,
    /// Milliseconds since epoch for `X-Fodda-Timestamp`.
    pub timestamp: String,
    /// Signature for `X-Fodda-Signature` when a secret is configured.
    pub signature: Option<String>,
    /// Canonical JSON body bytes for submissions.
    pub body: Option<Vec<u8>>,
}

/// Successful upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body (non-JSON bodies become a string value).
    pub body: Value,
}

impl UpstreamResponse {
    /// Returns `usage.total_billable_units`, or zero when absent.
    #[must_use]
    pub fn billable_units(&self) -> Value {
        self.body
            .get("usage")
            .and_then(|usage| usage.get("total_billable_units"))
            .filter(|units| !units.is_null())
            .cloned()
            .unwrap_or_else(|| Value::from(0))
    }
}

/// Upstream failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-success status.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Upstream `message` field or a generic description.
        message: String,
    },
    /// The request never produced a response.
    #[error("{0}")]
    Transport(String),
}

impl UpstreamError {
    /// Status to report in audit records.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Status {
                status, ..
            } => *status,
            Self::Transport(_) => GENERIC_FAILURE_STATUS,
        }
    }
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Prepares a dispatched call for sending.
///
/// Submission bodies are serialized once with canonical JSON; the signature
/// covers `timestamp.body` for submissions and `timestamp.path` for reads.
///
/// # Errors
///
/// Returns [`SigningError`] when canonicalization or keying fails.
pub fn sign_call(
    call: UpstreamCall,
    identity: &CallerIdentity,
    secret: Option<&SigningSecret>,
    timestamp: String,
) -> Result<OutboundRequest, SigningError> {
    let (body, signature) = match (secret, call.method, call.body.as_ref()) {
        (Some(secret), CallMethod::Submit, Some(body)) => {
            let signed = sign_json(secret, &timestamp, body)?;
            (Some(signed.bytes), Some(signed.signature))
        }
        (secret, _, body) => {
            let bytes = body.map(canonical_json_bytes).transpose()?;
            let signature =
                secret.map(|secret| sign_path(secret, &timestamp, &call.path)).transpose()?;
            (bytes, signature)
        }
    };
    Ok(OutboundRequest {
        method: call.method,
        path: call.path,
        api_key: identity.api_key.clone(),
        user_id: identity.user_id.clone(),
        timestamp,
        signature,
        body,
    })
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Upstream graph API.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Sends a prepared request.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] for non-success statuses and transport failures.
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, UpstreamError>;
}

// ============================================================================
// SECTION: HTTP Client
// ============================================================================

/// reqwest-backed upstream client.
#[derive(Debug, Clone)]
pub struct HttpGraphApi {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Base URL without a trailing slash.
    base_url: String,
}

impl HttpGraphApi {
    /// Creates a client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] when the URL or client is invalid.
    pub fn new(base_url: &str) -> Result<Self, UpstreamError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|err| UpstreamError::Transport(format!("invalid upstream url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UpstreamError::Transport("upstream url must be http(s)".to_string()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| UpstreamError::Transport(format!("http client init failed: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GraphApi for HttpGraphApi {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            CallMethod::Read => self.client.get(url),
            CallMethod::Submit => self.client.post(url),
        };
        builder = builder
            .header(API_KEY_HEADER, &request.api_key)
            .header(USER_ID_HEADER, &request.user_id)
            .header(TIMESTAMP_HEADER, &request.timestamp)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(signature) = &request.signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response =
            builder.send().await.map_err(|err| UpstreamError::Transport(err.to_string()))?;
        let success = response.status().is_success();
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|err| UpstreamError::Transport(err.to_string()))?;
        let body = decode_body(&bytes);
        if success {
            Ok(UpstreamResponse {
                status,
                body,
            })
        } else {
            Err(UpstreamError::Status {
                status,
                message: error_message(status, &body),
            })
        }
    }
}

/// Decodes a response body, keeping non-JSON payloads as text.
fn decode_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Extracts the upstream `message` field or falls back to a status description.
fn error_message(status: u16, body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map_or_else(|| format!("Request failed with status code {status}"), str::to_string)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
