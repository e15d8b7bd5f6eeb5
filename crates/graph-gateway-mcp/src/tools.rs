// crates/graph-gateway-mcp/src/tools.rs
// ============================================================================
// Module: Tool Router
// Description: Per-call decision pipeline for gateway tools.
// Purpose: Validate, authenticate, gate, forward, and audit tool calls.
// Dependencies: graph-gateway-core, graph-gateway-config, serde_json
// ============================================================================

//! ## Overview
//! [`ToolRouter::call_tool`] runs the pipeline in a fixed order:
//! tool lookup and `graphId` check (no side effects), identity resolution,
//! simulation gating, dispatch, signing, the upstream call, and audit.
//! Validation failures surface as protocol errors; every other failure is a
//! caller-visible tool error and is never retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use graph_gateway_config::GatewayConfig;
use graph_gateway_core::SigningSecret;
use graph_gateway_core::ToolDescriptor;
use graph_gateway_core::ToolName;
use graph_gateway_core::descriptor;
use graph_gateway_core::tool_catalog;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::audit::AuditDetail;
use crate::audit::McpAuditEvent;
use crate::audit::McpAuditSink;
use crate::audit::SimulationAudit;
use crate::audit::ToolCallAudit;
use crate::audit::ToolErrorAudit;
use crate::audit::unix_millis;
use crate::dispatch::route;
use crate::identity::CallerIdentity;
use crate::identity::IdentityError;
use crate::identity::IdentityPolicy;
use crate::identity::SimulationDirective;
use crate::identity::non_empty_str;
use crate::upstream::GraphApi;
use crate::upstream::sign_call;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Argument naming the target graph.
const GRAPH_ID_ARG: &str = "graphId";
/// Layer label stamped on success records.
const AUDIT_LAYER: &str = "mcp_proxy";
/// Status recorded when a call fails before reaching the upstream.
const LOCAL_VALIDATION_STATUS: u16 = 400;
/// Status recorded for local failures other than validation.
const LOCAL_FAILURE_STATUS: u16 = 500;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Parsed `tools/call` request.
#[derive(Debug, Clone, Default)]
pub struct ToolCall {
    /// Requested tool name.
    pub name: String,
    /// Tool arguments.
    pub arguments: Map<String, Value>,
    /// Out-of-band metadata (`_meta`).
    pub meta: Option<Value>,
}

/// Tool call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Caller supplied invalid arguments or directives.
    #[error("{0}")]
    Validation(String),
    /// Missing credential or user identifier.
    #[error("{0}")]
    Unauthenticated(String),
    /// Caller lacks the privilege for the requested mode.
    #[error("{0}")]
    Forbidden(String),
    /// Upstream failure.
    #[error("Error calling graph API: {message}")]
    Upstream {
        /// Upstream or generic status.
        status: u16,
        /// Best-effort message.
        message: String,
    },
    /// Deployment defect discovered while serving the call.
    #[error("Error: server misconfiguration: {0}")]
    Configuration(String),
    /// Result serialization failed.
    #[error("Error: failed to serialize tool result")]
    Serialization,
}

impl ToolError {
    /// Returns true when the failure is reported as a protocol-level error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<IdentityError> for ToolError {
    fn from(error: IdentityError) -> Self {
        let message = error.to_string();
        match error {
            IdentityError::MissingCredential | IdentityError::MissingUserId => {
                Self::Unauthenticated(message)
            }
            IdentityError::InvalidSimulation(_) => Self::Validation(message),
            IdentityError::SimulationForbidden => Self::Forbidden(message),
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Tool router shared by every transport.
#[derive(Clone)]
pub struct ToolRouter {
    /// Shared router state.
    inner: Arc<ToolRouterInner>,
}

/// Router internals.
struct ToolRouterInner {
    /// Upstream graph API.
    api: Arc<dyn GraphApi>,
    /// Identity and simulation policy.
    identity: IdentityPolicy,
    /// Outbound signing secret.
    secret: Option<SigningSecret>,
    /// Audit sink.
    audit: Arc<dyn McpAuditSink>,
}

/// Per-call audit context.
struct CallContext {
    /// Tool invoked.
    tool: ToolName,
    /// Graph identifier when supplied.
    graph_id: Option<String>,
    /// Resolved user identifier.
    user_id: String,
    /// Call start.
    started: Instant,
}

impl CallContext {
    /// Milliseconds since the call started.
    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl ToolRouter {
    /// Creates a router from explicit parts.
    #[must_use]
    pub fn new(
        api: Arc<dyn GraphApi>,
        identity: IdentityPolicy,
        secret: Option<SigningSecret>,
        audit: Arc<dyn McpAuditSink>,
    ) -> Self {
        Self {
            inner: Arc::new(ToolRouterInner {
                api,
                identity,
                secret,
                audit,
            }),
        }
    }

    /// Creates a router from configuration.
    #[must_use]
    pub fn from_config(
        config: &GatewayConfig,
        api: Arc<dyn GraphApi>,
        audit: Arc<dyn McpAuditSink>,
    ) -> Self {
        Self::new(api, IdentityPolicy::from_config(config), config.signing_secret.clone(), audit)
    }

    /// Returns the tool catalog.
    #[must_use]
    pub fn list_tools(&self) -> &'static [ToolDescriptor] {
        tool_catalog()
    }

    /// Runs one tool call and returns the text payload for the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for validation, identity, simulation, and
    /// upstream failures.
    pub async fn call_tool(&self, call: ToolCall) -> Result<String, ToolError> {
        let tool = ToolName::parse(&call.name)
            .ok_or_else(|| ToolError::Validation(format!("Unknown tool: {}", call.name)))?;
        let graph_id = non_empty_str(call.arguments.get(GRAPH_ID_ARG)).map(str::to_string);
        if tool.requires_graph_id() && graph_id.is_none() {
            return Err(ToolError::Validation(
                "graphId is required for all tools except psfk_overview.".to_string(),
            ));
        }

        let inner = &self.inner;
        let identity = inner.identity.resolve(call.meta.as_ref(), &call.arguments)?;
        let context = CallContext {
            tool,
            graph_id,
            user_id: identity.user_id.clone(),
            started: Instant::now(),
        };

        if let Some(directive) = inner.identity.simulation(call.meta.as_ref(), &identity)? {
            return self.simulate(&context, directive, &call);
        }

        let result = self.forward(&context, &identity, &call.arguments).await;
        if let Err(error) = &result {
            let status = match error {
                ToolError::Upstream {
                    status, ..
                } => *status,
                ToolError::Validation(_) => LOCAL_VALIDATION_STATUS,
                _ => LOCAL_FAILURE_STATUS,
            };
            let message = match error {
                ToolError::Upstream {
                    message, ..
                } => message.clone(),
                other => other.to_string(),
            };
            inner.audit.record(&McpAuditEvent::new(AuditDetail::ToolError(ToolErrorAudit {
                tool,
                graph_id: context.graph_id.clone(),
                user_id: context.user_id.clone(),
                status,
                duration_ms: context.elapsed_ms(),
                error: message,
            })));
        }
        result
    }

    /// Serves the simulation echo without contacting the upstream.
    fn simulate(
        &self,
        context: &CallContext,
        directive: SimulationDirective,
        call: &ToolCall,
    ) -> Result<String, ToolError> {
        self.inner.audit.record(&McpAuditEvent::new(AuditDetail::Simulation(SimulationAudit {
            tool: context.tool,
            graph_id: context.graph_id.clone(),
            user_id: context.user_id.clone(),
            simulation_mode: true,
            simulation_type: directive.as_str(),
        })));
        let echo = json!({
            "tool_calls": [{
                "name": context.tool.as_str(),
                "arguments": Value::Object(call.arguments.clone()),
            }]
        });
        serde_json::to_string_pretty(&echo).map_err(|_| ToolError::Serialization)
    }

    /// Dispatches, signs, and sends the upstream call.
    async fn forward(
        &self,
        context: &CallContext,
        identity: &CallerIdentity,
        arguments: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        let inner = &self.inner;
        let route = route(context.tool).ok_or_else(|| {
            ToolError::Configuration(format!("no route registered for {}", context.tool))
        })?;
        let call = route.build(arguments).map_err(|err| ToolError::Validation(err.to_string()))?;
        let request =
            sign_call(call, identity, inner.secret.as_ref(), unix_millis().to_string())
                .map_err(|err| ToolError::Configuration(err.to_string()))?;
        let response = inner.api.send(request).await.map_err(|err| ToolError::Upstream {
            status: err.status(),
            message: err.to_string(),
        })?;

        let deterministic = descriptor(context.tool).is_some_and(|entry| entry.is_deterministic);
        inner.audit.record(&McpAuditEvent::new(AuditDetail::ToolCall(ToolCallAudit {
            tool: context.tool,
            graph_id: context.graph_id.clone(),
            user_id: context.user_id.clone(),
            status: response.status,
            duration_ms: context.elapsed_ms(),
            billable_units: response.billable_units(),
            deterministic,
            layer: AUDIT_LAYER,
        })));
        serde_json::to_string_pretty(&response.body).map_err(|_| ToolError::Serialization)
    }
}
