// crates/graph-gateway-mcp/src/identity.rs
// ============================================================================
// Module: Identity & Mode Resolution
// Description: Caller credential extraction and simulation gating.
// Purpose: Decide who is calling and whether a call may run for real.
// Dependencies: graph-gateway-config, serde_json
// ============================================================================

//! ## Overview
//! The bearer credential is read from the out-of-band `_meta.authorization`
//! field, never from tool arguments. The user identifier comes from the
//! `userId` argument. In a development posture missing values are replaced
//! by fixed placeholders; elsewhere they are caller-visible errors.
//!
//! Simulation requests (`_meta.test_mode`) never fall through to a real
//! upstream call: an unprivileged production caller is refused outright.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use graph_gateway_config::GatewayConfig;
use graph_gateway_config::RuntimePosture;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Credential substituted in development when none is supplied.
pub const PLACEHOLDER_API_KEY: &str = "dummy-test-key";
/// User identifier substituted in development when none is supplied.
pub const PLACEHOLDER_USER_ID: &str = "dummy-test-user";
/// Metadata field carrying the bearer credential.
const AUTHORIZATION_FIELD: &str = "authorization";
/// Metadata field carrying the simulation directive.
const TEST_MODE_FIELD: &str = "test_mode";
/// Argument carrying the user identifier.
const USER_ID_ARG: &str = "userId";
/// Bearer scheme prefix.
const BEARER_PREFIX: &str = "Bearer ";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Credential forwarded upstream as `X-API-Key`.
    pub api_key: String,
    /// User identifier forwarded upstream as `X-User-Id`.
    pub user_id: String,
}

/// Recognized simulation directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationDirective {
    /// Echo the proposed tool call back as a Gemini-style `tool_calls` list.
    GeminiEcho,
}

impl SimulationDirective {
    /// Wire value of the directive.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GeminiEcho => "gemini_echo",
        }
    }
}

/// Identity resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// No bearer credential outside development.
    #[error(
        "Error: No API Key provided. Please include a Bearer token in the 'authorization' field \
         of the MCP request _meta."
    )]
    MissingCredential,
    /// No user identifier outside development.
    #[error("Error: No userId provided. This field is required for tracking and billing.")]
    MissingUserId,
    /// Unrecognized simulation directive.
    #[error("Invalid test_mode '{0}'. Only 'gemini_echo' is supported.")]
    InvalidSimulation(String),
    /// Simulation requested in production without an internal credential.
    #[error("Error: Simulation mode not permitted in production without internal privileges.")]
    SimulationForbidden,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Posture-aware identity and simulation policy.
#[derive(Debug, Clone)]
pub struct IdentityPolicy {
    /// Deployment posture.
    posture: RuntimePosture,
    /// Credentials allowed to simulate in production.
    internal_test_keys: BTreeSet<String>,
}

impl IdentityPolicy {
    /// Builds a policy from explicit parts.
    #[must_use]
    pub fn new(posture: RuntimePosture, internal_test_keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            posture,
            internal_test_keys: internal_test_keys.into_iter().collect(),
        }
    }

    /// Builds a policy from gateway configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.posture, config.internal_test_keys.iter().cloned())
    }

    /// Resolves the caller credential and user identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when either value is missing outside development.
    pub fn resolve(
        &self,
        meta: Option<&Value>,
        arguments: &Map<String, Value>,
    ) -> Result<CallerIdentity, IdentityError> {
        let api_key = match bearer_token(meta) {
            Some(token) => token,
            None if self.posture.allows_placeholders() => PLACEHOLDER_API_KEY.to_string(),
            None => return Err(IdentityError::MissingCredential),
        };
        let user_id = match non_empty_str(arguments.get(USER_ID_ARG)) {
            Some(user) => user.to_string(),
            None if self.posture.allows_placeholders() => PLACEHOLDER_USER_ID.to_string(),
            None => return Err(IdentityError::MissingUserId),
        };
        Ok(CallerIdentity {
            api_key,
            user_id,
        })
    }

    /// Returns the accepted simulation directive, if the call requested one.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidSimulation`] for unknown directives and
    /// [`IdentityError::SimulationForbidden`] when the production guardrail refuses.
    pub fn simulation(
        &self,
        meta: Option<&Value>,
        identity: &CallerIdentity,
    ) -> Result<Option<SimulationDirective>, IdentityError> {
        let directive = match meta.and_then(|meta| meta.get(TEST_MODE_FIELD)) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(value)) if value == SimulationDirective::GeminiEcho.as_str() => {
                SimulationDirective::GeminiEcho
            }
            Some(Value::String(value)) => {
                return Err(IdentityError::InvalidSimulation(value.clone()));
            }
            Some(other) => return Err(IdentityError::InvalidSimulation(other.to_string())),
        };
        if self.posture.is_production() && !self.internal_test_keys.contains(&identity.api_key) {
            return Err(IdentityError::SimulationForbidden);
        }
        Ok(Some(directive))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the bearer token from `_meta.authorization`.
#[must_use]
pub fn bearer_token(meta: Option<&Value>) -> Option<String> {
    let header = meta?.get(AUTHORIZATION_FIELD)?.as_str()?;
    let token = header.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}

/// Returns a string value when present and non-blank.
pub(crate) fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|value| !value.trim().is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use graph_gateway_config::RuntimePosture;
    use serde_json::Map;
    use serde_json::Value;
    use serde_json::json;

    use super::CallerIdentity;
    use super::IdentityError;
    use super::IdentityPolicy;
    use super::PLACEHOLDER_API_KEY;
    use super::PLACEHOLDER_USER_ID;
    use super::SimulationDirective;
    use super::bearer_token;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn caller(key: &str) -> CallerIdentity {
        CallerIdentity {
            api_key: key.to_string(),
            user_id: "u-1".to_string(),
        }
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token(Some(&json!({"authorization": "Bearer abc"}))), Some("abc".into()));
        assert_eq!(bearer_token(Some(&json!({"authorization": "Basic abc"}))), None);
        assert_eq!(bearer_token(Some(&json!({"authorization": "Bearer   "}))), None);
        assert_eq!(bearer_token(Some(&json!({"authorization": 7}))), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn development_substitutes_placeholders() {
        let policy = IdentityPolicy::new(RuntimePosture::Development, Vec::new());
        let identity = policy.resolve(None, &Map::new()).unwrap();
        assert_eq!(identity.api_key, PLACEHOLDER_API_KEY);
        assert_eq!(identity.user_id, PLACEHOLDER_USER_ID);
    }

    #[test]
    fn standard_posture_rejects_missing_values_independently() {
        let policy = IdentityPolicy::new(RuntimePosture::Standard, Vec::new());
        assert_eq!(
            policy.resolve(None, &args(json!({"userId": "u"}))),
            Err(IdentityError::MissingCredential)
        );
        let meta = json!({"authorization": "Bearer k"});
        assert_eq!(
            policy.resolve(Some(&meta), &args(json!({"userId": ""}))),
            Err(IdentityError::MissingUserId)
        );
        let identity = policy.resolve(Some(&meta), &args(json!({"userId": "u"}))).unwrap();
        assert_eq!(identity.api_key, "k");
    }

    #[test]
    fn simulation_requires_exact_directive() {
        let policy = IdentityPolicy::new(RuntimePosture::Standard, Vec::new());
        assert_eq!(policy.simulation(None, &caller("k")), Ok(None));
        assert_eq!(policy.simulation(Some(&json!({"test_mode": null})), &caller("k")), Ok(None));
        assert_eq!(
            policy.simulation(Some(&json!({"test_mode": "gemini_echo"})), &caller("k")),
            Ok(Some(SimulationDirective::GeminiEcho))
        );
        assert_eq!(
            policy.simulation(Some(&json!({"test_mode": "GEMINI_ECHO"})), &caller("k")),
            Err(IdentityError::InvalidSimulation("GEMINI_ECHO".to_string()))
        );
        assert!(matches!(
            policy.simulation(Some(&json!({"test_mode": true})), &caller("k")),
            Err(IdentityError::InvalidSimulation(_))
        ));
    }

    #[test]
    fn production_guardrail_checks_internal_keys() {
        let policy =
            IdentityPolicy::new(RuntimePosture::Production, vec!["internal-1".to_string()]);
        let meta = json!({"test_mode": "gemini_echo"});
        assert_eq!(
            policy.simulation(Some(&meta), &caller("customer")),
            Err(IdentityError::SimulationForbidden)
        );
        assert_eq!(
            policy.simulation(Some(&meta), &caller("internal-1")),
            Ok(Some(SimulationDirective::GeminiEcho))
        );
    }
}
