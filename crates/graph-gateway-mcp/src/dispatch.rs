// crates/graph-gateway-mcp/src/dispatch.rs
// ============================================================================
// Module: Tool Dispatch Registry
// Description: Data-driven mapping from tools to upstream calls.
// Purpose: Build clamped, validated upstream requests without per-tool branches.
// Dependencies: graph-gateway-core, serde_json, url
// ============================================================================

//! ## Overview
//! Each tool is a [`ToolRoute`] record: an upstream method, a path template,
//! a list of body fields (copied, clamped, or flag-defaulted), and an
//! optional "at least one of" filter rule. Adding a tool is a data change to
//! [`ROUTES`].
//!
//! Numeric arguments are never forwarded raw: a value is accepted only when
//! it is a finite number (or numeric string) of at least one, truncated to an
//! integer and capped at the route maximum. Anything else yields the default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use graph_gateway_core::ToolName;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::identity::non_empty_str;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Upstream HTTP method shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMethod {
    /// Lookup by path (GET); the signature covers the path.
    Read,
    /// Query submission (POST); the signature covers the canonical body.
    Submit,
}

/// One path segment of a route template.
#[derive(Debug, Clone, Copy)]
pub enum Segment {
    /// Fixed text.
    Literal(&'static str),
    /// Required, percent-encoded string argument.
    Arg(&'static str),
}

/// Numeric clamp applied to a caller-supplied argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clamp {
    /// Value used when the caller omits or garbles the argument.
    pub default: u64,
    /// Upper bound for any accepted value.
    pub max: u64,
}

impl Clamp {
    /// Returns the effective value for a caller-supplied argument.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "The float is finite, at least one, and below the cap before the cast."
    )]
    pub fn apply(self, requested: Option<&Value>) -> u64 {
        let parsed = match requested {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(value) if value.is_finite() && value >= 1.0 => {
                if value >= self.max as f64 { self.max } else { value.trunc() as u64 }
            }
            _ => self.default,
        }
    }
}

/// How a body field is derived from the arguments.
#[derive(Debug, Clone, Copy)]
pub enum FieldRule {
    /// Copy the argument when present and non-null.
    Copy,
    /// Clamp a numeric argument.
    Clamped(Clamp),
    /// Boolean that is true unless the caller passed `false`.
    DefaultTrue,
}

/// One field of a submission body.
#[derive(Debug, Clone, Copy)]
pub struct BodyField {
    /// Argument and body key.
    pub name: &'static str,
    /// Derivation rule.
    pub rule: FieldRule,
}

/// Dispatch record for one tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolRoute {
    /// Tool served by this route.
    pub tool: ToolName,
    /// Upstream method shape.
    pub method: CallMethod,
    /// Path template.
    pub path: &'static [Segment],
    /// Submission body fields (empty for reads).
    pub body: &'static [BodyField],
    /// At least one of these arguments must be a non-empty string.
    pub requires_any_of: &'static [&'static str],
}

/// Upstream call produced by a route.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamCall {
    /// Method shape.
    pub method: CallMethod,
    /// Percent-encoded path beginning with `/`.
    pub path: String,
    /// Submission body for [`CallMethod::Submit`].
    pub body: Option<Map<String, Value>>,
}

/// Argument validation failures raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A required path argument is missing or blank.
    #[error("{argument} is required for {tool}.")]
    MissingArgument {
        /// Tool being dispatched.
        tool: ToolName,
        /// Missing argument name.
        argument: &'static str,
    },
    /// None of the alternative filter arguments was supplied.
    #[error("At least one of {} must be provided for {tool}.", quoted(.fields))]
    MissingFilter {
        /// Tool being dispatched.
        tool: ToolName,
        /// Alternative argument names.
        fields: &'static [&'static str],
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Shorthand for a copied field.
const fn copy(name: &'static str) -> BodyField {
    BodyField {
        name,
        rule: FieldRule::Copy,
    }
}

/// Shorthand for a clamped field.
const fn clamped(name: &'static str, default: u64, max: u64) -> BodyField {
    BodyField {
        name,
        rule: FieldRule::Clamped(Clamp {
            default,
            max,
        }),
    }
}

/// Dispatch table in catalog order.
pub const ROUTES: &[ToolRoute] = &[
    ToolRoute {
        tool: ToolName::SearchGraph,
        method: CallMethod::Submit,
        path: &[
            Segment::Literal("v1"),
            Segment::Literal("graphs"),
            Segment::Arg("graphId"),
            Segment::Literal("search"),
        ],
        body: &[
            copy("query"),
            clamped("limit", 25, 50),
            BodyField {
                name: "use_semantic",
                rule: FieldRule::DefaultTrue,
            },
        ],
        requires_any_of: &[],
    },
    ToolRoute {
        tool: ToolName::GetNeighbors,
        method: CallMethod::Submit,
        path: &[
            Segment::Literal("v1"),
            Segment::Literal("graphs"),
            Segment::Arg("graphId"),
            Segment::Literal("neighbors"),
        ],
        body: &[
            copy("seed_node_ids"),
            copy("relationship_types"),
            clamped("depth", 1, 2),
            clamped("limit", 50, 50),
        ],
        requires_any_of: &[],
    },
    ToolRoute {
        tool: ToolName::GetEvidence,
        method: CallMethod::Submit,
        path: &[
            Segment::Literal("v1"),
            Segment::Literal("graphs"),
            Segment::Arg("graphId"),
            Segment::Literal("evidence"),
        ],
        body: &[copy("for_node_id"), clamped("top_k", 5, 10)],
        requires_any_of: &[],
    },
    ToolRoute {
        tool: ToolName::GetNode,
        method: CallMethod::Read,
        path: &[
            Segment::Literal("v1"),
            Segment::Literal("graphs"),
            Segment::Arg("graphId"),
            Segment::Literal("nodes"),
            Segment::Arg("nodeId"),
        ],
        body: &[],
        requires_any_of: &[],
    },
    ToolRoute {
        tool: ToolName::GetLabelValues,
        method: CallMethod::Read,
        path: &[
            Segment::Literal("v1"),
            Segment::Literal("graphs"),
            Segment::Arg("graphId"),
            Segment::Literal("labels"),
            Segment::Arg("label"),
            Segment::Literal("values"),
        ],
        body: &[],
        requires_any_of: &[],
    },
    ToolRoute {
        tool: ToolName::PsfkOverview,
        method: CallMethod::Submit,
        path: &[Segment::Literal("v1"), Segment::Literal("psfk"), Segment::Literal("overview")],
        body: &[copy("industry"), copy("sector"), copy("region"), copy("timeframe")],
        requires_any_of: &["industry", "sector"],
    },
];

/// Looks up the route for a tool.
#[must_use]
pub fn route(tool: ToolName) -> Option<&'static ToolRoute> {
    ROUTES.iter().find(|route| route.tool == tool)
}

impl ToolRoute {
    /// Builds the upstream call for validated arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when a path argument or filter is missing.
    pub fn build(&self, arguments: &Map<String, Value>) -> Result<UpstreamCall, DispatchError> {
        if !self.requires_any_of.is_empty()
            && !self.requires_any_of.iter().any(|field| non_empty_str(arguments.get(*field)).is_some())
        {
            return Err(DispatchError::MissingFilter {
                tool: self.tool,
                fields: self.requires_any_of,
            });
        }
        let mut path = String::new();
        for segment in self.path {
            path.push('/');
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Arg(name) => {
                    let value = non_empty_str(arguments.get(*name)).ok_or(
                        DispatchError::MissingArgument {
                            tool: self.tool,
                            argument: *name,
                        },
                    )?;
                    path.push_str(&encode_segment(value));
                }
            }
        }
        let body = match self.method {
            CallMethod::Read => None,
            CallMethod::Submit => Some(self.build_body(arguments)),
        };
        Ok(UpstreamCall {
            method: self.method,
            path,
            body,
        })
    }

    /// Assembles the submission body, omitting absent arguments.
    fn build_body(&self, arguments: &Map<String, Value>) -> Map<String, Value> {
        let mut body = Map::new();
        for field in self.body {
            let requested = arguments.get(field.name).filter(|value| !value.is_null());
            let value = match field.rule {
                FieldRule::Copy => requested.cloned(),
                FieldRule::Clamped(clamp) => Some(Value::from(clamp.apply(requested))),
                FieldRule::DefaultTrue => {
                    Some(Value::Bool(!matches!(requested, Some(Value::Bool(false)))))
                }
            };
            if let Some(value) = value {
                body.insert(field.name.to_string(), value);
            }
        }
        body
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Percent-encodes a single path segment.
fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>().replace('+', "%20")
}

/// Renders field names for error messages.
fn quoted(fields: &[&str]) -> String {
    fields.iter().map(|field| format!("'{field}'")).collect::<Vec<_>>().join(" or ")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
