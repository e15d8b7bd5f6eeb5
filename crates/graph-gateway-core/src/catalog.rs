// crates/graph-gateway-core/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Immutable tool descriptors served to callers.
// Purpose: Single source of truth for tool names, schemas, and determinism.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The catalog is built once on first access and shared read-only by every
//! request. Descriptors are serialized with the camelCase field names the
//! tool protocol expects (`inputSchema`, `isDeterministic`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::tooling::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Gateway version advertised by discovery endpoints and `initialize`.
pub const SERVER_VERSION: &str = "1.1.0";

/// Version stamped on every tool contract.
const TOOL_VERSION: &str = "1.0.0";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Tool descriptor as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Canonical tool name.
    pub name: ToolName,
    /// Human-readable description for agent callers.
    pub description: &'static str,
    /// JSON schema for the tool arguments.
    pub input_schema: Value,
    /// JSON schema for the tool result, when published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Whether identical inputs yield identical results.
    pub is_deterministic: bool,
    /// Contract version of the tool.
    pub version: &'static str,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Returns the immutable tool catalog in canonical order.
#[must_use]
pub fn tool_catalog() -> &'static [ToolDescriptor] {
    static CATALOG: OnceLock<Vec<ToolDescriptor>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

/// Looks up the descriptor for a tool.
#[must_use]
pub fn descriptor(tool: ToolName) -> Option<&'static ToolDescriptor> {
    tool_catalog().iter().find(|entry| entry.name == tool)
}

/// Builds every descriptor.
fn build_catalog() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: ToolName::SearchGraph,
            description: "Perform hybrid (keyword + semantic) search on a knowledge graph. Use \
                          this to find trends, articles, and concepts. Highly recommended for \
                          natural language discovery.",
            input_schema: object_schema(
                &[
                    ("graphId", string_prop("The graph ID (e.g., 'psfk', 'waldo', 'sic')")),
                    ("query", string_prop("The search query")),
                    ("userId", user_id_prop()),
                    ("limit", number_prop("Maximum number of results (default 25, max 50)")),
                    (
                        "use_semantic",
                        json!({
                            "type": "boolean",
                            "description": "Whether to use semantic search (default true)"
                        }),
                    ),
                ],
                &["graphId", "query", "userId"],
            ),
            output_schema: None,
            is_deterministic: false,
            version: TOOL_VERSION,
        },
        ToolDescriptor {
            name: ToolName::GetNeighbors,
            description: "Traverse the graph from seed nodes to find related concepts and \
                          relationships. Useful for depth-first discovery.",
            input_schema: object_schema(
                &[
                    ("graphId", string_prop("The graph ID")),
                    (
                        "seed_node_ids",
                        string_array_prop("Array of node IDs to start traversal from"),
                    ),
                    ("userId", user_id_prop()),
                    ("relationship_types", string_array_prop("Filter by relationship types")),
                    ("depth", number_prop("Traversal depth (default 1, max 2)")),
                    ("limit", number_prop("Maximum results (default 50)")),
                ],
                &["graphId", "seed_node_ids", "userId"],
            ),
            output_schema: None,
            is_deterministic: true,
            version: TOOL_VERSION,
        },
        ToolDescriptor {
            name: ToolName::GetEvidence,
            description: "Get source signals, articles, and evidentiary depth for a specific \
                          node. Essential for provenance and fact-checking.",
            input_schema: object_schema(
                &[
                    ("graphId", string_prop("The graph ID")),
                    ("for_node_id", string_prop("The ID of the node (Trend or Article)")),
                    ("userId", user_id_prop()),
                    ("top_k", number_prop("Number of evidence items to return (default 5, max 10)")),
                ],
                &["graphId", "for_node_id", "userId"],
            ),
            output_schema: None,
            is_deterministic: true,
            version: TOOL_VERSION,
        },
        ToolDescriptor {
            name: ToolName::GetNode,
            description: "Directly retrieve metadata and properties for a single node by its ID.",
            input_schema: object_schema(
                &[
                    ("graphId", string_prop("The graph ID")),
                    ("nodeId", string_prop("The ID of the node")),
                    ("userId", user_id_prop()),
                ],
                &["graphId", "nodeId", "userId"],
            ),
            output_schema: None,
            is_deterministic: true,
            version: TOOL_VERSION,
        },
        ToolDescriptor {
            name: ToolName::GetLabelValues,
            description: "Discover valid values for a specific node label (e.g., RetailerType, \
                          Technology). Use for discovery, UI filters, and category exploration.",
            input_schema: object_schema(
                &[
                    ("graphId", string_prop("The graph ID")),
                    ("label", string_prop("The label to fetch values for")),
                    ("userId", user_id_prop()),
                ],
                &["graphId", "label", "userId"],
            ),
            output_schema: None,
            is_deterministic: true,
            version: TOOL_VERSION,
        },
        ToolDescriptor {
            name: ToolName::PsfkOverview,
            description: "Get a structured macro overview from the PSFK Graph. Returns up to 3 \
                          meta_patterns. Useful for top-level briefings before deeper \
                          exploration.",
            // industry or sector is enforced by the dispatcher, not the schema.
            input_schema: object_schema(
                &[
                    ("industry", string_prop("Filter by industry (e.g. 'Retail', 'Health')")),
                    ("sector", string_prop("Filter by sector")),
                    ("region", string_prop("Filter by region")),
                    ("timeframe", string_prop("Timeframe for the overview")),
                    ("userId", user_id_prop()),
                ],
                &["userId"],
            ),
            output_schema: Some(json!({
                "type": "object",
                "properties": {
                    "meta_patterns": { "type": "array", "maxItems": 3 }
                }
            })),
            is_deterministic: false,
            version: TOOL_VERSION,
        },
    ]
}

// ============================================================================
// SECTION: Schema Helpers
// ============================================================================

/// Builds an object schema from ordered properties and required keys.
fn object_schema(properties: &[(&str, Value)], required: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> =
        properties.iter().map(|(key, value)| ((*key).to_string(), value.clone())).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// String property.
fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// Numeric property.
fn number_prop(description: &str) -> Value {
    json!({ "type": "number", "description": description })
}

/// Array-of-strings property.
fn string_array_prop(description: &str) -> Value {
    json!({ "type": "array", "items": { "type": "string" }, "description": description })
}

/// Caller identifier used for attribution.
fn user_id_prop() -> Value {
    string_prop("Unique identifier for the user (Required)")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
