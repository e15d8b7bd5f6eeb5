// crates/graph-gateway-core/src/tooling.rs
// ============================================================================
// Module: Tooling Identifiers
// Description: Canonical tool identifiers exposed by the gateway.
// Purpose: Shared tool naming across the catalog, dispatcher, and audit log.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Canonical tool identifiers used by the gateway.
//! These names are part of the external contract surface.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Canonical tool names served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Hybrid keyword + semantic search over a graph.
    SearchGraph,
    /// Traverse relationships from seed nodes.
    GetNeighbors,
    /// Fetch evidence sources for a node.
    GetEvidence,
    /// Fetch a single node by identifier.
    GetNode,
    /// List the values observed for a node label.
    GetLabelValues,
    /// Macro overview across the PSFK graph.
    PsfkOverview,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SearchGraph => "search_graph",
            Self::GetNeighbors => "get_neighbors",
            Self::GetEvidence => "get_evidence",
            Self::GetNode => "get_node",
            Self::GetLabelValues => "get_label_values",
            Self::PsfkOverview => "psfk_overview",
        }
    }

    /// Returns all tool names in catalog order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::SearchGraph,
            Self::GetNeighbors,
            Self::GetEvidence,
            Self::GetNode,
            Self::GetLabelValues,
            Self::PsfkOverview,
        ]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "search_graph" => Some(Self::SearchGraph),
            "get_neighbors" => Some(Self::GetNeighbors),
            "get_evidence" => Some(Self::GetEvidence),
            "get_node" => Some(Self::GetNode),
            "get_label_values" => Some(Self::GetLabelValues),
            "psfk_overview" => Some(Self::PsfkOverview),
            _ => None,
        }
    }

    /// Returns true when the tool operates on a caller-selected graph.
    ///
    /// The overview tool is bound to a fixed graph and takes no `graphId`.
    #[must_use]
    pub const fn requires_graph_id(self) -> bool {
        !matches!(self, Self::PsfkOverview)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
