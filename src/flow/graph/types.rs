//! Graph model type definitions
//!
//! Field names follow the editor's JSON so that saved flows deserialize as-is
//! (`sourceHandle`, `webhookName`, `createdAt`). Unknown editor fields are kept
//! in `extra` and written back unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::nodes::tags;

/// Per-node configuration and last-run state share one bag
pub type NodeData = Map<String, Value>;

/// Canvas position (not used by execution)
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node in the flow graph
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Node {
    /// Unique identifier within the graph
    pub id: String,
    /// Tag selecting the node behavior
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            position: Position::default(),
            data: Map::new(),
            extra: Map::new(),
        }
    }

    /// Builder-style helper to set one data field
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Canonical type tag (aliases resolved)
    pub fn kind(&self) -> &str {
        tags::canonical(&self.node_type)
    }

    /// Data field lookup; absent fields read as `None`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Non-empty string data field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.data.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Display label, falling back to the type tag
    pub fn label(&self) -> &str {
        self.get_str("label").unwrap_or(&self.node_type)
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    /// Named output of the source node (`"true"` / `"false"` on conditions)
    #[serde(
        rename = "sourceHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    #[serde(
        rename = "targetHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_handle: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            extra: Map::new(),
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// Nodes and edges of one flow
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Custom name of the first webhook-trigger node that has one
    pub fn webhook_name(&self) -> Option<String> {
        self.nodes
            .iter()
            .filter(|n| n.kind() == tags::WEBHOOK_TRIGGER)
            .find_map(|n| n.get_str("customName").map(str::to_string))
    }
}

/// A persisted flow
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FlowRecord {
    /// Build a new record; the webhook name is derived from the nodes
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        let webhook_name = graph.webhook_name();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            nodes: graph.nodes,
            edges: graph.edges,
            webhook_name,
            created_at: Utc::now(),
        }
    }

    pub fn graph(&self) -> Graph {
        Graph::new(self.nodes.clone(), self.edges.clone())
    }

    pub fn summary(&self) -> FlowSummary {
        FlowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }
}

/// Listing entry for a persisted flow
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
