// SPDX-License-Identifier: MIT

//! Graph storage owned by an editor session
//!
//! The engine only talks to a `GraphStore`. Writes are whole-node
//! replacements: a patch produces a new node whose `data` is the old data
//! shallow-merged with the patch, and that node replaces the old one.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use super::types::{Edge, Graph, Node};
use crate::error::{FlowError, Result};

/// Notification sent to observers after every store write
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    NodePatched { id: String },
    Replaced,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Current nodes and edges
    async fn snapshot(&self) -> Graph;

    /// Current state of one node
    async fn node(&self, id: &str) -> Option<Node>;

    /// Shallow-merge `patch` into the node's data; returns the new node
    async fn patch_node(&self, id: &str, patch: Map<String, Value>) -> Result<Node>;

    /// Replace the whole graph
    async fn replace_all(&self, nodes: Vec<Node>, edges: Vec<Edge>);
}

/// In-process graph store with change notifications
pub struct InMemoryGraphStore {
    graph: RwLock<Graph>,
    changes: broadcast::Sender<GraphChange>,
}

impl InMemoryGraphStore {
    pub fn new(graph: Graph) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            graph: RwLock::new(graph),
            changes,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: GraphChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new(Graph::default())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn snapshot(&self) -> Graph {
        self.graph.read().await.clone()
    }

    async fn node(&self, id: &str) -> Option<Node> {
        self.graph.read().await.node(id).cloned()
    }

    async fn patch_node(&self, id: &str, patch: Map<String, Value>) -> Result<Node> {
        let updated = {
            let mut graph = self.graph.write().await;
            let current = graph
                .node(id)
                .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;

            let mut data = current.data.clone();
            data.extend(patch);
            let updated = Node {
                data,
                ..current.clone()
            };

            graph.nodes = graph
                .nodes
                .iter()
                .map(|n| if n.id == id { updated.clone() } else { n.clone() })
                .collect();
            updated
        };

        self.notify(GraphChange::NodePatched { id: id.to_string() });
        Ok(updated)
    }

    async fn replace_all(&self, nodes: Vec<Node>, edges: Vec<Edge>) {
        *self.graph.write().await = Graph::new(nodes, edges);
        self.notify(GraphChange::Replaced);
    }
}
