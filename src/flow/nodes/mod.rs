// SPDX-License-Identifier: MIT

//! Node behavior registry
//!
//! Every node type tag maps to a `NodeHandler`. A handler consumes the
//! incoming value and the node's configuration and tells the engine how the
//! walk continues (`HandlerResult`), optionally with a patch for the node's
//! `data`.

pub mod basic;
pub mod control;
pub mod effects;
pub mod registry;
pub mod tags;
pub mod transform;

pub use registry::NodeRegistry;

pub use crate::adapters::render_text;

use async_trait::async_trait;
use serde_json::{Number, Value};

use crate::error::Result;
use crate::flow::graph::{Graph, Node, NodeData};

/// What the engine does after a handler returns
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    /// Propagate `output` along every outgoing edge
    Continue {
        output: Value,
        patch: Option<NodeData>,
    },
    /// Propagate `output` only along edges with `sourceHandle == handle`
    Branch {
        output: Value,
        handle: String,
        patch: Option<NodeData>,
    },
    /// End this branch of the walk
    Stop { patch: Option<NodeData> },
    /// Send each item, in order, to the first outgoing target
    Fan {
        items: Vec<Value>,
        patch: Option<NodeData>,
    },
}

impl HandlerResult {
    /// Plain passthrough without a patch
    pub fn pass(output: Value) -> Self {
        HandlerResult::Continue {
            output,
            patch: None,
        }
    }

    pub fn continue_with(output: Value, patch: NodeData) -> Self {
        HandlerResult::Continue {
            output,
            patch: Some(patch),
        }
    }

    /// Remove and return the state patch
    pub fn take_patch(&mut self) -> Option<NodeData> {
        match self {
            HandlerResult::Continue { patch, .. }
            | HandlerResult::Branch { patch, .. }
            | HandlerResult::Stop { patch }
            | HandlerResult::Fan { patch, .. } => patch.take(),
        }
    }

    pub fn patch(&self) -> Option<&NodeData> {
        match self {
            HandlerResult::Continue { patch, .. }
            | HandlerResult::Branch { patch, .. }
            | HandlerResult::Stop { patch }
            | HandlerResult::Fan { patch, .. } => patch.as_ref(),
        }
    }
}

/// Per-activation view handed to a handler
pub struct NodeContext<'a> {
    graph: &'a Graph,
    run_id: u64,
    patches: Vec<(String, NodeData)>,
}

impl<'a> NodeContext<'a> {
    pub fn new(graph: &'a Graph, run_id: u64) -> Self {
        Self {
            graph,
            run_id,
            patches: Vec::new(),
        }
    }

    /// Graph state at the time of the activation
    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Find a node by id, or by the user-assigned `data.nodeId`
    pub fn find_node(&self, reference: &str) -> Option<&'a Node> {
        self.graph
            .nodes
            .iter()
            .find(|n| n.id == reference || n.get_str("nodeId") == Some(reference))
    }

    /// Request a patch on any node; applied after the handler returns
    pub fn patch_node(&mut self, id: impl Into<String>, patch: NodeData) {
        self.patches.push((id.into(), patch));
    }

    pub fn into_patches(self) -> Vec<(String, NodeData)> {
        self.patches
    }
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult>;

    /// Run-state fields cleared before every run
    fn transient_fields(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Build a node data patch from key/value pairs
pub fn state_patch<I, K>(fields: I) -> NodeData
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    fields.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// JSON number for a float result.
///
/// Whole numbers become integers; NaN and infinities become null, matching
/// how they serialize in JSON.
pub fn number_value(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
