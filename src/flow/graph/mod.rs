// SPDX-License-Identifier: MIT

//! Graph model
//!
//! Node/edge data structures, the structural queries the engine needs and
//! the `GraphStore` abstraction the engine reads from and patches.

pub mod queries;
pub mod store;
pub mod types;

pub use queries::{edges_from, incomers, outgoers, roots};
pub use store::{GraphChange, GraphStore, InMemoryGraphStore};
pub use types::{Edge, FlowRecord, FlowSummary, Graph, Node, NodeData, Position};
