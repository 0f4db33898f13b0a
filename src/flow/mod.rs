// SPDX-License-Identifier: MIT

//! Flow graphs and their execution
//!
//! - `graph`: nodes, edges, queries and the `GraphStore` the engine patches
//! - `nodes`: the behavior behind every node type
//! - `engine`: the run loop
//! - `persistence`: saved flows

pub mod condition;
pub mod engine;
pub mod graph;
pub mod loader;
pub mod nodes;
pub mod path;
pub mod persistence;
pub mod trigger;

pub use engine::{run_graph, Engine, RunEvent, RunReport};
pub use graph::{Edge, FlowRecord, Graph, GraphStore, InMemoryGraphStore, Node};
pub use loader::{FlowFile, FlowLoader};
pub use nodes::{HandlerResult, NodeHandler, NodeRegistry};
pub use persistence::{FileFlowStore, FlowStore, InMemoryFlowStore};
pub use trigger::TriggerSource;

pub use crate::error::Result;
