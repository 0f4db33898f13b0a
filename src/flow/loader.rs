// SPDX-License-Identifier: MIT

//! Flow file loading
//!
//! Reads a graph from a JSON export (the editor's format, or a saved
//! `FlowRecord`) or from a hand-written YAML file.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::flow::graph::{Edge, Graph, Node};

/// Contents of a flow file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl FlowFile {
    pub fn into_graph(self) -> Graph {
        Graph::new(self.nodes, self.edges)
    }
}

/// Loads flow definitions from disk
pub struct FlowLoader;

impl FlowLoader {
    /// Load by extension: `.yaml`/`.yml` as YAML, anything else as JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FlowFile> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let file = if is_yaml {
            Self::parse_yaml(&content)?
        } else {
            Self::parse_json(&content)?
        };
        log::info!(
            "Loaded flow {} ({} nodes, {} edges)",
            path.display(),
            file.nodes.len(),
            file.edges.len()
        );
        Ok(file)
    }

    pub fn parse_json(content: &str) -> Result<FlowFile> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn parse_yaml(content: &str) -> Result<FlowFile> {
        Ok(serde_yaml::from_str(content)?)
    }
}
