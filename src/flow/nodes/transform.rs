// SPDX-License-Identifier: MIT

//! Value transforms: JSON path extraction and arithmetic

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{number_value, state_patch, tags, HandlerResult, NodeContext, NodeHandler};
use crate::error::Result;
use crate::flow::condition::is_truthy;
use crate::flow::graph::Node;
use crate::flow::path;

/// Extracts a value by path from the input or from another node's data
pub struct JsonProcessorHandler;

impl JsonProcessorHandler {
    /// What a source node exposes to path lookups
    pub fn project_source(node: &Node) -> Value {
        let node_id = node.get_str("nodeId").unwrap_or(&node.id);
        let incoming = node.get("incomingData").cloned().unwrap_or(Value::Null);

        match node.kind() {
            tags::INPUT_TEXT => json!({
                "nodeId": node_id,
                "inputValue": node.get_str("value").unwrap_or_default(),
                "incomingData": incoming,
            }),
            tags::BASE_URL_INPUT => json!({
                "nodeId": node_id,
                "base_url": node.get_str("base_url").unwrap_or_default(),
                "incomingData": incoming,
            }),
            _ => Value::Object(node.data.clone()),
        }
    }

    /// Resolve the configured path; returns `(value, error)`
    fn extract(source: &Value, data_path: &str) -> (Value, Option<String>) {
        if !is_truthy(source) {
            return (Value::Null, None);
        }
        match path::resolve(source, data_path) {
            Ok(value) => (value.unwrap_or(Value::Null), None),
            Err(e) => (Value::Null, Some(e.to_string())),
        }
    }
}

#[async_trait]
impl NodeHandler for JsonProcessorHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let data_path = node
            .get_str("dataPath")
            .or_else(|| node.get_str("path"))
            .unwrap_or_default();

        let (processed, error) = match node.get_str("sourceNodeId") {
            Some(source_id) => match ctx.find_node(source_id) {
                Some(source) => Self::extract(&Self::project_source(source), data_path),
                None => (
                    Value::Null,
                    Some(format!("Node with ID \"{}\" not found", source_id)),
                ),
            },
            None => Self::extract(&input, data_path),
        };

        if let Some(e) = &error {
            log::warn!("JSON processor {} failed: {}", node.id, e);
        }

        let patch = state_patch([
            ("incomingData", input),
            ("processedValue", processed.clone()),
            ("error", error.map(Value::String).unwrap_or(Value::Null)),
        ]);
        Ok(HandlerResult::continue_with(processed, patch))
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["incomingData", "processedValue", "error"]
    }
}

/// Applies one arithmetic operation with a configured operand
pub struct MathHandler;

impl MathHandler {
    /// `None` for an unknown operation
    pub fn apply(operation: &str, value: f64, operand: f64) -> Option<f64> {
        match operation {
            "add" => Some(value + operand),
            "subtract" => Some(value - operand),
            "multiply" => Some(value * operand),
            "divide" => Some(value / operand),
            _ => None,
        }
    }
}

#[async_trait]
impl NodeHandler for MathHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let Some(value) = input.as_f64() else {
            log::debug!("Math node {} got non-numeric input, passing through", node.id);
            return Ok(HandlerResult::pass(input));
        };

        let operation = node.get_str("operation").unwrap_or("add");
        let operand = node.get_f64("operand").unwrap_or(0.0);

        let Some(result) = Self::apply(operation, value, operand) else {
            log::warn!("Math node {} has unknown operation '{}'", node.id, operation);
            return Ok(HandlerResult::pass(input));
        };

        let output = number_value(result);
        let patch = state_patch([("incomingData", input), ("result", output.clone())]);
        Ok(HandlerResult::continue_with(output, patch))
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["incomingData", "result"]
    }
}
