// SPDX-License-Identifier: MIT

//! Source, display and passthrough handlers

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{render_text, state_patch, HandlerResult, NodeContext, NodeHandler};
use crate::error::Result;
use crate::flow::condition::is_truthy;
use crate::flow::graph::Node;

/// Marker emitted by a start node
pub const START_MESSAGE: &str = "Поток запущен!";

/// Ignores its input and emits the start marker
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    async fn handle(
        &self,
        _node: &Node,
        _input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        Ok(HandlerResult::pass(json!({ "message": START_MESSAGE })))
    }
}

/// Records the incoming value in one field.
///
/// Covers webhook triggers, display nodes, base-url inputs and the passive
/// trigger markers (which only pass data through in-process). Alert nodes are
/// the terminal variant.
pub struct RecordHandler {
    field: &'static str,
    terminal: bool,
}

impl RecordHandler {
    /// Record into `incomingData` and pass the value on
    pub fn passthrough() -> Self {
        Self {
            field: "incomingData",
            terminal: false,
        }
    }

    /// Record into `incomingValue` and stop the branch
    pub fn alert() -> Self {
        Self {
            field: "incomingValue",
            terminal: true,
        }
    }
}

#[async_trait]
impl NodeHandler for RecordHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        log::debug!("{} ({}) received: {}", node.label(), node.id, input);
        let patch = state_patch([(self.field, input.clone())]);

        if self.terminal {
            return Ok(HandlerResult::Stop { patch: Some(patch) });
        }
        Ok(HandlerResult::continue_with(input, patch))
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        if self.terminal {
            &["incomingValue"]
        } else {
            &["incomingData"]
        }
    }
}

/// Combines the incoming value with the configured text
pub struct InputTextHandler;

impl InputTextHandler {
    /// `"<incoming> + <value>"`, or just the value when nothing came in
    pub fn combine(incoming: &Value, value: &str) -> String {
        if is_truthy(incoming) {
            format!("{} + {}", render_text(incoming), value)
        } else {
            value.to_string()
        }
    }
}

#[async_trait]
impl NodeHandler for InputTextHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let value = node.get_str("value").unwrap_or_default();
        let output = json!({
            "incomingData": input,
            "inputValue": value,
            "combined": Self::combine(&input, value),
        });
        log::debug!("Input text {} produced: {}", node.id, output);

        Ok(HandlerResult::continue_with(
            output,
            state_patch([("incomingData", input)]),
        ))
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["incomingData"]
    }
}

/// Fallback for unrecognized node types
pub struct PassthroughHandler;

#[async_trait]
impl NodeHandler for PassthroughHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        log::warn!(
            "Unknown node type '{}' for node {}, passing data through",
            node.node_type,
            node.id
        );
        Ok(HandlerResult::pass(input))
    }
}
