// SPDX-License-Identifier: MIT

//! Control-flow handlers: condition, merge, loop and delay

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{state_patch, HandlerResult, NodeContext, NodeHandler};
use crate::error::Result;
use crate::flow::condition::PredicateCompiler;
use crate::flow::graph::Node;

/// Arrivals a merge node waits for before firing
pub const MERGE_THRESHOLD: usize = 2;

/// Default pause for delay nodes, in milliseconds
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Routes the input to the `"true"` or `"false"` handle
pub struct ConditionHandler {
    compiler: Arc<dyn PredicateCompiler>,
}

impl ConditionHandler {
    pub fn new(compiler: Arc<dyn PredicateCompiler>) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let source = node
            .get_str("condition")
            .or_else(|| node.get_str("expression"))
            .unwrap_or_default();

        let (result, error) = match self.compiler.compile(source) {
            Ok(predicate) => (predicate.evaluate(&input), Value::Null),
            Err(e) => {
                log::warn!("Condition node {} failed: {}", node.id, e);
                (false, Value::String(e.to_string()))
            }
        };
        log::debug!("Condition node {} evaluated to {}", node.id, result);

        Ok(HandlerResult::Branch {
            output: input.clone(),
            handle: result.to_string(),
            patch: Some(state_patch([
                ("incomingData", input),
                ("result", Value::Bool(result)),
                ("error", error),
            ])),
        })
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["incomingData", "result", "error"]
    }
}

/// Two-arrival join.
///
/// Counts arrivals, not inbound edges: two values over the same edge fire
/// the merge just like one value over each of two edges.
pub struct MergeHandler;

#[async_trait]
impl NodeHandler for MergeHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let mut buffer = match node.get("collected") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        buffer.push(input);

        if buffer.len() < MERGE_THRESHOLD {
            log::debug!("Merge node {} waiting ({} arrived)", node.id, buffer.len());
            return Ok(HandlerResult::Stop {
                patch: Some(state_patch([("collected", Value::Array(buffer))])),
            });
        }

        log::debug!("Merge node {} firing with {} values", node.id, buffer.len());
        Ok(HandlerResult::continue_with(
            Value::Array(buffer),
            state_patch([("collected", Value::Array(Vec::new()))]),
        ))
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["collected"]
    }
}

/// Fans an array out item by item; other values pass through
pub struct LoopHandler;

#[async_trait]
impl NodeHandler for LoopHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let patch = state_patch([("incomingData", input.clone())]);
        match input {
            Value::Array(items) => {
                log::debug!("Loop node {} fanning out {} items", node.id, items.len());
                Ok(HandlerResult::Fan {
                    items,
                    patch: Some(patch),
                })
            }
            other => Ok(HandlerResult::continue_with(other, patch)),
        }
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["incomingData"]
    }
}

/// Sleeps `ms` milliseconds, then passes the input on
pub struct DelayHandler;

impl DelayHandler {
    fn duration(node: &Node) -> Duration {
        let ms = node
            .get_f64("ms")
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms as u64)
            .unwrap_or(DEFAULT_DELAY_MS);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        tokio::time::sleep(Self::duration(node)).await;
        Ok(HandlerResult::pass(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::condition::ExpressionCompiler;
    use crate::flow::graph::Graph;
    use serde_json::json;
    use std::time::Instant;

    async fn run(handler: &dyn NodeHandler, node: &Node, input: Value) -> HandlerResult {
        let graph = Graph::default();
        let mut ctx = NodeContext::new(&graph, 1);
        handler.handle(node, input, &mut ctx).await.unwrap()
    }

    fn condition() -> ConditionHandler {
        ConditionHandler::new(Arc::new(ExpressionCompiler))
    }

    #[tokio::test]
    async fn test_condition_branches() {
        let node = Node::new("c", "condition").with("condition", json!("value > 10"));

        match run(&condition(), &node, json!(5)).await {
            HandlerResult::Branch { output, handle, patch } => {
                assert_eq!(output, json!(5));
                assert_eq!(handle, "false");
                assert_eq!(patch.unwrap()["result"], false);
            }
            other => panic!("Expected Branch, got {:?}", other),
        }

        match run(&condition(), &node, json!(11)).await {
            HandlerResult::Branch { handle, .. } => assert_eq!(handle, "true"),
            other => panic!("Expected Branch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_condition_parse_error_takes_false_branch() {
        let node = Node::new("c", "condition").with("condition", json!("value >"));
        match run(&condition(), &node, json!(5)).await {
            HandlerResult::Branch { handle, patch, .. } => {
                assert_eq!(handle, "false");
                let patch = patch.unwrap();
                assert_eq!(patch["result"], false);
                assert!(patch["error"].is_string());
            }
            other => panic!("Expected Branch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_merge_threshold() {
        let node = Node::new("m", "merge");
        let first = run(&MergeHandler, &node, json!("a")).await;
        assert_eq!(
            first,
            HandlerResult::Stop {
                patch: Some(state_patch([("collected", json!(["a"]))]))
            }
        );

        // The engine writes the patch back before the next arrival
        let node = node.with("collected", json!(["a"]));
        let second = run(&MergeHandler, &node, json!("b")).await;
        assert_eq!(
            second,
            HandlerResult::continue_with(json!(["a", "b"]), state_patch([("collected", json!([]))]))
        );
    }

    #[tokio::test]
    async fn test_loop_fans_arrays() {
        let node = Node::new("l", "loop");
        match run(&LoopHandler, &node, json!([1, 2, 3])).await {
            HandlerResult::Fan { items, .. } => assert_eq!(items, vec![json!(1), json!(2), json!(3)]),
            other => panic!("Expected Fan, got {:?}", other),
        }
        match run(&LoopHandler, &node, json!({"a": 1})).await {
            HandlerResult::Continue { output, .. } => assert_eq!(output, json!({"a": 1})),
            other => panic!("Expected Continue, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delay_waits() {
        let node = Node::new("d", "delay").with("ms", json!(20));
        let started = Instant::now();
        let result = run(&DelayHandler, &node, json!("x")).await;
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(result, HandlerResult::pass(json!("x")));
    }

    #[test]
    fn test_delay_duration_defaults() {
        assert_eq!(
            DelayHandler::duration(&Node::new("d", "delay")),
            Duration::from_millis(DEFAULT_DELAY_MS)
        );
        assert_eq!(
            DelayHandler::duration(&Node::new("d", "delay").with("ms", json!(-5))),
            Duration::from_millis(DEFAULT_DELAY_MS)
        );
        assert_eq!(
            DelayHandler::duration(&Node::new("d", "delay").with("ms", json!("250"))),
            Duration::from_millis(250)
        );
    }
}
