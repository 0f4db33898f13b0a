// SPDX-License-Identifier: MIT

//! Flow execution engine
//!
//! A run goes through three phases:
//! 1. reset: clear every node's run-state fields
//! 2. root selection: pick entry nodes for the trigger source
//! 3. traversal: pop activations off a stack until it is empty
//!
//! Traversal is strictly sequential and depth-first. Successors are pushed
//! in reverse edge order, so the first edge's whole subtree finishes before
//! the second edge is touched. Loop fan-out pushes its items the same way,
//! which makes every item's subtree complete before the next item starts.
//!
//! Node failures never abort a run. They land in the node's `error` field
//! and the walk continues with a null output. The only fatal condition is a
//! graph without an entry point.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::adapters::Adapters;
use crate::config::{EngineSettings, Settings};
use crate::error::{FlowError, Result};
use crate::flow::graph::{queries, Graph, GraphStore, NodeData};
use crate::flow::nodes::{state_patch, HandlerResult, NodeContext, NodeRegistry};
use crate::flow::trigger::TriggerSource;

/// Progress notifications for observers of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: u64,
        trigger: String,
    },
    NodeStarted {
        run_id: u64,
        node_id: String,
        node_type: String,
    },
    NodePatched {
        run_id: u64,
        node_id: String,
        data: NodeData,
    },
    NodeFailed {
        run_id: u64,
        node_id: String,
        error: String,
    },
    RunFinished {
        run_id: u64,
        activations: usize,
    },
    RunFailed {
        run_id: u64,
        error: String,
    },
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: u64,
    /// Node ids in activation order
    pub visited: Vec<String>,
    /// True when the activation budget stopped the run early
    pub truncated: bool,
}

impl RunReport {
    /// How many times a node was activated
    pub fn activations_of(&self, node_id: &str) -> usize {
        self.visited.iter().filter(|id| *id == node_id).count()
    }
}

/// One pending node step
struct Activation {
    node_id: String,
    input: Value,
    /// Nodes on the path that led here, used to refuse back edges
    ancestors: Arc<Vec<String>>,
}

pub struct Engine {
    registry: NodeRegistry,
    max_activations: usize,
    runs: AtomicU64,
}

impl Engine {
    pub fn new(registry: NodeRegistry, settings: &EngineSettings) -> Self {
        Self {
            registry,
            max_activations: settings.max_activations,
            runs: AtomicU64::new(0),
        }
    }

    /// Engine with built-in handlers and reqwest-backed adapters
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let adapters = Adapters::from_settings(settings)?;
        let registry = NodeRegistry::builtin(&adapters, settings);
        Ok(Self::new(registry, &settings.engine))
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Run the graph held by `store`
    pub async fn run(
        &self,
        store: &dyn GraphStore,
        trigger: &TriggerSource,
        payload: Value,
    ) -> Result<RunReport> {
        self.execute(store, trigger, payload, None).await
    }

    /// Run and stream `RunEvent`s to `tx`
    pub async fn run_with_events(
        &self,
        store: &dyn GraphStore,
        trigger: &TriggerSource,
        payload: Value,
        tx: mpsc::Sender<RunEvent>,
    ) -> Result<RunReport> {
        self.execute(store, trigger, payload, Some(tx)).await
    }

    async fn execute(
        &self,
        store: &dyn GraphStore,
        trigger: &TriggerSource,
        payload: Value,
        events: Option<mpsc::Sender<RunEvent>>,
    ) -> Result<RunReport> {
        let run_id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let emit = |event: RunEvent| {
            let events = events.clone();
            async move {
                if let Some(tx) = events {
                    // A dropped receiver only means nobody is watching
                    let _ = tx.send(event).await;
                }
            }
        };

        log::info!("--- Run {} started ({}) ---", run_id, trigger);
        emit(RunEvent::RunStarted {
            run_id,
            trigger: trigger.to_string(),
        })
        .await;

        if let Err(e) = self.reset(store).await {
            emit(RunEvent::RunFailed {
                run_id,
                error: e.to_string(),
            })
            .await;
            return Err(e);
        }

        let graph = store.snapshot().await;
        let roots = trigger.select_roots(&graph);
        if roots.is_empty() {
            log::error!("Run {}: no entry point found", run_id);
            emit(RunEvent::RunFailed {
                run_id,
                error: FlowError::NoEntryPoint.to_string(),
            })
            .await;
            return Err(FlowError::NoEntryPoint);
        }

        let mut report = RunReport {
            run_id,
            visited: Vec::new(),
            truncated: false,
        };
        let no_ancestors = Arc::new(Vec::new());
        let mut stack: Vec<Activation> = roots
            .into_iter()
            .rev()
            .map(|node_id| Activation {
                node_id,
                input: payload.clone(),
                ancestors: Arc::clone(&no_ancestors),
            })
            .collect();

        while let Some(activation) = stack.pop() {
            if report.visited.len() >= self.max_activations {
                log::warn!(
                    "Run {} hit the activation budget ({}), stopping",
                    run_id,
                    self.max_activations
                );
                report.truncated = true;
                break;
            }

            match self.step(store, run_id, activation, &emit, &mut report).await {
                Ok(successors) => stack.extend(successors.into_iter().rev()),
                Err(e) => {
                    log::error!("Run {} aborted: {}", run_id, e);
                    emit(RunEvent::RunFailed {
                        run_id,
                        error: e.to_string(),
                    })
                    .await;
                    return Err(e);
                }
            }
        }

        log::info!(
            "--- Run {} finished after {} activations ---",
            run_id,
            report.visited.len()
        );
        emit(RunEvent::RunFinished {
            run_id,
            activations: report.visited.len(),
        })
        .await;
        Ok(report)
    }

    /// Clear run-state fields left by the previous run
    async fn reset(&self, store: &dyn GraphStore) -> Result<()> {
        let graph = store.snapshot().await;
        for node in &graph.nodes {
            let fields = self.registry.transient_fields(node);
            if fields.is_empty() {
                continue;
            }
            let patch = state_patch(fields.iter().map(|f| (*f, Value::Null)));
            let reset = store.patch_node(&node.id, patch).await.map(|_| ());
            skip_removed(reset, &node.id)?;
        }
        Ok(())
    }

    /// Run one activation and return its successors in walk order
    async fn step<F, Fut>(
        &self,
        store: &dyn GraphStore,
        run_id: u64,
        activation: Activation,
        emit: &F,
        report: &mut RunReport,
    ) -> Result<Vec<Activation>>
    where
        F: Fn(RunEvent) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let Activation {
            node_id,
            input,
            ancestors,
        } = activation;

        let graph = store.snapshot().await;
        let Some(node) = graph.node(&node_id).cloned() else {
            log::warn!("Run {}: node {} no longer exists, skipping", run_id, node_id);
            return Ok(Vec::new());
        };

        log::info!("Executing node {} ({})", node.id, node.node_type);
        report.visited.push(node.id.clone());
        emit(RunEvent::NodeStarted {
            run_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
        })
        .await;

        let handler = self.registry.handler_for(&node);
        let mut ctx = NodeContext::new(&graph, run_id);
        let mut result = match handler.handle(&node, input, &mut ctx).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Node {} failed: {}", node.id, e);
                emit(RunEvent::NodeFailed {
                    run_id,
                    node_id: node.id.clone(),
                    error: e.to_string(),
                })
                .await;
                HandlerResult::continue_with(
                    Value::Null,
                    state_patch([("error", Value::String(e.to_string()))]),
                )
            }
        };

        if let Some(patch) = result.take_patch() {
            let applied = self.apply_patch(store, run_id, &node.id, patch, emit).await;
            skip_removed(applied, &node.id)?;
        }
        for (target, patch) in ctx.into_patches() {
            // Patches aimed at other nodes may reference ones that were removed
            if let Err(e) = self.apply_patch(store, run_id, &target, patch, emit).await {
                log::warn!("Node {} could not patch {}: {}", node.id, target, e);
            }
        }

        let mut path = ancestors.as_ref().clone();
        path.push(node.id.clone());
        let path = Arc::new(path);

        let next: Vec<(String, Value)> = match result {
            HandlerResult::Continue { output, .. } => {
                let edges = queries::edges_from(&node.id, None, &graph.edges);
                queries::targets(&edges, &graph.nodes)
                    .into_iter()
                    .map(|t| (t.id.clone(), output.clone()))
                    .collect()
            }
            HandlerResult::Branch { output, handle, .. } => {
                log::debug!("Node {} branching on '{}'", node.id, handle);
                let edges = queries::edges_from(&node.id, Some(&handle), &graph.edges);
                queries::targets(&edges, &graph.nodes)
                    .into_iter()
                    .map(|t| (t.id.clone(), output.clone()))
                    .collect()
            }
            HandlerResult::Stop { .. } => Vec::new(),
            HandlerResult::Fan { items, .. } => match graph.outgoers(&node).first() {
                Some(target) => {
                    log::debug!("Node {} fanning {} items to {}", node.id, items.len(), target.id);
                    items.into_iter().map(|item| (target.id.clone(), item)).collect()
                }
                None => {
                    log::debug!("Node {} has no target for its {} items", node.id, items.len());
                    Vec::new()
                }
            },
        };

        Ok(next
            .into_iter()
            .filter(|(target, _)| {
                let cyclic = path.contains(target);
                if cyclic {
                    log::warn!(
                        "Run {}: edge {} -> {} closes a cycle, not following it",
                        run_id,
                        node.id,
                        target
                    );
                }
                !cyclic
            })
            .map(|(node_id, input)| Activation {
                node_id,
                input,
                ancestors: Arc::clone(&path),
            })
            .collect())
    }

    async fn apply_patch<F, Fut>(
        &self,
        store: &dyn GraphStore,
        run_id: u64,
        node_id: &str,
        patch: NodeData,
        emit: &F,
    ) -> Result<()>
    where
        F: Fn(RunEvent) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let updated = store.patch_node(node_id, patch).await?;
        emit(RunEvent::NodePatched {
            run_id,
            node_id: node_id.to_string(),
            data: updated.data,
        })
        .await;
        Ok(())
    }
}

/// A node removed from the store mid-run is skipped, not fatal
fn skip_removed(result: Result<()>, node_id: &str) -> Result<()> {
    match result {
        Err(FlowError::NodeNotFound(_)) => {
            log::warn!("Node {} was removed during the run, dropping its patch", node_id);
            Ok(())
        }
        other => other,
    }
}

/// Run a standalone graph and return its final state
pub async fn run_graph(
    engine: &Engine,
    graph: Graph,
    trigger: &TriggerSource,
    payload: Value,
) -> Result<(RunReport, Graph)> {
    let store = crate::flow::graph::InMemoryGraphStore::new(graph);
    let report = engine.run(&store, trigger, payload).await?;
    Ok((report, store.snapshot().await))
}
