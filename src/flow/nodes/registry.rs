// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use super::basic::{InputTextHandler, PassthroughHandler, RecordHandler, StartHandler};
use super::control::{ConditionHandler, DelayHandler, LoopHandler, MergeHandler};
use super::effects::{HttpRequestHandler, LlmHandler, OllamaHandler, TelegramHandler};
use super::tags;
use super::transform::{JsonProcessorHandler, MathHandler};
use super::NodeHandler;
use crate::adapters::Adapters;
use crate::config::Settings;
use crate::flow::condition::{ExpressionCompiler, PredicateCompiler};
use crate::flow::graph::Node;

/// Maps canonical node type tags to handlers
#[derive(Clone)]
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
    fallback: Arc<dyn NodeHandler>,
}

impl NodeRegistry {
    /// Empty registry; every node passes its data through
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(PassthroughHandler),
        }
    }

    /// Registry with every built-in node type
    pub fn builtin(adapters: &Adapters, settings: &Settings) -> Self {
        Self::builtin_with_compiler(adapters, settings, Arc::new(ExpressionCompiler))
    }

    /// Built-in node types with a custom condition language
    pub fn builtin_with_compiler(
        adapters: &Adapters,
        settings: &Settings,
        compiler: Arc<dyn PredicateCompiler>,
    ) -> Self {
        let mut registry = Self::new();

        let record: Arc<dyn NodeHandler> = Arc::new(RecordHandler::passthrough());
        for tag in [
            tags::WEBHOOK_TRIGGER,
            tags::DISPLAY,
            tags::BASE_URL_INPUT,
            tags::SCHEDULE,
            tags::FILE_WATCHER,
            tags::DB_TRIGGER,
            tags::MESSAGE_LISTENER,
            tags::MQTT_LISTENER,
            tags::MAIL_TRIGGER,
        ] {
            registry.register(tag, Arc::clone(&record));
        }

        registry.register(tags::START, Arc::new(StartHandler));
        registry.register(tags::INPUT_TEXT, Arc::new(InputTextHandler));
        registry.register(tags::ALERT, Arc::new(RecordHandler::alert()));
        registry.register(tags::JSON_PROCESSOR, Arc::new(JsonProcessorHandler));
        registry.register(tags::MATH, Arc::new(MathHandler));
        registry.register(tags::CONDITION, Arc::new(ConditionHandler::new(compiler)));
        registry.register(tags::MERGE, Arc::new(MergeHandler));
        registry.register(tags::LOOP, Arc::new(LoopHandler));
        registry.register(tags::DELAY, Arc::new(DelayHandler));
        registry.register(
            tags::HTTP_REQUEST,
            Arc::new(HttpRequestHandler::new(Arc::clone(&adapters.http))),
        );
        registry.register(
            tags::LLM,
            Arc::new(LlmHandler::new(
                Arc::clone(&adapters.llm),
                settings.llm.default_model.clone(),
            )),
        );
        registry.register(
            tags::OLLAMA,
            Arc::new(OllamaHandler::new(
                Arc::clone(&adapters.local_model),
                settings.ollama.base_url.clone(),
                settings.ollama.default_model.clone(),
            )),
        );
        registry.register(
            tags::TELEGRAM,
            Arc::new(TelegramHandler::new(Arc::clone(&adapters.notifier))),
        );

        registry
    }

    /// Register (or replace) the handler for a tag; aliases are resolved
    pub fn register(&mut self, tag: &str, handler: Arc<dyn NodeHandler>) {
        self.handlers
            .insert(tags::canonical(tag).to_string(), handler);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(tags::canonical(tag)).cloned()
    }

    pub fn is_known(&self, tag: &str) -> bool {
        self.handlers.contains_key(tags::canonical(tag))
    }

    /// Handler for a node, falling back to passthrough for unknown types
    pub fn handler_for(&self, node: &Node) -> Arc<dyn NodeHandler> {
        self.get(&node.node_type)
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Fields the reset phase clears on this node
    pub fn transient_fields(&self, node: &Node) -> &'static [&'static str] {
        self.handlers
            .get(node.kind())
            .map(|h| h.transient_fields())
            .unwrap_or(&[])
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
