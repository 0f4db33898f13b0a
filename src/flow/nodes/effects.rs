// SPDX-License-Identifier: MIT

//! Handlers that reach outside the process through an adapter.
//!
//! Adapter failures never fail the run: they are written to the node's
//! `error` field and the walk continues with a null output.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{render_text, state_patch, HandlerResult, NodeContext, NodeHandler};
use crate::adapters::{
    ChatMessage, HttpFetcher, HttpRequest, LlmClient, LlmRequest, LocalModelClient,
    LocalModelRequest, Notification, Notifier,
};
use crate::error::Result;
use crate::flow::condition::is_truthy;
use crate::flow::graph::Node;

const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Sampling parameters forwarded to the local model unchanged
const LOCAL_MODEL_PARAMS: &[&str] = &[
    "format",
    "metadata",
    "system",
    "template",
    "mirostat",
    "mirostat_eta",
    "mirostat_tau",
    "num_ctx",
    "num_gpu",
    "num_thread",
    "repeat_last_n",
    "repeat_penalty",
    "tfs_z",
    "top_k",
    "top_p",
    "seed",
];

const MODEL_FIELDS: &[&str] = &["incomingData", "response", "rawOutput", "error"];

fn optional(value: Option<&Value>) -> Value {
    value.cloned().unwrap_or(Value::Null)
}

/// Enum-like option from node data; unknown values fall back to the default
fn setting<T: DeserializeOwned + Default>(node: &Node, key: &str) -> T {
    node.get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Calls a configured URL
pub struct HttpRequestHandler {
    fetcher: Arc<dyn HttpFetcher>,
}

impl HttpRequestHandler {
    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self { fetcher }
    }

    fn build_request(node: &Node, input: &Value) -> Option<HttpRequest> {
        let url = node.get_str("url")?;
        let method = node.get_str("method").unwrap_or("GET").to_uppercase();

        let headers = match node.get("headers") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), render_text(v)))
                .collect(),
            _ => Vec::new(),
        };

        // A configured body wins; otherwise writes send the incoming value
        let body = match node.get("body") {
            Some(body) if !body.is_null() => Some(body.clone()),
            _ if matches!(method.as_str(), "POST" | "PUT" | "PATCH") && !input.is_null() => {
                Some(input.clone())
            }
            _ => None,
        };

        Some(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let Some(request) = Self::build_request(node, &input) else {
            let patch = state_patch([
                ("incomingData", input),
                ("response", Value::Null),
                ("status", Value::Null),
                ("error", Value::from("No URL configured")),
            ]);
            return Ok(HandlerResult::continue_with(Value::Null, patch));
        };

        log::info!("HTTP {} {} (node {})", request.method, request.url, node.id);
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                let patch = state_patch([
                    ("incomingData", input),
                    ("response", response.body.clone()),
                    ("status", Value::from(response.status)),
                    ("error", Value::Null),
                ]);
                Ok(HandlerResult::continue_with(response.body, patch))
            }
            Err(e) => {
                log::warn!("HTTP request node {} failed: {}", node.id, e);
                let patch = state_patch([
                    ("incomingData", input),
                    ("response", Value::Null),
                    ("status", Value::Null),
                    ("error", Value::String(e.to_string())),
                ]);
                Ok(HandlerResult::continue_with(Value::Null, patch))
            }
        }
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["incomingData", "response", "status", "error"]
    }
}

/// Chat/completion call through the LLM adapter
pub struct LlmHandler {
    client: Arc<dyn LlmClient>,
    default_model: String,
}

impl LlmHandler {
    pub fn new(client: Arc<dyn LlmClient>, default_model: impl Into<String>) -> Self {
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    fn parse_memory(value: Option<&Value>) -> Vec<ChatMessage> {
        let Some(Value::Array(items)) = value else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|m| {
                let role = m.get("role")?.as_str()?;
                let content = m.get("content")?;
                Some(ChatMessage {
                    role: role.to_string(),
                    content: render_text(content),
                })
            })
            .collect()
    }

    fn build_request(&self, node: &Node, input: &Value) -> LlmRequest {
        // The incoming value is the prompt; a configured prompt covers root nodes
        let prompt = if input.is_null() {
            optional(node.get("prompt"))
        } else {
            input.clone()
        };

        LlmRequest {
            model: node.get_str("model").unwrap_or(&self.default_model).to_string(),
            api_key: node.get_str("apiKey").map(String::from),
            temperature: node.get_f64("temperature").unwrap_or(DEFAULT_TEMPERATURE),
            mode: setting(node, "mode"),
            output_format: setting(node, "output_format"),
            memory: Self::parse_memory(node.get("memory")),
            prompt,
            extra: match node.get("extra") {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            },
        }
    }
}

#[async_trait]
impl NodeHandler for LlmHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let request = self.build_request(node, &input);
        log::info!("LLM node {} calling model {}", node.id, request.model);

        match self.client.complete(&request).await {
            Ok(reply) => {
                let patch = state_patch([
                    ("incomingData", input),
                    ("response", reply.response.clone()),
                    ("rawOutput", reply.raw_output),
                    ("error", Value::Null),
                ]);
                Ok(HandlerResult::continue_with(reply.response, patch))
            }
            Err(e) => {
                log::warn!("LLM node {} failed: {}", node.id, e);
                let patch = state_patch([
                    ("incomingData", input),
                    ("response", Value::Null),
                    ("rawOutput", optional(e.raw_output())),
                    ("error", Value::String(e.to_string())),
                ]);
                Ok(HandlerResult::continue_with(Value::Null, patch))
            }
        }
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        MODEL_FIELDS
    }
}

/// Generate call against a local model server
pub struct OllamaHandler {
    client: Arc<dyn LocalModelClient>,
    default_base_url: String,
    default_model: String,
}

impl OllamaHandler {
    pub fn new(
        client: Arc<dyn LocalModelClient>,
        default_base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            default_base_url: default_base_url.into(),
            default_model: default_model.into(),
        }
    }

    /// Generation options from node data; null entries are dropped
    pub fn build_options(node: &Node) -> Map<String, Value> {
        let mut options = Map::new();
        options.insert(
            "temperature".to_string(),
            Value::from(node.get_f64("temperature").unwrap_or(DEFAULT_TEMPERATURE)),
        );
        for key in LOCAL_MODEL_PARAMS {
            if let Some(value) = node.get(key) {
                options.insert(key.to_string(), value.clone());
            }
        }
        if let Some(tags) = node.get("tags").filter(|v| is_truthy(v)) {
            options.insert("tags".to_string(), tags.clone());
        }
        if let Some(stop) = node
            .get("stop_tokens")
            .filter(|v| is_truthy(v))
        {
            options.insert("stop".to_string(), stop.clone());
        }
        options.retain(|_, v| !v.is_null());
        options
    }

    fn base_url<'a>(&'a self, node: &'a Node) -> &'a str {
        node.get_str("base_url").unwrap_or(&self.default_base_url)
    }
}

#[async_trait]
impl NodeHandler for OllamaHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let base_url = self.base_url(node);
        let mut extra = Map::new();

        if node.get_bool("refresh_models") {
            match self.client.list_models(base_url).await {
                Ok(models) => {
                    extra.insert("available_models".to_string(), Value::from(models));
                }
                Err(e) => log::warn!("Model discovery for node {} failed: {}", node.id, e),
            }
        }

        let request = LocalModelRequest {
            base_url: base_url.to_string(),
            model: node
                .get_str("model_name")
                .unwrap_or(&self.default_model)
                .to_string(),
            prompt: render_text(&input),
            options: Self::build_options(node),
        };
        log::info!("Ollama node {} calling {} at {}", node.id, request.model, base_url);

        let (output, mut patch) = match self.client.generate(&request).await {
            Ok(reply) => (
                reply.response.clone(),
                state_patch([
                    ("incomingData", input),
                    ("response", reply.response),
                    ("rawOutput", reply.raw_output),
                    ("error", Value::Null),
                ]),
            ),
            Err(e) => {
                log::warn!("Ollama node {} failed: {}", node.id, e);
                (
                    Value::Null,
                    state_patch([
                        ("incomingData", input),
                        ("response", Value::Null),
                        ("rawOutput", optional(e.raw_output())),
                        ("error", Value::String(e.to_string())),
                    ]),
                )
            }
        };
        patch.extend(extra);
        Ok(HandlerResult::continue_with(output, patch))
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        MODEL_FIELDS
    }
}

/// Fire-and-forget notification of the incoming value
pub struct TelegramHandler {
    notifier: Arc<dyn Notifier>,
}

impl TelegramHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl NodeHandler for TelegramHandler {
    async fn handle(
        &self,
        node: &Node,
        input: Value,
        _ctx: &mut NodeContext<'_>,
    ) -> Result<HandlerResult> {
        let notification = Notification {
            text: render_text(&input),
            chat_id: node
                .get_str("chat_id")
                .or_else(|| node.get_str("chatId"))
                .map(String::from),
            bot_token: node.get_str("bot_token").map(String::from),
        };

        let notifier = Arc::clone(&self.notifier);
        let node_id = node.id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&notification).await {
                log::error!("Telegram node {} notification failed: {}", node_id, e);
            }
        });

        Ok(HandlerResult::continue_with(
            input.clone(),
            state_patch([("incomingData", input)]),
        ))
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["incomingData"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{HttpResponse, ModelReply};
    use crate::error::AdapterError;
    use crate::flow::graph::Graph;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    async fn run(handler: &dyn NodeHandler, node: &Node, input: Value) -> (Value, Map<String, Value>) {
        let graph = Graph::default();
        let mut ctx = NodeContext::new(&graph, 1);
        match handler.handle(node, input, &mut ctx).await.unwrap() {
            HandlerResult::Continue { output, patch } => (output, patch.unwrap_or_default()),
            other => panic!("Expected Continue, got {:?}", other),
        }
    }

    /// A mock fetcher that records requests
    struct MockFetcher {
        fail: bool,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockFetcher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpFetcher for MockFetcher {
        async fn fetch(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, AdapterError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(AdapterError::InvalidResponse("connection refused".to_string()));
            }
            Ok(HttpResponse {
                status: 200,
                body: json!({"ok": true}),
            })
        }
    }

    /// A mock model that echoes the prompt
    struct MockModel {
        requests: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmClient for MockModel {
        async fn complete(&self, request: &LlmRequest) -> std::result::Result<ModelReply, AdapterError> {
            self.requests.lock().unwrap().push(request.clone());
            if request.model == "broken" {
                return Err(AdapterError::Status {
                    provider: "openai".to_string(),
                    status: 401,
                    message: "bad key".to_string(),
                    raw_output: Some(json!({"error": {"message": "bad key"}})),
                });
            }
            Ok(ModelReply {
                response: json!(format!("echo: {}", render_text(&request.prompt))),
                raw_output: json!({"id": "cmpl-1"}),
            })
        }
    }

    struct MockLocalModel {
        requests: Mutex<Vec<LocalModelRequest>>,
    }

    #[async_trait]
    impl LocalModelClient for MockLocalModel {
        async fn generate(&self, request: &LocalModelRequest) -> std::result::Result<ModelReply, AdapterError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ModelReply {
                response: json!("local answer"),
                raw_output: json!({"response": "local answer", "done": true}),
            })
        }

        async fn list_models(&self, _base_url: &str) -> std::result::Result<Vec<String>, AdapterError> {
            Ok(vec!["llama2".to_string(), "mistral".to_string()])
        }
    }

    struct MockNotifier {
        sent: mpsc::UnboundedSender<Notification>,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(&self, notification: &Notification) -> std::result::Result<(), AdapterError> {
            let _ = self.sent.send(notification.clone());
            Err(AdapterError::MissingApiKey("telegram".to_string()))
        }
    }

    #[tokio::test]
    async fn test_http_success() {
        let fetcher = MockFetcher::new(false);
        let handler = HttpRequestHandler::new(fetcher.clone());
        let node = Node::new("h", "http-request")
            .with("url", json!("http://example.test/items"))
            .with("method", json!("post"));

        let (output, patch) = run(&handler, &node, json!({"n": 1})).await;
        assert_eq!(output, json!({"ok": true}));
        assert_eq!(patch["status"], 200);
        assert_eq!(patch["error"], Value::Null);

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_http_failure_is_recorded() {
        let handler = HttpRequestHandler::new(MockFetcher::new(true));
        let node = Node::new("h", "http-request").with("url", json!("http://down.test"));

        let (output, patch) = run(&handler, &node, json!("x")).await;
        assert_eq!(output, Value::Null);
        assert_eq!(patch["response"], Value::Null);
        assert!(patch["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_http_get_sends_no_body() {
        let fetcher = MockFetcher::new(false);
        let handler = HttpRequestHandler::new(fetcher.clone());
        let node = Node::new("h", "http-request").with("url", json!("http://x.test"));
        run(&handler, &node, json!({"n": 1})).await;
        assert_eq!(fetcher.requests.lock().unwrap()[0].body, None);
    }

    #[tokio::test]
    async fn test_http_missing_url() {
        let handler = HttpRequestHandler::new(MockFetcher::new(false));
        let (output, patch) = run(&handler, &Node::new("h", "http-request"), json!(1)).await;
        assert_eq!(output, Value::Null);
        assert_eq!(patch["error"], "No URL configured");
    }

    #[tokio::test]
    async fn test_llm_request_from_node_data() {
        let model = Arc::new(MockModel {
            requests: Mutex::new(Vec::new()),
        });
        let handler = LlmHandler::new(model.clone(), "gpt-3.5-turbo");
        let node = Node::new("l", "llm")
            .with("mode", json!("completion"))
            .with("output_format", json!("json"))
            .with("temperature", json!(0.1))
            .with("memory", json!([{"role": "system", "content": "be brief"}, {"bad": 1}]))
            .with("extra", json!({"max_tokens": 5}));

        let (output, patch) = run(&handler, &node, json!("hello")).await;
        assert_eq!(output, json!("echo: hello"));
        assert_eq!(patch["rawOutput"], json!({"id": "cmpl-1"}));

        let requests = model.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.model, "gpt-3.5-turbo");
        assert_eq!(req.mode, crate::adapters::LlmMode::Completion);
        assert_eq!(req.output_format, crate::adapters::OutputFormat::Json);
        assert_eq!(req.temperature, 0.1);
        assert_eq!(req.memory.len(), 1);
        assert_eq!(req.extra["max_tokens"], 5);
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_raw_output() {
        let handler = LlmHandler::new(
            Arc::new(MockModel {
                requests: Mutex::new(Vec::new()),
            }),
            "gpt-3.5-turbo",
        );
        let node = Node::new("l", "llm").with("model", json!("broken"));

        let (output, patch) = run(&handler, &node, json!("hello")).await;
        assert_eq!(output, Value::Null);
        assert!(patch["error"].as_str().unwrap().contains("bad key"));
        assert_eq!(patch["rawOutput"]["error"]["message"], "bad key");
    }

    #[test]
    fn test_ollama_options() {
        let node = Node::new("o", "ollama")
            .with("temperature", json!(0.3))
            .with("system", json!("be nice"))
            .with("template", Value::Null)
            .with("top_k", json!(40))
            .with("stop_tokens", json!(["</s>"]))
            .with("tags", json!([]));

        let options = OllamaHandler::build_options(&node);
        assert_eq!(options["temperature"], 0.3);
        assert_eq!(options["system"], "be nice");
        assert_eq!(options["top_k"], 40);
        assert_eq!(options["stop"], json!(["</s>"]));
        assert_eq!(options["tags"], json!([]));
        assert!(!options.contains_key("template"));
        assert!(!options.contains_key("stop_tokens"));
    }

    #[tokio::test]
    async fn test_ollama_call_and_model_refresh() {
        let client = Arc::new(MockLocalModel {
            requests: Mutex::new(Vec::new()),
        });
        let handler = OllamaHandler::new(client.clone(), "http://localhost:11434", "llama2");
        let node = Node::new("o", "ollama")
            .with("base_url", json!("http://gpu-box:11434"))
            .with("refresh_models", json!(true));

        let (output, patch) = run(&handler, &node, json!({"q": "hi"})).await;
        assert_eq!(output, json!("local answer"));
        assert_eq!(patch["available_models"], json!(["llama2", "mistral"]));

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].base_url, "http://gpu-box:11434");
        assert_eq!(requests[0].model, "llama2");
        assert_eq!(requests[0].prompt, r#"{"q":"hi"}"#);
    }

    #[tokio::test]
    async fn test_telegram_is_fire_and_forget() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = TelegramHandler::new(Arc::new(MockNotifier { sent: tx }));
        let node = Node::new("t", "telegram").with("chat_id", json!("42"));

        // The notifier fails, the node still passes its input on
        let (output, patch) = run(&handler, &node, json!({"alert": "disk full"})).await;
        assert_eq!(output, json!({"alert": "disk full"}));
        assert_eq!(patch["incomingData"], json!({"alert": "disk full"}));

        let sent = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.text, r#"{"alert":"disk full"}"#);
        assert_eq!(sent.chat_id.as_deref(), Some("42"));
    }
}
