// SPDX-License-Identifier: MIT

//! External effect adapters
//!
//! Thin clients the effectful node handlers use to reach outside the
//! process. Each concern is a trait so tests (and embedders) can swap in
//! their own implementation:
//! - [openai] - OpenAI-compatible chat/completion endpoint (`LlmClient`)
//! - [ollama] - local model server (`LocalModelClient`)
//! - [telegram] - outbound messaging (`Notifier`)
//! - [http] - generic HTTP fetch (`HttpFetcher`)

pub mod http;
pub mod ollama;
pub mod openai;
pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::AdapterError;

/// Request shape for chat or completion endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    #[default]
    Chat,
    Completion,
}

/// How to interpret the model's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Everything an `llm` node sends to its adapter
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    /// Per-node key; the adapter falls back to its configured key
    pub api_key: Option<String>,
    pub temperature: f64,
    pub mode: LlmMode,
    pub output_format: OutputFormat,
    /// Prior conversation, prepended in chat mode
    pub memory: Vec<ChatMessage>,
    /// A string, or an object with a `messages` array
    pub prompt: Value,
    /// Extra body fields forwarded verbatim
    pub extra: Map<String, Value>,
}

/// Normalized model answer
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    /// Extracted text (or parsed JSON when requested)
    pub response: Value,
    /// Full provider payload
    pub raw_output: Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<ModelReply, AdapterError>;
}

/// Everything an `ollama` node sends to its adapter
#[derive(Debug, Clone, PartialEq)]
pub struct LocalModelRequest {
    pub base_url: String,
    pub model: String,
    pub prompt: String,
    /// Sampling options; null entries already removed
    pub options: Map<String, Value>,
}

#[async_trait]
pub trait LocalModelClient: Send + Sync {
    async fn generate(&self, request: &LocalModelRequest) -> Result<ModelReply, AdapterError>;

    /// Names of the models installed on the server
    async fn list_models(&self, base_url: &str) -> Result<Vec<String>, AdapterError>;
}

/// An outbound notification
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Notification {
    pub text: String,
    /// Overrides the configured recipient
    pub chat_id: Option<String>,
    /// Overrides the configured credentials
    pub bot_token: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AdapterError>;
}

/// A generic outbound HTTP call
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON, or the raw text when the body is not JSON
    pub body: Value,
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, AdapterError>;
}

/// The full set of adapters handed to the node registry
#[derive(Clone)]
pub struct Adapters {
    pub llm: Arc<dyn LlmClient>,
    pub local_model: Arc<dyn LocalModelClient>,
    pub notifier: Arc<dyn Notifier>,
    pub http: Arc<dyn HttpFetcher>,
}

impl Adapters {
    /// Build the reqwest-backed adapters from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, AdapterError> {
        Ok(Self {
            llm: Arc::new(openai::OpenAiClient::new(&settings.llm)?),
            local_model: Arc::new(ollama::OllamaClient::new(&settings.ollama)?),
            notifier: Arc::new(telegram::TelegramNotifier::new(&settings.telegram)?),
            http: Arc::new(http::ReqwestFetcher::new(&settings.http)?),
        })
    }
}

/// Render a value as message text: strings verbatim, everything else as JSON
pub fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse the last non-empty line of a body as JSON (newline-delimited responses)
pub fn parse_last_json_line(text: &str) -> Option<Value> {
    let last = text.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(last).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_text() {
        assert_eq!(render_text(&json!("hi")), "hi");
        assert_eq!(render_text(&json!({"a": [1]})), r#"{"a":[1]}"#);
        assert_eq!(render_text(&json!(3)), "3");
        assert_eq!(render_text(&Value::Null), "null");
    }

    #[test]
    fn test_parse_last_json_line() {
        let body = "{\"response\":\"a\",\"done\":false}\n{\"response\":\"b\",\"done\":true}\n\n";
        assert_eq!(parse_last_json_line(body).unwrap()["response"], "b");
        assert!(parse_last_json_line("not json").is_none());
        assert!(parse_last_json_line("").is_none());
    }

    #[test]
    fn test_mode_serde() {
        let mode: LlmMode = serde_json::from_value(json!("completion")).unwrap();
        assert_eq!(mode, LlmMode::Completion);
        let format: OutputFormat = serde_json::from_value(json!("json")).unwrap();
        assert_eq!(format, OutputFormat::Json);
    }
}
