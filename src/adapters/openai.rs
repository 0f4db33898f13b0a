// SPDX-License-Identifier: MIT

//! OpenAI-compatible LLM adapter
//!
//! Sends `llm` node requests to a chat (`/chat/completions`) or completion
//! (`/completions`) endpoint and normalizes both response shapes to a single
//! `response` value.

use super::{LlmClient, LlmMode, LlmRequest, ModelReply, OutputFormat};
use crate::config::LlmSettings;
use crate::error::AdapterError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Client for OpenAI-compatible APIs
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    /// Build the request body for the selected mode
    fn build_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "temperature": request.temperature,
        });

        match request.mode {
            LlmMode::Chat => {
                let mut messages: Vec<Value> =
                    request.memory.iter().map(|m| json!(m)).collect();
                match &request.prompt {
                    Value::Object(obj) if obj.get("messages").is_some_and(Value::is_array) => {
                        if let Some(Value::Array(extra)) = obj.get("messages") {
                            messages.extend(extra.iter().cloned());
                        }
                    }
                    Value::String(s) => messages.push(json!({"role": "user", "content": s})),
                    Value::Null => {}
                    other => {
                        messages.push(json!({"role": "user", "content": other.to_string()}))
                    }
                }
                body["messages"] = json!(messages);
            }
            LlmMode::Completion => {
                body["prompt"] = json!(super::render_text(&request.prompt));
            }
        }

        if let Value::Object(obj) = &mut body {
            for (k, v) in &request.extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        body
    }

    /// Pull the text out of a chat or completion response
    fn extract_reply(mode: LlmMode, format: OutputFormat, raw: Value) -> ModelReply {
        let text = match mode {
            LlmMode::Chat => raw["choices"][0]["message"]["content"].as_str(),
            LlmMode::Completion => raw["choices"][0]["text"].as_str(),
        };

        let response = match (text, format) {
            (None, _) => Value::Null,
            (Some(t), OutputFormat::Json) => {
                serde_json::from_str(t).unwrap_or_else(|_| Value::String(t.to_string()))
            }
            (Some(t), OutputFormat::Text) => Value::String(t.to_string()),
        };

        ModelReply {
            response,
            raw_output: raw,
        }
    }

    fn endpoint(&self, mode: LlmMode) -> String {
        match mode {
            LlmMode::Chat => format!("{}/chat/completions", self.base_url),
            LlmMode::Completion => format!("{}/completions", self.base_url),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &LlmRequest) -> Result<ModelReply, AdapterError> {
        let api_key = request
            .api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .ok_or_else(|| AdapterError::MissingApiKey("openai".to_string()))?;

        let body = Self::build_body(request);
        log::debug!(
            "LLM request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(self.endpoint(request.mode))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let raw: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            let message = raw["error"]["message"]
                .as_str()
                .unwrap_or("LLM error")
                .to_string();
            return Err(AdapterError::Status {
                provider: "openai".to_string(),
                status: status.as_u16(),
                message,
                raw_output: Some(raw),
            });
        }

        Ok(Self::extract_reply(request.mode, request.output_format, raw))
    }
}
