// SPDX-License-Identifier: MIT

//! Local model adapter (Ollama HTTP API)

use super::{parse_last_json_line, LocalModelClient, LocalModelRequest, ModelReply};
use crate::config::OllamaSettings;
use crate::error::AdapterError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub struct OllamaClient {
    client: Client,
}

impl OllamaClient {
    pub fn new(settings: &OllamaSettings) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    fn build_body(request: &LocalModelRequest) -> Value {
        json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": request.options,
        })
    }

    /// Interpret a generate response body.
    ///
    /// Streaming servers may still answer with newline-delimited JSON even
    /// when `stream` is false; only the last line carries the final state.
    fn parse_body(text: &str) -> Value {
        parse_last_json_line(text).unwrap_or_else(|| json!({ "response": text }))
    }

    fn extract_reply(data: Value) -> ModelReply {
        let response = [&data["response"], &data["message"]["content"]]
            .into_iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| data.clone());
        ModelReply {
            response,
            raw_output: data,
        }
    }

    fn parse_model_names(data: &Value) -> Vec<String> {
        data["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn base(url: &str) -> &str {
    url.trim_end_matches('/')
}

#[async_trait]
impl LocalModelClient for OllamaClient {
    async fn generate(&self, request: &LocalModelRequest) -> Result<ModelReply, AdapterError> {
        let url = format!("{}/api/generate", base(&request.base_url));
        log::debug!("Ollama generate: {} model={}", url, request.model);

        let resp = self
            .client
            .post(&url)
            .json(&Self::build_body(request))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let data = Self::parse_body(&text);

        if !status.is_success() {
            let message = match &data["error"] {
                Value::String(s) => s.clone(),
                Value::Null => "Ollama error".to_string(),
                other => other.to_string(),
            };
            return Err(AdapterError::Status {
                provider: "ollama".to_string(),
                status: status.as_u16(),
                message,
                raw_output: Some(data),
            });
        }

        Ok(Self::extract_reply(data))
    }

    async fn list_models(&self, base_url: &str) -> Result<Vec<String>, AdapterError> {
        let url = format!("{}/api/tags", base(base_url));
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                provider: "ollama".to_string(),
                status: status.as_u16(),
                message,
                raw_output: None,
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;
        Ok(Self::parse_model_names(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_build_body() {
        let mut options = Map::new();
        options.insert("temperature".to_string(), json!(0.2));
        let req = LocalModelRequest {
            base_url: "http://localhost:11434/".to_string(),
            model: "llama2".to_string(),
            prompt: "hello".to_string(),
            options,
        };

        let body = OllamaClient::build_body(&req);
        assert_eq!(
            body,
            json!({
                "model": "llama2",
                "prompt": "hello",
                "stream": false,
                "options": {"temperature": 0.2}
            })
        );
    }

    #[test]
    fn test_parse_ndjson_body() {
        let text = "{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"Hello\",\"done\":true}\n";
        let data = OllamaClient::parse_body(text);
        assert_eq!(data["response"], "Hello");
        assert_eq!(data["done"], true);
    }

    #[test]
    fn test_parse_plain_text_body() {
        let data = OllamaClient::parse_body("just text");
        assert_eq!(data, json!({"response": "just text"}));
    }

    #[test]
    fn test_extract_reply_shapes() {
        let reply = OllamaClient::extract_reply(json!({"response": "a"}));
        assert_eq!(reply.response, json!("a"));

        let reply = OllamaClient::extract_reply(json!({"message": {"content": "b"}}));
        assert_eq!(reply.response, json!("b"));

        let data = json!({"other": 1});
        let reply = OllamaClient::extract_reply(data.clone());
        assert_eq!(reply.response, data);
        assert_eq!(reply.raw_output, data);
    }

    #[test]
    fn test_parse_model_names() {
        let data = json!({"models": [{"name": "llama2:latest"}, {"name": "mistral"}, {}]});
        assert_eq!(
            OllamaClient::parse_model_names(&data),
            vec!["llama2:latest".to_string(), "mistral".to_string()]
        );
        assert!(OllamaClient::parse_model_names(&json!({})).is_empty());
    }

    #[test]
    fn test_base_trims_slash() {
        assert_eq!(base("http://host:1/"), "http://host:1");
    }
}
