// SPDX-License-Identifier: MIT

//! Generic HTTP fetch adapter

use super::{HttpFetcher, HttpRequest, HttpResponse};
use crate::config::HttpSettings;
use crate::error::AdapterError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

/// Parse a method name, case-insensitively
pub fn parse_method(method: &str) -> Result<Method, AdapterError> {
    Method::from_bytes(method.trim().to_uppercase().as_bytes())
        .map_err(|_| AdapterError::InvalidResponse(format!("invalid HTTP method '{}'", method)))
}

/// JSON when the body parses as JSON, the raw text otherwise
pub fn decode_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, AdapterError> {
        let method = parse_method(&request.method)?;
        let sends_body = !matches!(method, Method::GET | Method::HEAD);

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let (true, Some(body)) = (sends_body, &request.body) {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;

        Ok(HttpResponse {
            status,
            body: decode_body(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method(" Post ").unwrap(), Method::POST);
        assert!(parse_method("not a method").is_err());
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(r#"{"ok":true}"#.to_string()), json!({"ok": true}));
        assert_eq!(decode_body("<html>".to_string()), json!("<html>"));
    }
}
