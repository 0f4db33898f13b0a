// SPDX-License-Identifier: MIT

//! Typed error handling for nodeflow-rs
//!
//! `FlowError` covers everything the engine, stores and server can fail with.
//! `AdapterError` is what the external effect adapters (LLM, local model,
//! messaging, generic HTTP) return; handlers turn it into a node-local `error`
//! field rather than letting it abort the run.

use serde_json::Value;
use thiserror::Error;

/// Top-level error type for nodeflow-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// The graph has no node the run could start from
    #[error("No entry point found: the flow has no root or trigger node")]
    NoEntryPoint,

    /// A node referenced by id does not exist in the graph
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// A JSON path string could not be parsed
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A condition expression could not be parsed or evaluated
    #[error("Condition error: {0}")]
    Condition(String),

    /// No persisted flow matched the lookup
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    /// Persistence failures
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors (invalid settings file, bad env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from external effect adapters
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Errors raised by external effect adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    /// API key not configured
    #[error("Missing API key for {0}")]
    MissingApiKey(String),

    /// Transport-level failure (connect, timeout, body read)
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The remote service answered with a non-success status
    #[error("{provider} returned {status}: {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
        raw_output: Option<Value>,
    },

    /// The response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AdapterError {
    /// Raw response payload, when the service sent one
    pub fn raw_output(&self) -> Option<&Value> {
        match self {
            AdapterError::Status { raw_output, .. } => raw_output.as_ref(),
            _ => None,
        }
    }
}

impl FlowError {
    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_entry_point_message() {
        assert_eq!(
            FlowError::NoEntryPoint.to_string(),
            "No entry point found: the flow has no root or trigger node"
        );
    }

    #[test]
    fn test_status_error_keeps_raw_output() {
        let err = AdapterError::Status {
            provider: "openai".to_string(),
            status: 401,
            message: "bad key".to_string(),
            raw_output: Some(json!({"error": {"message": "bad key"}})),
        };
        assert_eq!(err.to_string(), "openai returned 401: bad key");
        assert_eq!(err.raw_output().unwrap()["error"]["message"], "bad key");
    }

    #[test]
    fn test_adapter_error_converts() {
        let err: FlowError = AdapterError::MissingApiKey("openai".to_string()).into();
        assert!(matches!(err, FlowError::Adapter(_)));
        assert_eq!(err.to_string(), "Missing API key for openai");
    }

    #[test]
    fn test_from_str() {
        let err: FlowError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
