// SPDX-License-Identifier: MIT

//! Runtime settings
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables (a `.env` file is honoured by the binary through
//! `dotenv`). Every section has defaults so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::error::{FlowError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub engine: EngineSettings,
    pub storage: StorageSettings,
    pub llm: LlmSettings,
    pub ollama: OllamaSettings,
    pub telegram: TelegramSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Hold the webhook response until the triggered run has finished
    pub wait_for_webhook_runs: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            wait_for_webhook_runs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on node activations in a single run
    pub max_activations: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_activations: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub flows_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            flows_dir: "flows".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            default_model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub default_model: String,
    pub timeout_secs: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama2".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub api_base: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: None,
            chat_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Settings {
    /// Load settings from a YAML file (if given) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::parse_yaml(&fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        settings.apply_env()?;
        Ok(settings)
    }

    /// Parse settings from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("NODEFLOW_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("NODEFLOW_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| FlowError::config(format!("NODEFLOW_PORT is not a port: {}", port)))?;
        }
        if let Some(dir) = var("NODEFLOW_FLOWS_DIR") {
            self.storage.flows_dir = dir;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = var("OLLAMA_BASE_URL") {
            self.ollama.base_url = url;
        }
        if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat) = var("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(chat);
        }
        Ok(())
    }
}
