// SPDX-License-Identifier: MIT

//! Node type tags
//!
//! Canonical tags are kebab-case. The editor saves camelCase tags
//! (`startNode`, `llmNode`, ...); those are accepted as aliases.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const START: &str = "start";
pub const WEBHOOK_TRIGGER: &str = "webhook-trigger";
pub const INPUT_TEXT: &str = "input-text";
pub const BASE_URL_INPUT: &str = "base-url-input";
pub const ALERT: &str = "alert";
pub const DISPLAY: &str = "display";
pub const JSON_PROCESSOR: &str = "json-processor";
pub const CONDITION: &str = "condition";
pub const MERGE: &str = "merge";
pub const LOOP: &str = "loop";
pub const MATH: &str = "math";
pub const DELAY: &str = "delay";
pub const HTTP_REQUEST: &str = "http-request";
pub const LLM: &str = "llm";
pub const OLLAMA: &str = "ollama";
pub const TELEGRAM: &str = "telegram";
pub const SCHEDULE: &str = "schedule";
pub const FILE_WATCHER: &str = "file-watcher";
pub const DB_TRIGGER: &str = "db-trigger";
pub const MESSAGE_LISTENER: &str = "message-listener";
pub const MQTT_LISTENER: &str = "mqtt-listener";
pub const MAIL_TRIGGER: &str = "mail-trigger";

static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("startNode", START),
        ("webhookTriggerNode", WEBHOOK_TRIGGER),
        ("inputTextNode", INPUT_TEXT),
        ("baseUrlInputNode", BASE_URL_INPUT),
        ("alertNode", ALERT),
        ("displayNode", DISPLAY),
        ("jsonProcessorNode", JSON_PROCESSOR),
        ("conditionNode", CONDITION),
        ("mergeNode", MERGE),
        ("loopNode", LOOP),
        ("mathNode", MATH),
        ("delayNode", DELAY),
        ("httpRequestNode", HTTP_REQUEST),
        ("fetch", HTTP_REQUEST),
        ("llmNode", LLM),
        ("ollamaNode", OLLAMA),
        ("local-model", OLLAMA),
        ("telegramNode", TELEGRAM),
        ("notify", TELEGRAM),
        ("scheduleNode", SCHEDULE),
        ("fileWatcherNode", FILE_WATCHER),
        ("databaseTriggerNode", DB_TRIGGER),
        ("telegramListenerNode", MESSAGE_LISTENER),
        ("mqttListenerNode", MQTT_LISTENER),
        ("emailTriggerNode", MAIL_TRIGGER),
    ])
});

/// Map a tag (canonical or alias) to its canonical form.
/// Unknown tags are returned unchanged.
pub fn canonical(tag: &str) -> &str {
    ALIASES.get(tag).copied().unwrap_or(tag)
}

/// All registered aliases as `(alias, canonical)` pairs
pub fn aliases() -> impl Iterator<Item = (&'static str, &'static str)> {
    ALIASES.iter().map(|(a, c)| (*a, *c))
}
