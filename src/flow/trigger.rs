// SPDX-License-Identifier: MIT

//! What started a run, and where that run enters the graph.
//!
//! Only manual and webhook runs originate in-process. The other sources are
//! fired by external schedulers or listeners, which call the same engine
//! entry point with the matching variant.

use serde::{Deserialize, Serialize};

use crate::flow::graph::{Graph, Node};
use crate::flow::nodes::tags;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSource {
    /// The editor's run button or the CLI
    Manual,
    /// `POST /webhook/{name}`
    Webhook { name: String },
    Scheduled,
    FileWatch,
    DbPoll,
    MessageSubscribe,
    MailPoll,
}

impl TriggerSource {
    pub fn webhook(name: impl Into<String>) -> Self {
        TriggerSource::Webhook { name: name.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Webhook { .. } => "webhook",
            TriggerSource::Scheduled => "scheduled",
            TriggerSource::FileWatch => "file_watch",
            TriggerSource::DbPoll => "db_poll",
            TriggerSource::MessageSubscribe => "message_subscribe",
            TriggerSource::MailPoll => "mail_poll",
        }
    }

    /// Node types that act as entry points for this source
    pub fn trigger_tags(&self) -> &'static [&'static str] {
        match self {
            TriggerSource::Manual => &[],
            TriggerSource::Webhook { .. } => &[tags::WEBHOOK_TRIGGER],
            TriggerSource::Scheduled => &[tags::SCHEDULE],
            TriggerSource::FileWatch => &[tags::FILE_WATCHER],
            TriggerSource::DbPoll => &[tags::DB_TRIGGER],
            TriggerSource::MessageSubscribe => &[tags::MESSAGE_LISTENER, tags::MQTT_LISTENER],
            TriggerSource::MailPoll => &[tags::MAIL_TRIGGER],
        }
    }

    fn is_entry(&self, node: &Node) -> bool {
        if !self.trigger_tags().iter().any(|t| *t == node.kind()) {
            return false;
        }
        match self {
            TriggerSource::Webhook { name } => node.get_str("customName") == Some(name.as_str()),
            _ => true,
        }
    }

    /// Ids of the nodes a run starts from, in node order.
    ///
    /// Matching trigger nodes win; otherwise every node without incoming
    /// edges is a root. Empty means the run has no entry point.
    pub fn select_roots(&self, graph: &Graph) -> Vec<String> {
        let triggers: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| self.is_entry(n))
            .map(|n| n.id.clone())
            .collect();
        if !triggers.is_empty() {
            return triggers;
        }
        graph.roots().into_iter().map(|n| n.id.clone()).collect()
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Webhook { name } => write!(f, "webhook:{}", name),
            other => f.write_str(other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::graph::Edge;
    use serde_json::json;

    fn graph() -> Graph {
        Graph::new(
            vec![
                Node::new("start", "start"),
                Node::new("hook-a", "webhookTriggerNode").with("customName", json!("order")),
                Node::new("hook-b", "webhook-trigger").with("customName", json!("refund")),
                Node::new("cron", "schedule"),
                Node::new("sink", "display"),
            ],
            vec![
                Edge::new("start", "sink"),
                Edge::new("hook-a", "sink"),
                Edge::new("hook-b", "sink"),
                Edge::new("cron", "sink"),
            ],
        )
    }

    #[test]
    fn test_manual_uses_roots() {
        assert_eq!(
            TriggerSource::Manual.select_roots(&graph()),
            vec!["start", "hook-a", "hook-b", "cron"]
        );
    }

    #[test]
    fn test_webhook_matches_name() {
        assert_eq!(
            TriggerSource::webhook("order").select_roots(&graph()),
            vec!["hook-a"]
        );
    }

    #[test]
    fn test_webhook_without_match_falls_back_to_roots() {
        assert_eq!(TriggerSource::webhook("other").select_roots(&graph()).len(), 4);
    }

    #[test]
    fn test_scheduled_uses_schedule_nodes() {
        assert_eq!(TriggerSource::Scheduled.select_roots(&graph()), vec!["cron"]);
    }

    #[test]
    fn test_no_entry_point() {
        let cyclic = Graph::new(
            vec![Node::new("a", "display"), Node::new("b", "display")],
            vec![Edge::new("a", "b"), Edge::new("b", "a")],
        );
        assert!(TriggerSource::Manual.select_roots(&cyclic).is_empty());
    }

    #[test]
    fn test_serde_and_display() {
        let source: TriggerSource =
            serde_json::from_value(json!({"kind": "webhook", "name": "order"})).unwrap();
        assert_eq!(source, TriggerSource::webhook("order"));
        assert_eq!(source.to_string(), "webhook:order");
        assert_eq!(TriggerSource::DbPoll.to_string(), "db_poll");
    }
}
