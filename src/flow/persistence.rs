// SPDX-License-Identifier: MIT

//! Saved flows
//!
//! A saved flow is a `FlowRecord`: a name, the nodes and edges, and the
//! webhook name derived from the graph at save time. Two stores ship with
//! the crate: an in-memory one for tests and embedding, and a directory of
//! JSON files (`{dir}/{id}.json`) for the server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::{FlowError, Result};
use crate::flow::graph::{FlowRecord, FlowSummary, Graph};

#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Persist a new flow and return its record
    async fn save(&self, name: &str, graph: Graph) -> Result<FlowRecord>;

    /// Summaries, newest first
    async fn list(&self) -> Result<Vec<FlowSummary>>;

    async fn get(&self, id: &str) -> Result<Option<FlowRecord>>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Newest flow whose webhook name matches
    async fn find_by_webhook(&self, name: &str) -> Result<Option<FlowRecord>>;
}

fn new_record(name: &str, graph: Graph) -> Result<FlowRecord> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FlowError::store("flow name must not be empty"));
    }
    Ok(FlowRecord::new(name, graph))
}

fn newest_first(records: &mut [FlowRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<String, FlowRecord>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sorted(&self) -> Vec<FlowRecord> {
        let mut records: Vec<FlowRecord> = self.flows.read().await.values().cloned().collect();
        newest_first(&mut records);
        records
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn save(&self, name: &str, graph: Graph) -> Result<FlowRecord> {
        let record = new_record(name, graph)?;
        self.flows
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        log::info!("Saved flow '{}' ({})", record.name, record.id);
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<FlowSummary>> {
        Ok(self.sorted().await.iter().map(FlowRecord::summary).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<FlowRecord>> {
        Ok(self.flows.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.flows.write().await.remove(id).is_some())
    }

    async fn find_by_webhook(&self, name: &str) -> Result<Option<FlowRecord>> {
        Ok(self
            .sorted()
            .await
            .into_iter()
            .find(|r| r.webhook_name.as_deref() == Some(name)))
    }
}

/// One pretty-printed JSON file per flow
pub struct FileFlowStore {
    dir: PathBuf,
}

impl FileFlowStore {
    /// Open (and create if needed) the flows directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| FlowError::store(format!("failed to create flows directory: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        // Ids come from URLs; keep them inside the directory
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(FlowError::store(format!("invalid flow id '{}'", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    async fn read_all(&self) -> Result<Vec<FlowRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| FlowError::store(format!("failed to read flows directory: {}", e)))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<FlowRecord>(&data) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable flow file {}: {}", path.display(), e),
            }
        }

        newest_first(&mut records);
        Ok(records)
    }
}

/// Write to a temp file, then rename over the target
async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, data)
        .await
        .map_err(|e| FlowError::store(format!("failed to write temp file: {}", e)))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| FlowError::store(format!("failed to rename temp file: {}", e)))?;
    Ok(())
}

#[async_trait]
impl FlowStore for FileFlowStore {
    async fn save(&self, name: &str, graph: Graph) -> Result<FlowRecord> {
        let record = new_record(name, graph)?;
        let data = serde_json::to_vec_pretty(&record)?;
        atomic_write(&self.path_for(&record.id)?, &data).await?;
        log::info!("Saved flow '{}' to {}", record.name, self.dir.display());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<FlowSummary>> {
        Ok(self
            .read_all()
            .await?
            .iter()
            .map(FlowRecord::summary)
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<FlowRecord>> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_webhook(&self, name: &str) -> Result<Option<FlowRecord>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|r| r.webhook_name.as_deref() == Some(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::graph::{Edge, Node};
    use serde_json::json;

    fn webhook_graph(name: &str) -> Graph {
        Graph::new(
            vec![
                Node::new("hook", "webhook-trigger").with("customName", json!(name)),
                Node::new("out", "display"),
            ],
            vec![Edge::new("hook", "out")],
        )
    }

    async fn exercise(store: &dyn FlowStore) {
        let first = store.save("Orders", webhook_graph("order")).await.unwrap();
        assert_eq!(first.webhook_name.as_deref(), Some("order"));

        let second = store.save("Plain", Graph::default()).await.unwrap();
        assert!(second.webhook_name.is_none());

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);

        let loaded = store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded, first);

        let found = store.find_by_webhook("order").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(store.find_by_webhook("refund").await.unwrap().is_none());

        assert!(store.delete(&first.id).await.unwrap());
        assert!(!store.delete(&first.id).await.unwrap());
        assert!(store.get(&first.id).await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        exercise(&InMemoryFlowStore::new()).await;
    }

    #[tokio::test]
    async fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFlowStore::new(dir.path().join("flows")).unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let store = InMemoryFlowStore::new();
        let err = store.save("  ", Graph::default()).await.unwrap_err();
        assert!(matches!(err, FlowError::Store(_)));
    }

    #[tokio::test]
    async fn test_file_store_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFlowStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        store.save("Kept", Graph::default()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Kept");
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFlowStore::new(dir.path()).unwrap();
        assert!(store.get("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_webhook_lookup_prefers_newest() {
        let store = InMemoryFlowStore::new();
        store.save("Old", webhook_graph("order")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = store.save("New", webhook_graph("order")).await.unwrap();

        let found = store.find_by_webhook("order").await.unwrap().unwrap();
        assert_eq!(found.id, newer.id);
    }
}
