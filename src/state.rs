//! @acp:module "Application State"
//! @acp:summary "Shared state for the poll server: settings and the form/reply store"
//! @acp:domain daemon
//! @acp:layer service
//!
//! Manages the loaded poll settings and the JSON store of forms and
//! replies, and provides thread-safe access for request handlers. The
//! store write lock is the per-reply serialization point: handlers that
//! mutate a reply hold it for the whole engine call and the save.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::poll::settings::PollSettings;
use crate::poll::types::{Form, FormId, Reply, ReplyId};

/// Persisted forms and replies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollStore {
    #[serde(default)]
    pub forms: Vec<Form>,
    #[serde(default)]
    pub replies: Vec<Reply>,
    /// Id given to the next created reply
    #[serde(default)]
    pub next_reply_id: ReplyId,
}

impl PollStore {
    pub fn form(&self, id: FormId) -> Option<&Form> {
        self.forms.iter().find(|f| f.id == id)
    }

    pub fn reply(&self, id: ReplyId) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == id)
    }

    pub fn reply_mut(&mut self, id: ReplyId) -> Option<&mut Reply> {
        self.replies.iter_mut().find(|r| r.id == id)
    }

    /// Replies created from a form
    pub fn replies_of(&self, form: FormId) -> impl Iterator<Item = &Reply> {
        self.replies.iter().filter(move |r| r.form == form)
    }

    /// Reserve `count` consecutive reply ids, returning the first.
    ///
    /// `None` when the id space is exhausted; nothing is reserved then.
    pub fn allocate_reply_ids(&mut self, count: usize) -> Option<ReplyId> {
        let count = ReplyId::try_from(count).ok()?;
        let first = self.next_reply_id;
        self.next_reply_id = first.checked_add(count)?;
        Some(first)
    }

    /// Keep `next_reply_id` above every stored reply id
    fn normalize(&mut self) {
        let floor = self.replies.iter().map(|r| r.id.saturating_add(1)).max().unwrap_or(1);
        self.next_reply_id = self.next_reply_id.max(floor);
    }
}

/// Shared application state for the server
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Project root directory
    project_root: PathBuf,
    /// Where the store is saved, `None` for in-memory state
    store_path: Option<PathBuf>,
    /// Loaded engine settings
    settings: PollSettings,
    /// Loaded forms and replies
    store: RwLock<PollStore>,
}

impl AppState {
    /// Load settings and store from the project directory
    pub async fn load(project_root: &Path) -> anyhow::Result<Self> {
        // Load config
        let config_path = project_root.join(".poll.config.json");
        let settings = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path).await?;
            serde_json::from_str(&content)?
        } else {
            info!("No .poll.config.json found, using defaults");
            PollSettings::default()
        };

        // Load store
        let store_path = Self::store_path_in(project_root);
        let mut store: PollStore = if store_path.exists() {
            let content = tokio::fs::read_to_string(&store_path).await?;
            serde_json::from_str(&content)?
        } else {
            return Err(anyhow::anyhow!(
                "No store found at {}. Create it with at least {{\"forms\": []}}.",
                store_path.display()
            ));
        };
        store.normalize();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                project_root: project_root.to_path_buf(),
                store_path: Some(store_path),
                settings,
                store: RwLock::new(store),
            }),
        })
    }

    /// Create AppState for testing with an in-memory store
    #[cfg(test)]
    pub fn for_testing(mut store: PollStore, settings: PollSettings) -> Self {
        store.normalize();
        Self {
            inner: Arc::new(AppStateInner {
                project_root: PathBuf::from("."),
                store_path: None,
                settings,
                store: RwLock::new(store),
            }),
        }
    }

    fn store_path_in(project_root: &Path) -> PathBuf {
        project_root.join(".poll").join("poll.store.json")
    }

    /// Get project root
    pub fn project_root(&self) -> &Path {
        &self.inner.project_root
    }

    pub fn settings(&self) -> &PollSettings {
        &self.inner.settings
    }

    /// Get read access to the store
    pub async fn store(&self) -> tokio::sync::RwLockReadGuard<'_, PollStore> {
        self.inner.store.read().await
    }

    /// Get write access to the store
    pub async fn store_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, PollStore> {
        self.inner.store.write().await
    }

    /// Write the store to disk.
    ///
    /// The content goes to a sibling temp file first and is renamed over
    /// the store, so a failed write never leaves a truncated store behind.
    pub async fn save(&self, store: &PollStore) -> anyhow::Result<()> {
        let Some(ref path) = self.inner.store_path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(store)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        debug!(
            "Store saved to {} ({} replies)",
            path.display(),
            store.replies.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::cloner::clone_reply;
    use crate::poll::types::{LineKind, ReplyContext};
    use serde_json::json;

    fn write_store(root: &Path, store: &serde_json::Value) {
        let dir = root.join(".poll");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("poll.store.json"), store.to_string()).unwrap();
    }

    fn sample_store() -> serde_json::Value {
        json!({
            "forms": [{
                "id": 1,
                "name": "Birds",
                "lines": [
                    { "id": 10, "order": 1, "question": "Do you like swallows?", "kind": { "type": "BOOL" } },
                    {
                        "id": 11, "order": 2, "question": "Talk about them",
                        "kind": { "type": "STRING" },
                        "conditions": [{ "source": 10, "raw_answer": "1" }]
                    }
                ]
            }]
        })
    }

    #[tokio::test]
    async fn test_load_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppState::load(dir.path()).await;
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("No store found"));
    }

    #[tokio::test]
    async fn test_load_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path(), &sample_store());

        let state = AppState::load(dir.path()).await.unwrap();
        assert_eq!(state.settings(), &PollSettings::default());
        assert_eq!(state.project_root(), dir.path());

        let store = state.store().await;
        assert_eq!(store.forms.len(), 1);
        assert_eq!(store.forms[0].lines[1].conditions[0].source, 10);
        assert!(matches!(store.forms[0].lines[0].kind, LineKind::Bool));
        assert_eq!(store.next_reply_id, 1);
    }

    #[tokio::test]
    async fn test_load_config_overrides_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path(), &sample_store());
        std::fs::write(
            dir.path().join(".poll.config.json"),
            json!({ "labels": { "yes": "Oui" }, "stats_precision": 1 }).to_string(),
        )
        .unwrap();

        let state = AppState::load(dir.path()).await.unwrap();
        assert_eq!(state.settings().labels.yes, "Oui");
        assert_eq!(state.settings().labels.no, "No");
        assert_eq!(state.settings().stats_precision, 1);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path(), &sample_store());
        let state = AppState::load(dir.path()).await.unwrap();

        {
            let mut store = state.store_mut().await;
            let form = store.forms[0].clone();
            let id = store.allocate_reply_ids(1).unwrap();
            let reply = clone_reply(&form, id, &ReplyContext::default()).unwrap();
            store.replies.push(reply);
            state.save(&store).await.unwrap();
        }

        let reloaded = AppState::load(dir.path()).await.unwrap();
        let store = reloaded.store().await;
        assert_eq!(store.replies.len(), 1);
        assert_eq!(store.replies[0].lines.len(), 2);
        assert_eq!(store.next_reply_id, 2);
        assert!(!dir.path().join(".poll").join("poll.store.json.tmp").exists());
    }

    #[test]
    fn test_normalize_next_reply_id() {
        let mut store: PollStore = serde_json::from_value(json!({
            "replies": [{
                "id": 41, "name": "Old", "form": 1, "is_complete": false,
                "sections": [], "lines": []
            }],
            "next_reply_id": 3
        }))
        .unwrap();
        store.normalize();
        assert_eq!(store.next_reply_id, 42);
        assert_eq!(store.allocate_reply_ids(2), Some(42));
        assert_eq!(store.next_reply_id, 44);
    }

    #[test]
    fn test_allocate_reply_ids_overflow() {
        let mut store = PollStore::default();
        store.normalize();

        assert_eq!(store.allocate_reply_ids(usize::MAX), None);
        assert_eq!(store.next_reply_id, 1);

        store.next_reply_id = ReplyId::MAX;
        assert_eq!(store.allocate_reply_ids(1), None);
        assert_eq!(store.allocate_reply_ids(0), Some(ReplyId::MAX));
    }
}
