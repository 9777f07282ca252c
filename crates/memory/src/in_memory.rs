//! In-memory repository: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use careclaw_core::error::StorageError;
use careclaw_core::repository::{SessionFilter, SessionRepository};
use careclaw_core::session::SessionExport;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A repository that keeps exported sessions in a map keyed by visit id.
/// Nothing survives the process.
pub struct InMemoryRepository {
    sessions: Arc<RwLock<BTreeMap<String, SessionExport>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<SessionExport>, StorageError> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn put(&self, session: SessionExport) -> Result<(), StorageError> {
        let key = session.key().to_string();
        self.sessions.write().await.insert(key, session);
        Ok(())
    }

    async fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionExport>, StorageError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}
