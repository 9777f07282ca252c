//! Session repository: durable storage for exported sessions.
//!
//! The core never depends on which backend is behind this trait.
//! Implementations: in-memory (for testing) and JSON files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::role::Role;
use crate::session::{SessionExport, VisitStatus};

/// Criteria for listing stored sessions. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VisitStatus>,
}

impl SessionFilter {
    pub fn matches(&self, session: &SessionExport) -> bool {
        self.patient_id
            .as_ref()
            .is_none_or(|id| *id == session.patient.id)
            && self.role.is_none_or(|role| role == session.role)
            && self.status.is_none_or(|status| status == session.visit.status)
    }
}

/// The core SessionRepository trait.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Fetch a session by its key (the visit id).
    async fn get(&self, key: &str) -> Result<Option<SessionExport>, StorageError>;

    /// Insert or replace a session.
    async fn put(&self, session: SessionExport) -> Result<(), StorageError>;

    /// List sessions matching the filter, ordered by key.
    async fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionExport>, StorageError>;
}
