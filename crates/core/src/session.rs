//! Session records: patient, visit, metrics and the exported session shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::block::MemoryBlock;
use crate::error::SessionError;
use crate::event::AuditLog;
use crate::role::Role;

/// The patient a session is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub id: String,
    pub name: String,
    /// Free-form attributes (age, allergies, chronic conditions, ...).
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Lifecycle state of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Active,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Active => "active",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(VisitStatus::Active),
            "completed" => Ok(VisitStatus::Completed),
            "cancelled" => Ok(VisitStatus::Cancelled),
            other => Err(SessionError::UnknownStatus(other.to_string())),
        }
    }
}

/// The visit a session belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitInfo {
    pub id: String,
    pub professional_id: String,
    pub reason: String,
    pub started_at: DateTime<Utc>,
    pub status: VisitStatus,
}

/// Usage counters for evaluation and auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Number of tool executions, failed ones included.
    pub tool_uses: u32,
    /// Cumulative estimated cost of every block added to memory.
    pub memory_cost: u64,
    /// Cumulative estimated cost returned by budget filtering.
    pub consumed_cost: u64,
    /// Blocks created so far; the next block id is this plus one.
    pub blocks_created: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl SessionMetrics {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            tool_uses: 0,
            memory_cost: 0,
            consumed_cost: 0,
            blocks_created: 0,
            started_at: now,
            updated_at: now,
            ended_at: None,
            duration_ms: None,
        }
    }
}

/// The serializable form of a whole session.
///
/// `import(export(s))` reproduces every field of this structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub patient: PatientInfo,
    pub visit: VisitInfo,
    pub role: Role,
    pub history: AuditLog,
    pub metrics: SessionMetrics,
    pub short_term_memory: Vec<MemoryBlock>,
    pub long_term_memory: Vec<MemoryBlock>,
}

impl SessionExport {
    /// Storage key for repositories.
    pub fn key(&self) -> &str {
        &self.visit.id
    }
}
