//! Memory blocks: immutable, priority-tagged fragments of a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a block of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Patient,
    Professional,
    Companion,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Patient => "patient",
            Actor::Professional => "professional",
            Actor::Companion => "companion",
            Actor::System => "system",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency/relevance tag driving eviction and budget filtering.
///
/// Ordered so that `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used when comparing against a role's threshold.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fragment of conversation or injected record data.
///
/// Blocks are only created through the memory store and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    /// Strictly increasing within a session.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub priority: Priority,
    pub text: String,
    /// Cost from the token estimator.
    pub estimated_cost: u32,
    pub visit_id: String,
}

impl MemoryBlock {
    pub fn is_high(&self) -> bool {
        self.priority == Priority::High
    }

    /// Sort key for recency: timestamp first, id breaks ties.
    pub fn recency_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.id)
    }
}
