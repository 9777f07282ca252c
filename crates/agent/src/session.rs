//! The session aggregate: one per patient visit.
//!
//! A [`SessionContext`] owns the role, patient and visit records, the
//! two-tier memory store, the audit log and the usage metrics. Every
//! state change goes through it so that each one lands in the audit log
//! exactly once.

use std::collections::BTreeSet;
use std::sync::Arc;

use careclaw_core::block::{Actor, MemoryBlock, Priority};
use careclaw_core::event::{AuditLog, Event, EventKind, EventOrigin, EventSink};
use careclaw_core::role::{Role, RolePolicy};
use careclaw_core::session::{PatientInfo, SessionExport, SessionMetrics, VisitInfo, VisitStatus};
use careclaw_core::tool::names;
use careclaw_tools::format_tool_result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::context::{MemoryStore, estimate_tokens};

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub patient_id: String,
    pub patient_name: String,
    pub visit_id: String,
    pub professional_id: String,
    pub visit_reason: String,
    pub role: Role,
    /// Extra patient data (age, allergies, ...).
    pub attributes: Map<String, Value>,
}

impl SessionParams {
    pub fn new(
        patient_id: impl Into<String>,
        patient_name: impl Into<String>,
        visit_id: impl Into<String>,
        professional_id: impl Into<String>,
        visit_reason: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            patient_name: patient_name.into(),
            visit_id: visit_id.into(),
            professional_id: professional_id.into(),
            visit_reason: visit_reason.into(),
            role,
            attributes: Map::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }
}

pub struct SessionContext {
    patient: PatientInfo,
    visit: VisitInfo,
    role: Role,
    history: AuditLog,
    metrics: SessionMetrics,
    memory: MemoryStore,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl SessionContext {
    /// Open a session and record its start.
    pub fn new(params: SessionParams) -> Self {
        let now = Utc::now();
        let mut session = Self {
            patient: PatientInfo {
                id: params.patient_id,
                name: params.patient_name,
                attributes: params.attributes,
            },
            visit: VisitInfo {
                id: params.visit_id,
                professional_id: params.professional_id,
                reason: params.visit_reason,
                started_at: now,
                status: VisitStatus::Active,
            },
            role: params.role,
            history: AuditLog::new(),
            metrics: SessionMetrics::new(now),
            memory: MemoryStore::new(),
            sinks: Vec::new(),
        };

        info!(
            visit_id = %session.visit.id,
            patient_id = %session.patient.id,
            role = %session.role,
            "Session opened"
        );

        let metadata = object(json!({
            "patient_id": session.patient.id,
            "visit_id": session.visit.id,
            "visit_reason": session.visit.reason,
        }));
        session.record(
            EventOrigin::System,
            EventKind::Lifecycle,
            json!("Inicio de sesión"),
            metadata,
        );
        session
    }

    /// Rebuild a session from an export without recording anything.
    pub fn import(export: SessionExport) -> Self {
        Self {
            patient: export.patient,
            visit: export.visit,
            role: export.role,
            history: export.history,
            metrics: export.metrics,
            memory: MemoryStore::from_parts(export.short_term_memory, export.long_term_memory),
            sinks: Vec::new(),
        }
    }

    pub fn export(&self) -> SessionExport {
        let (short_term, long_term) = self.memory.raw_parts();
        SessionExport {
            patient: self.patient.clone(),
            visit: self.visit.clone(),
            role: self.role,
            history: self.history.clone(),
            metrics: self.metrics.clone(),
            short_term_memory: short_term.to_vec(),
            long_term_memory: long_term.to_vec(),
        }
    }

    pub fn to_json(&self) -> careclaw_core::Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Parse an exported session. Only schema mismatches are rejected.
    pub fn from_json(json: &str) -> careclaw_core::Result<Self> {
        let export: SessionExport = serde_json::from_str(json)?;
        Ok(Self::import(export))
    }

    /// Forward a copy of every future event to `sink`.
    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    // ── Accessors ──

    pub fn key(&self) -> &str {
        &self.visit.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn policy(&self) -> RolePolicy {
        self.role.policy()
    }

    pub fn patient(&self) -> &PatientInfo {
        &self.patient
    }

    pub fn visit(&self) -> &VisitInfo {
        &self.visit
    }

    pub fn history(&self) -> &AuditLog {
        &self.history
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Short-term blocks, oldest first.
    pub fn short_term(&self) -> Vec<MemoryBlock> {
        self.memory.short_term()
    }

    /// Long-term blocks, oldest first.
    pub fn long_term(&self) -> Vec<MemoryBlock> {
        self.memory.long_term()
    }

    // ── State changes ──

    /// Append an audit event. The session role is always added to the
    /// metadata unless the caller set one.
    pub fn record(
        &mut self,
        origin: EventOrigin,
        kind: EventKind,
        content: Value,
        mut metadata: Map<String, Value>,
    ) -> &Event {
        metadata
            .entry("role")
            .or_insert_with(|| json!(self.role.as_str()));

        let event = self.history.append(origin, kind, content, metadata);
        self.metrics.updated_at = event.timestamp;
        if kind == EventKind::ToolUse {
            self.metrics.tool_uses += 1;
        }
        for sink in &self.sinks {
            sink.record(&self.visit.id, event);
        }
        event
    }

    /// Create a memory block and store it.
    ///
    /// The block always goes to short-term memory. It also goes to
    /// long-term memory when the role keeps one and the block was written
    /// by a professional, is high priority, or the session belongs to a
    /// health professional.
    pub fn add_block(
        &mut self,
        actor: Actor,
        text: impl Into<String>,
        priority: Priority,
    ) -> MemoryBlock {
        let text = text.into();
        let policy = self.policy();
        self.metrics.blocks_created += 1;

        let block = MemoryBlock {
            id: self.metrics.blocks_created,
            timestamp: Utc::now(),
            actor,
            priority,
            estimated_cost: estimate_tokens(&text),
            text,
            visit_id: self.visit.id.clone(),
        };

        let to_long_term = policy.use_long_term_memory
            && (actor == Actor::Professional
                || priority == Priority::High
                || self.role == Role::HealthProfessional);

        self.memory.insert(block.clone(), to_long_term, &policy);
        self.metrics.memory_cost += u64::from(block.estimated_cost);

        debug!(
            block_id = block.id,
            actor = %actor,
            priority = %priority,
            cost = block.estimated_cost,
            long_term = to_long_term,
            "Memory block added"
        );

        let metadata = object(json!({
            "actor": actor.as_str(),
            "priority": priority.as_str(),
            "block_id": block.id,
        }));
        self.record(
            EventOrigin::Memory,
            EventKind::MemoryBlock,
            json!(block.text),
            metadata,
        );
        block
    }

    /// Blocks worth passing downstream under `max_budget`, oldest first.
    pub fn filter_relevant(&mut self, max_budget: u32) -> Vec<MemoryBlock> {
        let selection = self.memory.filter_relevant(&self.policy(), max_budget);
        self.metrics.consumed_cost += selection.total_cost;
        selection.blocks
    }

    /// Stamp the visit status and compute the session duration.
    pub fn close(&mut self, status: VisitStatus) {
        self.visit.status = status;
        self.record(
            EventOrigin::System,
            EventKind::Lifecycle,
            json!(format!("Fin de sesión: {status}")),
            Map::new(),
        );

        let ended_at = Utc::now();
        let duration = ended_at - self.metrics.started_at;
        self.metrics.ended_at = Some(ended_at);
        self.metrics.duration_ms = Some(duration.num_milliseconds());

        info!(
            visit_id = %self.visit.id,
            status = %status,
            duration_ms = duration.num_milliseconds(),
            "Session closed"
        );
    }

    // ── Derived views ──

    /// The last `limit` events; all of them when `limit` is zero.
    pub fn recent_history(&self, limit: usize) -> &[Event] {
        self.history.recent(limit)
    }

    /// Names of every tool executed in this session.
    pub fn used_tools(&self) -> BTreeSet<String> {
        self.history
            .iter()
            .filter(|e| e.kind == EventKind::ToolUse)
            .filter_map(|e| e.metadata_str("tool_name"))
            .map(str::to_string)
            .collect()
    }

    /// Principal diagnosis from the most recent successful diagnosis run.
    pub fn last_diagnosis(&self) -> Option<String> {
        self.history
            .iter()
            .rev()
            .filter(|e| e.kind == EventKind::ToolUse)
            .filter(|e| e.metadata_str("tool_name") == Some(names::DIAGNOSIS_SUGGESTION))
            .find_map(|e| {
                e.content["data"]["diagnosis"]["principal"]
                    .as_str()
                    .map(str::to_string)
            })
    }

    /// The audit log as text, one entry per event.
    pub fn render_history(&self, include_metadata: bool) -> String {
        let mut lines = Vec::with_capacity(self.history.len());

        for event in self.history.iter() {
            let ts = clock(&event.timestamp);
            let origin = origin_label(event.origin);

            match event.kind {
                EventKind::Message => {
                    lines.push(format!("[{ts}] {origin}: {}", event.content_text()));
                }
                EventKind::ToolUse => {
                    let name = event.metadata_str("tool_name").unwrap_or("desconocida");
                    let body = match event.content["error"].as_str() {
                        Some(error) => format!("Error: {error}"),
                        None => format_tool_result(&event.content["data"]),
                    };
                    lines.push(format!("[{ts}] HERRAMIENTA {name}:\n{body}"));
                }
                EventKind::Response => {
                    if include_metadata {
                        if let Some(reasoning) = event.metadata_str("reasoning") {
                            lines.push(format!("[{ts}] {origin} (razonamiento): {reasoning}"));
                        }
                    }
                    lines.push(format!("[{ts}] {origin}: {}", event.content_text()));
                }
                EventKind::MemoryBlock => {
                    let actor = event.metadata_str("actor").unwrap_or("desconocido");
                    let priority = event.metadata_str("priority").unwrap_or("medium");
                    lines.push(format!(
                        "[{ts}] BLOQUE {} ({priority}): {}",
                        actor.to_uppercase(),
                        event.content_text()
                    ));
                }
                EventKind::Lifecycle | EventKind::Error => {
                    let kind = kind_label(event.kind);
                    if include_metadata {
                        lines.push(format!(
                            "[{ts}] {origin} ({kind}): {} - {}",
                            event.content_text(),
                            Value::Object(event.metadata.clone())
                        ));
                    } else {
                        lines.push(format!("[{ts}] {origin} ({kind}): {}", event.content_text()));
                    }
                }
            }
        }

        lines.join("\n")
    }

    /// Both memory tiers as text, oldest block first.
    pub fn render_memory(&self) -> String {
        let mut lines = vec!["=== MEMORIA CORTO PLAZO ===".to_string()];
        lines.extend(self.memory.short_term().iter().map(render_block));

        if self.policy().use_long_term_memory {
            lines.push("\n=== MEMORIA LARGO PLAZO ===".to_string());
            lines.extend(self.memory.long_term().iter().map(render_block));
        }

        lines.join("\n")
    }
}

/// Unwrap a `json!` object literal into its map.
pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn clock(ts: &DateTime<Utc>) -> String {
    ts.format("%H:%M:%S").to_string()
}

fn render_block(block: &MemoryBlock) -> String {
    format!(
        "[{}] {} ({}): {}",
        clock(&block.timestamp),
        block.actor.as_str().to_uppercase(),
        block.priority,
        block.text
    )
}

fn origin_label(origin: EventOrigin) -> &'static str {
    match origin {
        EventOrigin::User => "USER",
        EventOrigin::System => "SYSTEM",
        EventOrigin::Tool => "TOOL",
        EventOrigin::Assistant => "ASSISTANT",
        EventOrigin::Memory => "MEMORY",
    }
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Message => "message",
        EventKind::ToolUse => "tool_use",
        EventKind::Response => "response",
        EventKind::MemoryBlock => "memory_block",
        EventKind::Lifecycle => "lifecycle",
        EventKind::Error => "error",
    }
}
