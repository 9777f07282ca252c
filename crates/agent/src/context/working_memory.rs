//! Working memory: the reasoning scratchpad for a single message.
//!
//! Stores the loop's reasoning trace (Thought/Action/Observation/Reflection)
//! and a record of every tool execution. Working memory is:
//!
//! - **Message-scoped**: created fresh for each processed message
//! - **Serializable**: can be exported to JSON for debugging
//! - **Renderable**: produces the reasoning text attached to response events
//!
//! The response synthesizer reads tool output back out of the
//! Observation entries, never out of free-form thoughts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Data Structures ───────────────────────────────────────────────────────

/// The loop's scratchpad while answering one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    /// Reasoning trace entries, in order.
    pub trace: Vec<TraceEntry>,

    /// Recorded tool executions.
    pub tool_results: Vec<ToolResultEntry>,

    /// Current iteration counter.
    pub iterations: u32,

    /// Maximum iterations allowed.
    pub max_iterations: u32,
}

/// A single entry in the reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The kind of reasoning trace entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TraceKind {
    /// Context the loop noted for itself.
    Thought,
    /// A tool invocation.
    Action,
    /// Rendered tool output (or the error that replaced it).
    Observation,
    /// The continuation decision after an iteration.
    Reflection,
}

impl TraceKind {
    fn label(&self) -> &'static str {
        match self {
            TraceKind::Thought => "Thought",
            TraceKind::Action => "Action",
            TraceKind::Observation => "Observation",
            TraceKind::Reflection => "Reflection",
        }
    }
}

/// A recorded tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEntry {
    pub tool_name: String,
    pub success: bool,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}

// ── Implementation ────────────────────────────────────────────────────────

impl WorkingMemory {
    /// Create a new empty working memory.
    pub fn new(max_iterations: u32) -> Self {
        Self {
            trace: Vec::new(),
            tool_results: Vec::new(),
            iterations: 0,
            max_iterations,
        }
    }

    // ── Trace recording ──

    pub fn add_thought(&mut self, thought: impl Into<String>) {
        self.push_trace(TraceKind::Thought, thought.into());
    }

    pub fn add_action(&mut self, action: impl Into<String>) {
        self.push_trace(TraceKind::Action, action.into());
    }

    pub fn add_observation(&mut self, observation: impl Into<String>) {
        self.push_trace(TraceKind::Observation, observation.into());
    }

    pub fn add_reflection(&mut self, reflection: impl Into<String>) {
        self.push_trace(TraceKind::Reflection, reflection.into());
    }

    fn push_trace(&mut self, kind: TraceKind, content: String) {
        self.trace.push(TraceEntry {
            kind,
            content,
            timestamp: Utc::now(),
        });
    }

    /// Contents of all entries of one kind, in order.
    pub fn entries(&self, kind: TraceKind) -> impl Iterator<Item = &str> {
        self.trace
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.content.as_str())
    }

    // ── Tool results ──

    /// Record a tool execution in the current iteration.
    pub fn add_tool_result(&mut self, tool_name: &str, success: bool) {
        self.tool_results.push(ToolResultEntry {
            tool_name: tool_name.to_string(),
            success,
            iteration: self.iterations,
            timestamp: Utc::now(),
        });
    }

    // ── Iteration tracking ──

    /// Increment the iteration counter. Returns `false` if max exceeded.
    pub fn tick(&mut self) -> bool {
        self.iterations += 1;
        self.iterations <= self.max_iterations
    }

    // ── Rendering ──

    /// Render the trace as the plain-text reasoning attached to
    /// response events.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.trace.is_empty() {
            out.push_str("## Reasoning Trace\n");
            for entry in &self.trace {
                out.push_str(&format!("[{}] {}\n", entry.kind.label(), entry.content));
            }
            out.push('\n');
        }

        if !self.tool_results.is_empty() {
            out.push_str("## Tool Results\n");
            for tr in &self.tool_results {
                let status = if tr.success { "✓" } else { "✗" };
                out.push_str(&format!(
                    "- {} {} (iteration {})\n",
                    status, tr.tool_name, tr.iteration
                ));
            }
            out.push('\n');
        }

        out.push_str(&format!(
            "Iterations: {}/{}\n",
            self.iterations, self.max_iterations
        ));

        out
    }

    /// Produce a one-line summary for logs.
    pub fn summarize(&self) -> String {
        let success = self.tool_results.iter().filter(|t| t.success).count();
        format!(
            "{} tool calls ({} successful). {} iterations used",
            self.tool_results.len(),
            success,
            self.iterations
        )
    }

    /// Check if working memory is empty (no traces, no tool results).
    pub fn is_empty(&self) -> bool {
        self.trace.is_empty() && self.tool_results.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_working_memory_is_empty() {
        let wm = WorkingMemory::new(5);
        assert!(wm.is_empty());
        assert_eq!(wm.iterations, 0);
        assert_eq!(wm.max_iterations, 5);
    }

    #[test]
    fn trace_recording() {
        let mut wm = WorkingMemory::new(5);
        wm.add_thought("Motivo de consulta: dolor cervical");
        wm.add_action("Ejecutando herramienta: diagnosis_suggestion");
        wm.add_observation("📋 SUGERENCIA DIAGNÓSTICA (85% confianza):");
        wm.add_reflection("Falta evaluar el riesgo legal");

        assert_eq!(wm.trace.len(), 4);
        assert_eq!(wm.trace[0].kind, TraceKind::Thought);
        assert_eq!(wm.trace[2].kind, TraceKind::Observation);
        assert_eq!(wm.entries(TraceKind::Observation).count(), 1);
    }

    #[test]
    fn tool_results_remember_iteration() {
        let mut wm = WorkingMemory::new(5);
        wm.tick();
        wm.add_tool_result("diagnosis_suggestion", true);
        wm.tick();
        wm.add_tool_result("legal_risk_evaluation", false);

        assert_eq!(wm.tool_results[0].iteration, 1);
        assert_eq!(wm.tool_results[1].iteration, 2);
        assert!(!wm.tool_results[1].success);
    }

    #[test]
    fn iteration_tracking() {
        let mut wm = WorkingMemory::new(3);
        assert!(wm.tick()); // 1
        assert!(wm.tick()); // 2
        assert!(wm.tick()); // 3
        assert!(!wm.tick()); // 4 > max
    }

    #[test]
    fn render_produces_readable_output() {
        let mut wm = WorkingMemory::new(5);
        wm.tick();
        wm.add_thought("Motivo de consulta: dolor lumbar");
        wm.add_action("Ejecutando herramienta: prior_visit_recall");
        wm.add_observation("📅 VISITAS ANTERIORES (3):");
        wm.add_tool_result("prior_visit_recall", true);

        let rendered = wm.render();
        assert!(rendered.contains("## Reasoning Trace"));
        assert!(rendered.contains("[Thought] Motivo de consulta"));
        assert!(rendered.contains("[Observation]"));
        assert!(rendered.contains("## Tool Results"));
        assert!(rendered.contains("✓ prior_visit_recall (iteration 1)"));
        assert!(rendered.ends_with("Iterations: 1/5\n"));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut wm = WorkingMemory::new(4);
        wm.add_thought("test thought");
        wm.add_tool_result("diagnosis_suggestion", true);

        let json = serde_json::to_string(&wm).unwrap();
        let deserialized: WorkingMemory = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.trace.len(), 1);
        assert_eq!(deserialized.tool_results.len(), 1);
        assert_eq!(deserialized.max_iterations, 4);
    }

    #[test]
    fn summarize_output() {
        let mut wm = WorkingMemory::new(5);
        wm.add_tool_result("diagnosis_suggestion", true);
        wm.add_tool_result("nonexistent", false);
        wm.iterations = 2;

        let summary = wm.summarize();
        assert!(summary.contains("2 tool calls (1 successful)"));
        assert!(summary.contains("2 iterations"));
    }
}
