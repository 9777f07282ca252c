//! Built-in clinical tools for CareClaw.
//!
//! Tools give the reasoning loop its domain capabilities: suggest a
//! diagnosis, evaluate the legal risk of a treatment, and recall a
//! patient's prior visits. Every tool returns structured data plus a
//! human-readable rendering produced by [`format::format_tool_result`].

pub mod diagnosis;
pub mod format;
pub mod legal_risk;
pub mod prior_visits;

use std::sync::Arc;

use careclaw_core::tool::ToolRegistry;

pub use diagnosis::DiagnosisSuggestionTool;
pub use format::format_tool_result;
pub use legal_risk::LegalRiskEvaluationTool;
pub use prior_visits::{PriorVisit, PriorVisitCatalog, PriorVisitRecallTool};

/// Create a registry with all clinical tools, backed by the demo
/// prior-visit catalog.
pub fn default_registry() -> ToolRegistry {
    registry_with_catalog(Arc::new(PriorVisitCatalog::demo()))
}

/// Create a registry whose prior-visit tool reads from `catalog`.
pub fn registry_with_catalog(catalog: Arc<PriorVisitCatalog>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(DiagnosisSuggestionTool));
    registry.register(Box::new(LegalRiskEvaluationTool));
    registry.register(Box::new(PriorVisitRecallTool::new(catalog)));
    registry
}

/// Read an optional array-of-strings argument. Non-string items are skipped.
pub(crate) fn string_list(arguments: &serde_json::Value, key: &str) -> Vec<String> {
    arguments[key]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
