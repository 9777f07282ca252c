//! Diagnosis suggestion: keyword lookup against a small reference table.
//!
//! The table covers the three most common physiotherapy complaints. Any
//! other reason yields "No determinado" with 50% confidence.

use careclaw_core::error::ToolError;
use careclaw_core::tool::{Tool, ToolResult, names};
use serde::{Deserialize, Serialize};

use crate::format::format_tool_result;
use crate::string_list;

pub struct DiagnosisSuggestionTool;

/// Suggested diagnoses with confidence and supporting references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisSuggestion {
    pub principal: String,
    pub secondary: Vec<String>,
    pub confidence: f64,
    pub references: Vec<String>,
}

struct Entry {
    keyword: &'static str,
    principal: &'static str,
    secondary: [&'static str; 2],
    confidence: f64,
    references: [&'static str; 2],
}

const TABLE: [Entry; 3] = [
    Entry {
        keyword: "dolor cervical",
        principal: "Cervicalgia mecánica",
        secondary: ["Contractura muscular", "Hernia discal cervical"],
        confidence: 0.85,
        references: ["Guía Clínica Cervicalgia 2024", "Manual de Fisioterapia 2023"],
    },
    Entry {
        keyword: "dolor lumbar",
        principal: "Lumbalgia inespecífica",
        secondary: ["Síndrome facetario", "Discopatía"],
        confidence: 0.78,
        references: ["Protocolo Lumbalgia MINSAL 2024", "European Spine Journal 2023"],
    },
    Entry {
        keyword: "dolor rodilla",
        principal: "Condropatía rotuliana",
        secondary: ["Tendinopatía", "Lesión meniscal"],
        confidence: 0.82,
        references: ["JOSPT Guidelines 2024", "Revista Fisioterapia 2022"],
    },
];

/// First table entry whose keyword appears in the reason or any symptom.
pub fn suggest(visit_reason: &str, symptoms: &[String]) -> DiagnosisSuggestion {
    let reason = visit_reason.to_lowercase();
    let symptoms: Vec<String> = symptoms.iter().map(|s| s.to_lowercase()).collect();

    TABLE
        .iter()
        .find(|e| reason.contains(e.keyword) || symptoms.iter().any(|s| s.contains(e.keyword)))
        .map(|e| DiagnosisSuggestion {
            principal: e.principal.into(),
            secondary: e.secondary.iter().map(|s| s.to_string()).collect(),
            confidence: e.confidence,
            references: e.references.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap_or_else(|| DiagnosisSuggestion {
            principal: "No determinado".into(),
            secondary: Vec::new(),
            confidence: 0.5,
            references: Vec::new(),
        })
}

impl Tool for DiagnosisSuggestionTool {
    fn name(&self) -> &str {
        names::DIAGNOSIS_SUGGESTION
    }

    fn description(&self) -> &str {
        "Suggest likely clinical diagnoses from the visit reason, reported symptoms and medical history."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "visit_reason": {
                    "type": "string",
                    "description": "Main reason for the visit"
                },
                "symptoms": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Reported symptoms"
                },
                "history": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Relevant medical history"
                }
            },
            "required": ["visit_reason"]
        })
    }

    fn execute(&self, arguments: &serde_json::Value) -> Result<ToolResult, ToolError> {
        let visit_reason = arguments["visit_reason"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'visit_reason' argument".into()))?;
        let symptoms = string_list(arguments, "symptoms");
        let history = string_list(arguments, "history");

        let diagnosis = suggest(visit_reason, &symptoms);
        let data = serde_json::json!({
            "tool": names::DIAGNOSIS_SUGGESTION,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "diagnosis": diagnosis,
            "inputs": {
                "visit_reason": visit_reason,
                "symptoms": symptoms,
                "history": history,
            }
        });

        Ok(ToolResult {
            success: true,
            output: format_tool_result(&data),
            data,
        })
    }
}
