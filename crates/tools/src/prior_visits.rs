//! Prior visit recall: looks up a patient's earlier visits.
//!
//! Visits come from a [`PriorVisitCatalog`]. The demo catalog seeds three
//! patients; callers with access to a clinical record system build their
//! own catalog and hand it to [`PriorVisitRecallTool::new`].

use std::collections::HashMap;
use std::sync::Arc;

use careclaw_core::error::ToolError;
use careclaw_core::tool::{Tool, ToolResult, names};
use serde::{Deserialize, Serialize};

use crate::format::format_tool_result;

const DEFAULT_LIMIT: u64 = 3;

/// A single earlier visit as recorded by the clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorVisit {
    pub date: String,
    pub reason: String,
    pub diagnosis: String,
    pub treatment: String,
    #[serde(default)]
    pub evolution: String,
}

impl PriorVisit {
    pub fn new(
        date: &str,
        reason: &str,
        diagnosis: &str,
        treatment: &str,
        evolution: &str,
    ) -> Self {
        Self {
            date: date.into(),
            reason: reason.into(),
            diagnosis: diagnosis.into(),
            treatment: treatment.into(),
            evolution: evolution.into(),
        }
    }
}

/// Prior visits keyed by patient id, most recent first.
#[derive(Debug, Clone, Default)]
pub struct PriorVisitCatalog {
    visits: HashMap<String, Vec<PriorVisit>>,
}

impl PriorVisitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The demo catalog: P001 (2 visits), P002 (3 visits), P003 (none).
    pub fn demo() -> Self {
        Self::new()
            .with_patient(
                "P001",
                vec![
                    PriorVisit::new(
                        "2025-04-10",
                        "Dolor cervical agudo",
                        "Cervicalgia por estrés",
                        "Terapia manual + calor",
                        "Favorable con disminución de dolor en 70%",
                    ),
                    PriorVisit::new(
                        "2025-03-15",
                        "Control mensual",
                        "Cervicalgia en mejora",
                        "Ejercicios domiciliarios",
                        "Estable, continúa con ejercicios",
                    ),
                ],
            )
            .with_patient(
                "P002",
                vec![
                    PriorVisit::new(
                        "2025-05-01",
                        "Dolor lumbar irradiado",
                        "Lumbociática",
                        "TENS + ejercicios específicos",
                        "Mejora leve, persiste dolor irradiado",
                    ),
                    PriorVisit::new(
                        "2025-04-20",
                        "Evaluación inicial lumbar",
                        "Lumbalgia mecánica",
                        "Reposo relativo + antiinflamatorios",
                        "Sin cambios significativos",
                    ),
                    PriorVisit::new(
                        "2024-11-15",
                        "Molestias en hombro",
                        "Tendinitis supraespinoso",
                        "Ultrasonido + ejercicios",
                        "Resuelto",
                    ),
                ],
            )
            .with_patient("P003", Vec::new())
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>, visits: Vec<PriorVisit>) -> Self {
        self.insert(patient_id, visits);
        self
    }

    /// Replace the visits recorded for a patient.
    pub fn insert(&mut self, patient_id: impl Into<String>, visits: Vec<PriorVisit>) {
        self.visits.insert(patient_id.into(), visits);
    }

    /// Up to `limit` visits for the patient; empty when unknown.
    pub fn visits(&self, patient_id: &str, limit: usize) -> &[PriorVisit] {
        self.visits
            .get(patient_id)
            .map(|v| &v[..v.len().min(limit)])
            .unwrap_or(&[])
    }
}

pub struct PriorVisitRecallTool {
    catalog: Arc<PriorVisitCatalog>,
}

impl PriorVisitRecallTool {
    pub fn new(catalog: Arc<PriorVisitCatalog>) -> Self {
        Self { catalog }
    }
}

impl Tool for PriorVisitRecallTool {
    fn name(&self) -> &str {
        names::PRIOR_VISIT_RECALL
    }

    fn description(&self) -> &str {
        "Recall a patient's previous visits with their diagnoses and treatments."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "patient_id": { "type": "string" },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["patient_id"]
        })
    }

    fn execute(&self, arguments: &serde_json::Value) -> Result<ToolResult, ToolError> {
        let patient_id = arguments["patient_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'patient_id' argument".into()))?;
        let limit = arguments["limit"].as_u64().unwrap_or(DEFAULT_LIMIT);

        let records = self.catalog.visits(patient_id, limit as usize);
        let data = serde_json::json!({
            "tool": names::PRIOR_VISIT_RECALL,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "prior_visits": {
                "total_found": records.len(),
                "patient_id": patient_id,
                "records": records,
            },
            "inputs": {
                "patient_id": patient_id,
                "limit": limit,
            }
        });

        Ok(ToolResult {
            success: true,
            output: format_tool_result(&data),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_tool() -> PriorVisitRecallTool {
        PriorVisitRecallTool::new(Arc::new(PriorVisitCatalog::demo()))
    }

    #[test]
    fn recalls_demo_patient() {
        let result = demo_tool()
            .execute(&serde_json::json!({ "patient_id": "P002" }))
            .unwrap();
        assert_eq!(result.data["prior_visits"]["total_found"], 3);
        assert!(result.output.starts_with("📅 VISITAS ANTERIORES (3):"));
        assert!(result.output.contains("Dx: Lumbociática"));
    }

    #[test]
    fn limit_truncates() {
        let result = demo_tool()
            .execute(&serde_json::json!({ "patient_id": "P002", "limit": 1 }))
            .unwrap();
        assert_eq!(result.data["prior_visits"]["total_found"], 1);
    }

    #[test]
    fn unknown_patient_has_no_visits() {
        let result = demo_tool()
            .execute(&serde_json::json!({ "patient_id": "P999" }))
            .unwrap();
        assert!(result.success);
        assert_eq!(
            result.output,
            "📅 No se encontraron visitas anteriores para el paciente P999"
        );
    }

    #[test]
    fn custom_catalog_backs_the_tool() {
        let catalog = PriorVisitCatalog::new().with_patient(
            "X1",
            vec![PriorVisit::new("2025-01-02", "Esguince", "Esguince grado I", "Vendaje", "")],
        );
        let tool = PriorVisitRecallTool::new(Arc::new(catalog));
        let result = tool.execute(&serde_json::json!({ "patient_id": "X1" })).unwrap();
        assert!(result.output.contains("1. 2025-01-02 - Esguince"));
    }
}
