//! Legal risk evaluation for a proposed treatment.

use careclaw_core::error::ToolError;
use careclaw_core::tool::{Tool, ToolResult, names};
use serde::{Deserialize, Serialize};

use crate::format::format_tool_result;
use crate::string_list;

const HIGH_RISK_TERMS: [&str; 5] = [
    "manipulación",
    "invasivo",
    "experimental",
    "aguja",
    "alta intensidad",
];
const MEDIUM_RISK_TERMS: [&str; 4] = ["movilización", "tracción", "eléctrico", "calor"];

const LEGAL_REFERENCE: &str = "Normativa de Práctica Clínica 2024";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Label used in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "BAJO",
            RiskLevel::Medium => "MEDIO",
            RiskLevel::High => "ALTO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub legal_reference: String,
}

pub fn evaluate(
    proposed_treatment: &str,
    informed_consent: bool,
    special_conditions: &[String],
) -> RiskAssessment {
    let treatment = proposed_treatment.to_lowercase();
    let mut level = RiskLevel::Low;
    let mut risks = Vec::new();
    let mut recommendations = Vec::new();

    if !informed_consent {
        level = RiskLevel::High;
        risks.push("Ausencia de consentimiento informado documentado".to_string());
        recommendations.push(
            "Obtener y documentar consentimiento informado antes de iniciar tratamiento"
                .to_string(),
        );
    }

    for term in HIGH_RISK_TERMS.iter().filter(|t| treatment.contains(**t)) {
        level = RiskLevel::High;
        risks.push(format!("Técnica de alto riesgo identificada: {term}"));
        recommendations.push(format!(
            "Documentar detalladamente procedimiento y respuesta para '{term}'"
        ));
    }

    if level != RiskLevel::High {
        for term in MEDIUM_RISK_TERMS.iter().filter(|t| treatment.contains(**t)) {
            level = RiskLevel::Medium;
            risks.push(format!("Técnica de riesgo moderado: {term}"));
            recommendations.push(format!(
                "Explicar beneficios y riesgos de '{term}' al paciente"
            ));
        }
    }

    for condition in special_conditions {
        risks.push(format!("Condición especial a considerar: {condition}"));
        recommendations.push(format!(
            "Documentar plan de manejo específico para: {condition}"
        ));
        if level == RiskLevel::Low {
            level = RiskLevel::Medium;
        }
    }

    RiskAssessment {
        level,
        risks,
        recommendations,
        legal_reference: LEGAL_REFERENCE.into(),
    }
}

pub struct LegalRiskEvaluationTool;

impl Tool for LegalRiskEvaluationTool {
    fn name(&self) -> &str {
        names::LEGAL_RISK_EVALUATION
    }

    fn description(&self) -> &str {
        "Evaluate the legal risk of a proposed treatment given the diagnosis, informed consent and special conditions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "diagnosis": { "type": "string" },
                "proposed_treatment": { "type": "string" },
                "informed_consent": { "type": "boolean" },
                "special_conditions": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["diagnosis", "proposed_treatment", "informed_consent"]
        })
    }

    fn execute(&self, arguments: &serde_json::Value) -> Result<ToolResult, ToolError> {
        let diagnosis = arguments["diagnosis"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'diagnosis' argument".into()))?;
        let proposed_treatment = arguments["proposed_treatment"].as_str().ok_or_else(|| {
            ToolError::InvalidArguments("Missing 'proposed_treatment' argument".into())
        })?;
        let informed_consent = arguments["informed_consent"].as_bool().ok_or_else(|| {
            ToolError::InvalidArguments("'informed_consent' must be a boolean".into())
        })?;
        let special_conditions = string_list(arguments, "special_conditions");

        let assessment = evaluate(proposed_treatment, informed_consent, &special_conditions);
        let data = serde_json::json!({
            "tool": names::LEGAL_RISK_EVALUATION,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "assessment": assessment,
            "inputs": {
                "diagnosis": diagnosis,
                "proposed_treatment": proposed_treatment,
                "informed_consent": informed_consent,
                "special_conditions": special_conditions,
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

    #[test]
    fn missing_consent_is_high() {
        let a = evaluate("ejercicios de estiramiento", false, &[]);
        assert_eq!(a.level, RiskLevel::High);
        assert_eq!(a.risks.len(), 1);
    }

    #[test]
    fn high_risk_technique_is_high() {
        let a = evaluate("Manipulación cervical", true, &[]);
        assert_eq!(a.level, RiskLevel::High);
        assert!(a.risks[0].contains("manipulación"));
    }

    #[test]
    fn medium_terms_skipped_once_high() {
        let a = evaluate("aguja seca y calor local", true, &[]);
        assert_eq!(a.level, RiskLevel::High);
        assert!(a.risks.iter().all(|r| !r.contains("moderado")));
    }

    #[test]
    fn medium_risk_technique() {
        let a = evaluate("tracción lumbar", true, &[]);
        assert_eq!(a.level, RiskLevel::Medium);
    }

    #[test]
    fn special_condition_raises_low_to_medium() {
        let a = evaluate("ejercicios", true, &["embarazo".into()]);
        assert_eq!(a.level, RiskLevel::Medium);
        assert_eq!(a.recommendations.len(), 1);

        let plain = evaluate("ejercicios", true, &[]);
        assert_eq!(plain.level, RiskLevel::Low);
        assert!(plain.risks.is_empty());
    }

    #[test]
    fn execute_renders_level() {
        let result = LegalRiskEvaluationTool
            .execute(&serde_json::json!({
                "diagnosis": "Cervicalgia mecánica",
                "proposed_treatment": "movilización suave",
                "informed_consent": true
            }))
            .unwrap();
        assert!(result.output.contains("EVALUACIÓN DE RIESGO LEGAL - NIVEL MEDIO"));
        assert_eq!(result.data["assessment"]["level"], "medium");
    }

    #[test]
    fn execute_rejects_non_boolean_consent() {
        let err = LegalRiskEvaluationTool
            .execute(&serde_json::json!({
                "diagnosis": "x",
                "proposed_treatment": "y",
                "informed_consent": "sí"
            }))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
