//! Human-readable rendering of tool result data.
//!
//! Each known tool renders to a block that starts with a fixed marker.
//! The response synthesizer locates fragments by these markers, so they
//! must stay stable.

use careclaw_core::tool::names;
use serde_json::Value;

use crate::legal_risk::RiskLevel;

pub const DIAGNOSIS_MARKER: &str = "SUGERENCIA DIAGNÓSTICA";
pub const LEGAL_RISK_MARKER: &str = "EVALUACIÓN DE RIESGO LEGAL";
pub const PRIOR_VISITS_MARKER: &str = "VISITAS ANTERIORES";

/// Render a tool's `data` payload as text.
pub fn format_tool_result(data: &Value) -> String {
    if data.is_null() || data.as_object().is_some_and(|o| o.is_empty()) {
        return "No se obtuvo resultado de la herramienta.".into();
    }

    match data["tool"].as_str().unwrap_or("desconocida") {
        names::DIAGNOSIS_SUGGESTION => format_diagnosis(&data["diagnosis"]),
        names::LEGAL_RISK_EVALUATION => format_legal_risk(&data["assessment"]),
        names::PRIOR_VISIT_RECALL => format_prior_visits(&data["prior_visits"]),
        other => format!(
            "Resultado de {other}:\n{}",
            serde_json::to_string_pretty(data).unwrap_or_default()
        ),
    }
}

fn str_list(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn format_diagnosis(diagnosis: &Value) -> String {
    let principal = diagnosis["principal"].as_str().unwrap_or("No determinado");
    let confidence = diagnosis["confidence"].as_f64().unwrap_or(0.0) * 100.0;
    format!(
        "📋 {DIAGNOSIS_MARKER} ({confidence:.0}% confianza):\n\
         Principal: {principal}\n\
         Secundarios: {}\n\
         Referencias: {}",
        str_list(&diagnosis["secondary"]).join(", "),
        str_list(&diagnosis["references"]).join(", "),
    )
}

fn format_legal_risk(assessment: &Value) -> String {
    let level = serde_json::from_value::<RiskLevel>(assessment["level"].clone())
        .map(|l| l.label())
        .unwrap_or("DESCONOCIDO");
    let bullets = |key: &str| -> String {
        str_list(&assessment[key])
            .iter()
            .map(|item| format!("\n- {item}"))
            .collect()
    };
    format!(
        "⚖️ {LEGAL_RISK_MARKER} - NIVEL {level}:\n\
         Riesgos identificados:{}\n\
         Recomendaciones:{}",
        bullets("risks"),
        bullets("recommendations"),
    )
}

fn format_prior_visits(visits: &Value) -> String {
    let patient = visits["patient_id"].as_str().unwrap_or_default();
    let records = visits["records"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    if records.is_empty() {
        return format!("📅 No se encontraron visitas anteriores para el paciente {patient}");
    }

    let total = visits["total_found"].as_u64().unwrap_or(records.len() as u64);
    let mut text = format!("📅 {PRIOR_VISITS_MARKER} ({total}):");
    for (i, visit) in records.iter().enumerate() {
        let field = |k: &str| visit[k].as_str().unwrap_or_default().to_string();
        text.push_str(&format!(
            "\n{}. {} - {}\n   Dx: {}\n   Tx: {}\n",
            i + 1,
            field("date"),
            field("reason"),
            field("diagnosis"),
            field("treatment"),
        ));
    }
    text
}
