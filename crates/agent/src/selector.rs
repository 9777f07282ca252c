//! Tool selection rules.
//!
//! The selector decides which tools the reasoning loop runs in each
//! iteration, and with which arguments, from the message text and the
//! session's state. It is pure: the loop hands it everything it needs.

use careclaw_core::role::RolePolicy;
use careclaw_core::tool::{ToolCall, names};
use serde_json::json;

/// Everything the selector looks at for one iteration.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    pub message: &'a str,
    /// Tools the message names explicitly, already limited to the role.
    pub mentioned: &'a [&'static str],
    pub iteration: u32,
    pub policy: &'a RolePolicy,
    pub patient_id: &'a str,
    pub visit_reason: &'a str,
    pub last_diagnosis: Option<&'a str>,
}

impl SelectionInput<'_> {
    fn wants(&self, tool: &str, keywords: &[&str]) -> bool {
        if !self.policy.allows_tool(tool) {
            return false;
        }
        let lower = self.message.to_lowercase();
        self.mentioned.contains(&tool) || keywords.iter().any(|kw| lower.contains(kw))
    }
}

/// Chooses tool calls for an iteration.
pub trait ToolSelector: Send + Sync {
    /// Tools the message refers to by keyword.
    fn mentioned_tools(&self, message: &str) -> Vec<&'static str>;

    /// Tool calls for this iteration, in execution order.
    fn select(&self, input: &SelectionInput<'_>) -> Vec<ToolCall>;
}

const MENTION_KEYWORDS: [(&str, &[&str]); 3] = [
    (
        names::DIAGNOSIS_SUGGESTION,
        &["diagnóstico", "diagnostico", "diagnósticos", "diagnosticar"],
    ),
    (
        names::LEGAL_RISK_EVALUATION,
        &["riesgo", "legal", "consentimiento", "normativa"],
    ),
    (
        names::PRIOR_VISIT_RECALL,
        &["visita", "anterior", "historial", "previas"],
    ),
];

const HISTORY_KEYWORDS: [&str; 1] = ["historial"];
const SYMPTOM_KEYWORDS: [&str; 4] = ["dolor", "molestia", "síntoma", "sintoma"];
const TREATMENT_KEYWORDS: [&str; 4] = ["tratamiento", "terapia", "manipulación", "manipulacion"];

const COMMON_SYMPTOMS: [&str; 15] = [
    "dolor",
    "inflamación",
    "inflamacion",
    "rigidez",
    "debilidad",
    "entumecimiento",
    "limitación",
    "limitacion",
    "dificultad",
    "mareo",
    "cervical",
    "lumbar",
    "rodilla",
    "hombro",
    "cadera",
];

const COMMON_TREATMENTS: [&str; 20] = [
    "manipulación",
    "manipulacion",
    "movilización",
    "movilizacion",
    "ejercicios",
    "electroterapia",
    "ultrasonido",
    "masaje",
    "calor",
    "frío",
    "frio",
    "tracción",
    "traccion",
    "acupuntura",
    "láser",
    "laser",
    "tens",
    "vendaje",
    "kinesiotape",
    "estiramiento",
];

const SYMPTOM_WINDOW: usize = 20;
const TREATMENT_WINDOW: usize = 30;
const PRIOR_VISIT_LIMIT: u32 = 3;

/// The keyword-driven selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordToolSelector;

impl ToolSelector for KeywordToolSelector {
    fn mentioned_tools(&self, message: &str) -> Vec<&'static str> {
        let lower = message.to_lowercase();
        MENTION_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
            .map(|(tool, _)| *tool)
            .collect()
    }

    fn select(&self, input: &SelectionInput<'_>) -> Vec<ToolCall> {
        let mut calls = Vec::new();

        if input.iteration == 1 && input.wants(names::PRIOR_VISIT_RECALL, &HISTORY_KEYWORDS) {
            calls.push(ToolCall::new(
                names::PRIOR_VISIT_RECALL,
                json!({ "patient_id": input.patient_id, "limit": PRIOR_VISIT_LIMIT }),
            ));
        }

        if input.iteration <= 2 && input.wants(names::DIAGNOSIS_SUGGESTION, &SYMPTOM_KEYWORDS) {
            calls.push(ToolCall::new(
                names::DIAGNOSIS_SUGGESTION,
                json!({
                    "visit_reason": input.visit_reason,
                    "symptoms": extract_symptoms(input.message, input.visit_reason),
                    "history": [],
                }),
            ));
        }

        if input.iteration >= 2 && input.wants(names::LEGAL_RISK_EVALUATION, &TREATMENT_KEYWORDS)
        {
            calls.push(ToolCall::new(
                names::LEGAL_RISK_EVALUATION,
                json!({
                    "diagnosis": input.last_diagnosis.unwrap_or("No especificado"),
                    "proposed_treatment": extract_treatment(input.message),
                    "informed_consent": input.message.to_lowercase().contains("consentimiento"),
                    "special_conditions": [],
                }),
            ));
        }

        calls
    }
}

/// Symptom phrases around known symptom words, skipping negated ones.
/// Falls back to the visit reason when nothing is found.
pub fn extract_symptoms(message: &str, visit_reason: &str) -> Vec<String> {
    let lower: Vec<char> = message.to_lowercase().chars().collect();
    let mut found = Vec::new();

    for symptom in COMMON_SYMPTOMS {
        let Some(start) = find_chars(&lower, symptom) else {
            continue;
        };
        let len = symptom.chars().count();
        let context: String = window(&lower, start, len, SYMPTOM_WINDOW).iter().collect();
        let cleaned = context.replace(['.', ','], "").trim().to_string();

        if !cleaned.contains(&format!("no {symptom}")) && !cleaned.contains(&format!("sin {symptom}"))
        {
            found.push(cleaned);
        }
    }

    if found.is_empty() {
        found.push(visit_reason.to_string());
    }
    found
}

/// The original-case text around the first treatment word in the message.
pub fn extract_treatment(message: &str) -> String {
    let original: Vec<char> = message.chars().collect();
    let lower: Vec<char> = message.to_lowercase().chars().collect();

    // Lowercasing can change the char count; only then fall back to the
    // lowercased text for the window.
    let source = if original.len() == lower.len() {
        &original
    } else {
        &lower
    };

    for treatment in COMMON_TREATMENTS {
        if let Some(start) = find_chars(&lower, treatment) {
            let len = treatment.chars().count();
            let context: String = window(source, start, len, TREATMENT_WINDOW).iter().collect();
            return context.trim().to_string();
        }
    }

    "Tratamiento no especificado claramente".to_string()
}

/// Char index of the first occurrence of `needle` in `haystack`.
fn find_chars(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle.as_slice())
}

fn window(chars: &[char], start: usize, len: usize, margin: usize) -> &[char] {
    let from = start.saturating_sub(margin);
    let to = (start + len + margin).min(chars.len());
    &chars[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;
    use careclaw_core::role::Role;

    fn input<'a>(
        message: &'a str,
        mentioned: &'a [&'static str],
        iteration: u32,
        policy: &'a RolePolicy,
    ) -> SelectionInput<'a> {
        SelectionInput {
            message,
            mentioned,
            iteration,
            policy,
            patient_id: "P001",
            visit_reason: "Dolor cervical",
            last_diagnosis: None,
        }
    }

    fn names_of(calls: &[ToolCall]) -> Vec<&str> {
        calls.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn mentions_are_detected_by_keyword() {
        let selector = KeywordToolSelector;
        assert_eq!(
            selector.mentioned_tools("¿Cuál es el diagnóstico y el riesgo legal?"),
            vec![names::DIAGNOSIS_SUGGESTION, names::LEGAL_RISK_EVALUATION]
        );
        assert_eq!(
            selector.mentioned_tools("revisa su visita anterior"),
            vec![names::PRIOR_VISIT_RECALL]
        );
        assert!(selector.mentioned_tools("hola").is_empty());
    }

    #[test]
    fn first_iteration_professional() {
        let policy = Role::HealthProfessional.policy();
        let msg = "Revisa el historial, tiene dolor en el cuello";
        let calls = KeywordToolSelector.select(&input(msg, &[], 1, &policy));
        assert_eq!(
            names_of(&calls),
            vec![names::PRIOR_VISIT_RECALL, names::DIAGNOSIS_SUGGESTION]
        );
        assert_eq!(calls[0].arguments["limit"], 3);
        assert_eq!(calls[1].arguments["visit_reason"], "Dolor cervical");
    }

    #[test]
    fn legal_risk_only_from_second_iteration() {
        let policy = Role::HealthProfessional.policy();
        let msg = "Propongo terapia manual";
        assert!(KeywordToolSelector.select(&input(msg, &[], 1, &policy)).is_empty());

        let calls = KeywordToolSelector.select(&input(msg, &[], 2, &policy));
        assert_eq!(names_of(&calls), vec![names::LEGAL_RISK_EVALUATION]);
        assert_eq!(calls[0].arguments["diagnosis"], "No especificado");
        assert_eq!(calls[0].arguments["informed_consent"], false);
    }

    #[test]
    fn diagnosis_stops_after_second_iteration() {
        let policy = Role::HealthProfessional.policy();
        let calls = KeywordToolSelector.select(&input("dolor", &[], 3, &policy));
        assert!(calls.is_empty());
    }

    #[test]
    fn role_restrictions_apply_to_mentions_and_keywords() {
        let policy = Role::Patient.policy();
        let mentioned = [names::DIAGNOSIS_SUGGESTION];
        let calls = KeywordToolSelector.select(&input("dolor y diagnóstico", &mentioned, 1, &policy));
        assert!(calls.is_empty());

        let mentioned = [names::PRIOR_VISIT_RECALL];
        let calls = KeywordToolSelector.select(&input("mis visitas", &mentioned, 1, &policy));
        assert_eq!(names_of(&calls), vec![names::PRIOR_VISIT_RECALL]);
    }

    #[test]
    fn legal_risk_uses_last_diagnosis_and_consent() {
        let policy = Role::HealthProfessional.policy();
        let mut sel = input("Tratamiento con tracción, hay consentimiento", &[], 2, &policy);
        sel.last_diagnosis = Some("Lumbalgia mecánica");
        let calls = KeywordToolSelector.select(&sel);
        let legal = calls
            .iter()
            .find(|c| c.name == names::LEGAL_RISK_EVALUATION)
            .unwrap();
        assert_eq!(legal.arguments["diagnosis"], "Lumbalgia mecánica");
        assert_eq!(legal.arguments["informed_consent"], true);
    }

    #[test]
    fn symptoms_skip_negations_and_fall_back() {
        let found = extract_symptoms("Refiere rigidez matutina, sin mareo.", "Dolor lumbar");
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("rigidez matutina"));

        let fallback = extract_symptoms("Sin novedades", "Dolor lumbar");
        assert_eq!(fallback, vec!["Dolor lumbar".to_string()]);
    }

    #[test]
    fn symptom_window_handles_multibyte_text() {
        let found = extract_symptoms("ñññ dolor ááá", "x");
        assert_eq!(found, vec!["ñññ dolor ááá".to_string()]);
    }

    #[test]
    fn treatment_keeps_original_case() {
        let treatment = extract_treatment("Aplicaré Masaje descontracturante hoy");
        assert!(treatment.contains("Masaje"));
        assert_eq!(
            extract_treatment("nada concreto"),
            "Tratamiento no especificado claramente"
        );
    }
}
