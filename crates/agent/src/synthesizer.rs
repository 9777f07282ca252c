//! Deterministic, role-templated response assembly.
//!
//! The synthesizer reads the rendered tool output recorded as
//! Observation entries in the working memory, pulls out the fragments it
//! knows by marker, and builds the reply with the role's template.

use careclaw_core::role::{DetailLevel, ResponseStyle, RolePolicy};
use careclaw_tools::format::{DIAGNOSIS_MARKER, LEGAL_RISK_MARKER, PRIOR_VISITS_MARKER};

use crate::context::{TraceKind, WorkingMemory};

/// Everything a reply is built from.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub policy: &'a RolePolicy,
    pub patient_name: &'a str,
    pub trace: &'a WorkingMemory,
    /// Iterations ran out without a finalize signal.
    pub emergency: bool,
}

#[derive(Debug, Default)]
struct Fragments<'a> {
    diagnoses: Vec<&'a str>,
    legal_risks: Vec<&'a str>,
    prior_visits: Vec<&'a str>,
}

impl<'a> Fragments<'a> {
    fn collect(trace: &'a WorkingMemory) -> Self {
        let mut fragments = Self::default();
        for text in trace.entries(TraceKind::Observation) {
            if text.contains(DIAGNOSIS_MARKER) {
                push_unique(&mut fragments.diagnoses, text);
            }
            if text.contains(LEGAL_RISK_MARKER) {
                push_unique(&mut fragments.legal_risks, text);
            }
            if text.contains(PRIOR_VISITS_MARKER) {
                push_unique(&mut fragments.prior_visits, text);
            }
        }
        fragments
    }
}

/// Repeated runs of the same tool with the same inputs render identically.
fn push_unique<'a>(list: &mut Vec<&'a str>, text: &'a str) {
    if !list.contains(&text) {
        list.push(text);
    }
}

/// Build the reply text.
pub fn synthesize(input: &SynthesisInput<'_>) -> String {
    let style = input.policy.response_style;
    let intro = match style {
        ResponseStyle::Simplified => format!("Hola {}, respecto a tu consulta:", input.patient_name),
        ResponseStyle::Structured => format!(
            "Información sobre el paciente {} para gestión administrativa:",
            input.patient_name
        ),
        ResponseStyle::Clinical => {
            format!("Respecto a la consulta del paciente {}:", input.patient_name)
        }
    };

    let fragments = Fragments::collect(input.trace);
    let mut parts = vec![intro.clone()];

    prior_visit_section(&mut parts, style, &fragments.prior_visits);
    if input.policy.detail_level == DetailLevel::High || style != ResponseStyle::Structured {
        diagnosis_section(&mut parts, style, &fragments.diagnoses);
    }
    if style != ResponseStyle::Simplified {
        legal_section(&mut parts, style, &fragments.legal_risks);
    }

    if parts.len() <= 1 || input.emergency {
        parts = vec![intro];
        parts.extend(fallback(style).iter().map(|line| line.to_string()));
    }

    parts.push(closing(style).to_string());
    parts.join("\n")
}

fn prior_visit_section(parts: &mut Vec<String>, style: ResponseStyle, visits: &[&str]) {
    if visits.is_empty() {
        return;
    }
    parts.push(match style {
        ResponseStyle::Simplified => "Basado en tus visitas anteriores:".to_string(),
        _ => "Basado en su historial de visitas:".to_string(),
    });
    for text in visits {
        // Header line skipped; the next three describe the latest visit.
        for line in text.lines().skip(1).take(3) {
            parts.push(format!("- {}", line.trim()));
        }
    }
}

fn diagnosis_section(parts: &mut Vec<String>, style: ResponseStyle, diagnoses: &[&str]) {
    for text in diagnoses {
        let principal = field(text, "Principal:");
        let secondary = field(text, "Secundarios:").filter(|s| !s.is_empty());

        if let Some(principal) = principal {
            parts.push(match style {
                ResponseStyle::Simplified => format!(
                    "El profesional de salud considera que podrías presentar {principal}."
                ),
                ResponseStyle::Structured => format!("Diagnóstico registrado: {principal}"),
                ResponseStyle::Clinical => {
                    format!("El diagnóstico principal sugerido es {principal}.")
                }
            });
        }

        match (style, secondary) {
            (ResponseStyle::Structured, Some(secondary)) => {
                parts.push(format!("Diagnósticos alternativos: {secondary}"));
            }
            (ResponseStyle::Clinical, Some(secondary)) => {
                parts.push(format!("También se deben considerar: {secondary}."));
            }
            _ => {}
        }
    }
}

fn legal_section(parts: &mut Vec<String>, style: ResponseStyle, risks: &[&str]) {
    let structured = style == ResponseStyle::Structured;
    for text in risks {
        let header = if text.contains("NIVEL ALTO") {
            if structured {
                "⚠️ ALERTA: Aspectos legales importantes a considerar:"
            } else {
                "⚠️ Es importante considerar los siguientes aspectos de riesgo legal:"
            }
        } else if text.contains("NIVEL MEDIO") {
            "Se deben tener en cuenta los siguientes aspectos legales:"
        } else if structured {
            "Consideraciones administrativas:"
        } else {
            "Desde el punto de vista legal, se recomienda:"
        };
        parts.push(header.to_string());

        if let Some((_, recommendations)) = text.split_once("Recomendaciones:") {
            parts.extend(
                recommendations
                    .lines()
                    .map(str::trim)
                    .filter(|line| line.starts_with('-'))
                    .map(str::to_string),
            );
        }
    }
}

/// Text after `label` on the first line that carries it.
fn field<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|line| line.split_once(label))
        .map(|(_, value)| value.trim())
}

fn fallback(style: ResponseStyle) -> &'static [&'static str] {
    match style {
        ResponseStyle::Simplified => &[
            "Con la información disponible, recomendaría:",
            "- Seguir las indicaciones de tu profesional de salud",
            "- Mantener un registro de tus síntomas",
            "- Consultar nuevamente si los síntomas persisten o empeoran",
        ],
        ResponseStyle::Structured => &[
            "Para la correcta gestión administrativa del caso, se sugiere:",
            "- Verificar la información completa del paciente",
            "- Programar seguimiento según protocolo",
            "- Actualizar registros con la información más reciente",
        ],
        ResponseStyle::Clinical => &[
            "Basado en la información proporcionada, recomiendo:",
            "- Realizar una evaluación clínica completa",
            "- Documentar exhaustivamente los hallazgos",
            "- Considerar las guías clínicas actualizadas para este caso",
            "\nPara un diagnóstico preciso, necesitaría más detalles sobre los síntomas específicos del paciente.",
        ],
    }
}

fn closing(style: ResponseStyle) -> &'static str {
    match style {
        ResponseStyle::Simplified => {
            "\nRecuerda que esta información no reemplaza la consulta con tu profesional de salud."
        }
        ResponseStyle::Structured => {
            "\nLa información proporcionada está sujeta a actualización en futuras visitas."
        }
        ResponseStyle::Clinical => {
            "\nEstoy disponible para asistir con cualquier otra consulta relacionada con este caso."
        }
    }
}
