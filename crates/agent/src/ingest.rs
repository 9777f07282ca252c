//! Loading clinical-record data into a session.
//!
//! A [`VisitRecord`] is what an external record system knows about a
//! visit: the patient, the professional, earlier visits and the forms
//! filled in so far. Ingestion turns it into memory blocks so the
//! reasoning loop sees it as pre-existing context.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use careclaw_core::block::{Actor, Priority};
use careclaw_core::error::StorageError;
use careclaw_core::event::{EventKind, EventOrigin};
use careclaw_core::role::Role;
use careclaw_tools::PriorVisit;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::session::{SessionContext, SessionParams, object};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub visit: RecordVisit,
    pub patient: RecordPatient,
    pub professional: RecordProfessional,
    #[serde(default)]
    pub prior_visits: Vec<RecordPriorVisit>,
    /// Form name to field values.
    #[serde(default)]
    pub forms: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordVisit {
    pub id: String,
    pub date: String,
    pub status: String,
    pub reason: String,
    #[serde(default)]
    pub modality: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPatient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordProfessional {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub specialty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPriorVisit {
    pub id: String,
    pub date: String,
    pub reason: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
}

impl VisitRecord {
    /// Earlier visits in the shape the prior-visit tool reads, newest first.
    pub fn catalog_entry(&self) -> (String, Vec<PriorVisit>) {
        let mut visits: Vec<&RecordPriorVisit> = self.prior_visits.iter().collect();
        visits.sort_by(|a, b| b.date.cmp(&a.date));
        let visits = visits
            .into_iter()
            .map(|v| {
                PriorVisit::new(
                    v.date.get(..10).unwrap_or(&v.date),
                    &v.reason,
                    v.diagnosis.as_deref().unwrap_or(NOT_RECORDED),
                    v.treatment.as_deref().unwrap_or(NOT_RECORDED),
                    "",
                )
            })
            .collect();
        (self.patient.id.clone(), visits)
    }
}

const NOT_RECORDED: &str = "No registrado";

/// An external clinical-record system.
pub trait RecordSource: Send + Sync {
    fn fetch(&self, visit_id: &str) -> Result<VisitRecord, StorageError>;
}

/// A fixed set of records held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRecordSource {
    records: HashMap<String, VisitRecord>,
}

impl StaticRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: VisitRecord) {
        self.records.insert(record.visit.id.clone(), record);
    }

    pub fn with_record(mut self, record: VisitRecord) -> Self {
        self.insert(record);
        self
    }

    /// Two demo visits: VISITA123 (cervical pain) and VISITA456 (knee
    /// rehabilitation).
    pub fn demo() -> Self {
        let records = [
            json!({
                "visit": {
                    "id": "VISITA123",
                    "date": "2025-05-08T09:00:00.000Z",
                    "status": "activa",
                    "reason": "Dolor cervical con irradiación a miembro superior derecho",
                    "modality": "presencial"
                },
                "patient": {
                    "id": "PAC001",
                    "name": "Juan Pérez",
                    "age": 42,
                    "gender": "masculino",
                    "allergies": ["AINEs", "Penicilina"],
                    "chronic_conditions": ["Hipertensión arterial"]
                },
                "professional": {
                    "id": "PROF001",
                    "name": "Dra. María López",
                    "email": "maria.lopez@careclaw.example",
                    "specialty": "Fisioterapia"
                },
                "prior_visits": [
                    {
                        "id": "VISITA100",
                        "date": "2025-02-15T10:30:00.000Z",
                        "reason": "Dolor lumbar",
                        "diagnosis": "Lumbalgia mecánica",
                        "treatment": "Ejercicios de estabilización lumbar"
                    },
                    {
                        "id": "VISITA110",
                        "date": "2025-03-20T11:00:00.000Z",
                        "reason": "Seguimiento dolor lumbar",
                        "diagnosis": "Lumbalgia en remisión",
                        "treatment": "Continuar ejercicios y añadir actividad aeróbica suave"
                    }
                ],
                "forms": {
                    "anamnesis": {
                        "dolor_actual": "Dolor cervical que se irradia al brazo derecho desde hace 1 semana",
                        "intensidad_dolor": 7,
                        "factores_agravantes": "Movimientos del cuello, trabajar con ordenador",
                        "factores_alivio": "Reposo, calor local"
                    },
                    "exploracion_fisica": {
                        "movilidad_cervical": "Limitada en rotación derecha y lateroflexión derecha",
                        "fuerza_muscular": "Disminuida en deltoides y bíceps derecho (4/5)",
                        "sensibilidad": "Hipoestesia en cara lateral del brazo derecho"
                    }
                }
            }),
            json!({
                "visit": {
                    "id": "VISITA456",
                    "date": "2025-05-08T16:30:00.000Z",
                    "status": "programada",
                    "reason": "Rehabilitación post-quirúrgica rodilla",
                    "modality": "presencial"
                },
                "patient": {
                    "id": "PAC002",
                    "name": "Elena Gómez",
                    "age": 29,
                    "gender": "femenino"
                },
                "professional": {
                    "id": "PROF001",
                    "name": "Dra. María López",
                    "email": "maria.lopez@careclaw.example",
                    "specialty": "Fisioterapia"
                },
                "prior_visits": [
                    {
                        "id": "VISITA445",
                        "date": "2025-04-20T09:15:00.000Z",
                        "reason": "Evaluación pre-quirúrgica",
                        "diagnosis": "Rotura de LCA pendiente de cirugía",
                        "treatment": "Fortalecimiento previo a cirugía"
                    }
                ],
                "forms": {
                    "anamnesis": {
                        "intervencion_quirurgica": "Reconstrucción de LCA hace 2 semanas",
                        "dolor_actual": "Dolor moderado con inflamación",
                        "intensidad_dolor": 5,
                        "limitaciones_actuales": "No puede apoyar completamente, usa muletas"
                    }
                }
            }),
        ];

        Self::from_values(records)
    }

    /// Build a source from raw JSON records. Records that do not match
    /// the [`VisitRecord`] shape are logged and skipped.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut source = Self::new();
        for (index, value) in values.into_iter().enumerate() {
            let visit_id = value["visit"]["id"].as_str().unwrap_or("?").to_string();
            match serde_json::from_value::<VisitRecord>(value) {
                Ok(record) => source.insert(record),
                Err(e) => warn!(index, visit_id = %visit_id, error = %e, "Skipping malformed clinical record"),
            }
        }
        source
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for StaticRecordSource {
    fn fetch(&self, visit_id: &str) -> Result<VisitRecord, StorageError> {
        self.records
            .get(visit_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("visit {visit_id}")))
    }
}

/// Open a session for `role` from a record and ingest it.
pub fn new_session_from_record(record: &VisitRecord, role: Role) -> SessionContext {
    let attributes = object(json!({
        "age": record.patient.age,
        "gender": record.patient.gender,
        "allergies": record.patient.allergies,
        "chronic_conditions": record.patient.chronic_conditions,
    }));
    let params = SessionParams::new(
        &record.patient.id,
        &record.patient.name,
        &record.visit.id,
        &record.professional.id,
        &record.visit.reason,
        role,
    )
    .with_attributes(attributes);

    let mut session = SessionContext::new(params);
    ingest_record(&mut session, record);
    session
}

/// Add a record's prior visits and forms to the session as memory blocks.
pub fn ingest_record(session: &mut SessionContext, record: &VisitRecord) {
    for visit in &record.prior_visits {
        let text = format!(
            "Visita {}: {}. Diagnóstico: {}. Tratamiento: {}",
            visit.date,
            visit.reason,
            visit.diagnosis.as_deref().unwrap_or(NOT_RECORDED),
            visit.treatment.as_deref().unwrap_or(NOT_RECORDED),
        );
        session.add_block(Actor::System, text, Priority::Medium);
    }

    for (name, fields) in &record.forms {
        session.add_block(
            Actor::Professional,
            form_text(&format!("Formulario {name}"), fields),
            Priority::High,
        );
    }

    let forms: Vec<&String> = record.forms.keys().collect();
    let metadata = object(json!({
        "visit_id": record.visit.id,
        "visit_date": record.visit.date,
        "loaded_forms": forms,
    }));
    session.record(
        EventOrigin::System,
        EventKind::Lifecycle,
        json!("Datos cargados desde registro clínico"),
        metadata,
    );

    info!(
        visit_id = %record.visit.id,
        prior_visits = record.prior_visits.len(),
        forms = record.forms.len(),
        "Clinical record ingested"
    );
}

/// Pull the session's visit from `source` again and ingest only forms
/// that no earlier ingestion loaded. Returns how many forms were added.
///
/// Fetch failures are recorded as error events, never returned.
pub fn sync_record(session: &mut SessionContext, source: &dyn RecordSource) -> usize {
    let visit_id = session.visit().id.clone();
    let record = match source.fetch(&visit_id) {
        Ok(record) => record,
        Err(e) => {
            warn!(visit_id = %visit_id, error = %e, "Clinical record sync failed");
            session.record(
                EventOrigin::System,
                EventKind::Error,
                json!(format!("Error al sincronizar con registro clínico: {e}")),
                object(json!({ "visit_id": visit_id })),
            );
            return 0;
        }
    };

    let loaded = loaded_forms(session);
    let mut added = Vec::new();
    for (name, fields) in &record.forms {
        if loaded.contains(name) {
            continue;
        }
        session.add_block(
            Actor::Professional,
            form_text(&format!("Formulario {name} (actualización)"), fields),
            Priority::High,
        );
        added.push(name.clone());
    }

    session.record(
        EventOrigin::System,
        EventKind::Lifecycle,
        json!("Sincronización con registro clínico completada"),
        object(json!({ "visit_id": visit_id, "loaded_forms": added })),
    );
    added.len()
}

/// Form names listed by earlier ingestion events.
fn loaded_forms(session: &SessionContext) -> BTreeSet<String> {
    session
        .history()
        .iter()
        .filter(|e| e.kind == EventKind::Lifecycle)
        .filter_map(|e| e.metadata.get("loaded_forms").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn form_text(title: &str, fields: &Map<String, Value>) -> String {
    let mut text = format!("{title}: ");
    for (field, value) in fields {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.push_str(&format!("{field}: {value}. "));
    }
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_record(visit_id: &str) -> VisitRecord {
        StaticRecordSource::demo().fetch(visit_id).unwrap()
    }

    #[test]
    fn demo_records_parse() {
        let source = StaticRecordSource::demo();
        assert_eq!(source.len(), 2);
        assert_eq!(source.fetch("VISITA123").unwrap().prior_visits.len(), 2);
        assert_eq!(source.fetch("VISITA456").unwrap().patient.age, Some(29));
        assert!(matches!(
            source.fetch("VISITA999"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn malformed_records_are_skipped() {
        let good = json!({
            "visit": {
                "id": "V1",
                "date": "2025-05-08T09:00:00.000Z",
                "status": "activa",
                "reason": "Lumbalgia"
            },
            "patient": { "id": "PAC9", "name": "Eva" },
            "professional": { "id": "PROF9", "name": "Dr. Ruiz", "email": "ruiz@clinica.es" }
        });
        let broken = json!({ "visit": { "id": "V2" } });

        let source = StaticRecordSource::from_values([good, broken]);
        assert!(!source.is_empty());
        assert_eq!(source.len(), 1);
        assert!(source.fetch("V1").is_ok());
        assert!(matches!(source.fetch("V2"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn session_from_record_ingests_visits_and_forms() {
        let record = demo_record("VISITA123");
        let session = new_session_from_record(&record, Role::HealthProfessional);

        assert_eq!(session.patient().id, "PAC001");
        assert_eq!(session.patient().attributes["age"], 42);
        assert_eq!(session.visit().professional_id, "PROF001");

        let blocks = session.short_term();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].actor, Actor::System);
        assert_eq!(blocks[0].priority, Priority::Medium);
        assert!(blocks[0].text.starts_with("Visita 2025-02-15T10:30:00.000Z: Dolor lumbar."));
        assert!(blocks[2].text.starts_with("Formulario anamnesis: "));
        assert!(blocks[2].text.contains("intensidad_dolor: 7."));
        assert!(blocks[2].is_high());

        let event = session.history().events().last().unwrap();
        assert_eq!(
            event.metadata["loaded_forms"],
            json!(["anamnesis", "exploracion_fisica"])
        );
    }

    #[test]
    fn sync_adds_only_new_forms() {
        let mut record = demo_record("VISITA456");
        let mut session = new_session_from_record(&record, Role::HealthProfessional);
        let before = session.short_term().len();

        let mut fields = Map::new();
        fields.insert("tecnicas".into(), json!("Movilización pasiva"));
        record.forms.insert("plan_tratamiento".into(), fields);
        let source = StaticRecordSource::new().with_record(record);

        assert_eq!(sync_record(&mut session, &source), 1);
        let last = session.short_term().last().cloned().unwrap();
        assert_eq!(
            last.text,
            "Formulario plan_tratamiento (actualización): tecnicas: Movilización pasiva."
        );
        assert_eq!(session.short_term().len(), before + 1);

        // A second sync finds nothing new.
        assert_eq!(sync_record(&mut session, &source), 0);
    }

    #[test]
    fn sync_failure_is_recorded_not_raised() {
        let mut session = new_session_from_record(&demo_record("VISITA123"), Role::AdminStaff);
        let added = sync_record(&mut session, &StaticRecordSource::new());
        assert_eq!(added, 0);
        let event = session.history().events().last().unwrap();
        assert_eq!(event.kind, EventKind::Error);
        assert!(event.content_text().contains("VISITA123"));
    }

    #[test]
    fn catalog_entry_is_newest_first() {
        let (patient, visits) = demo_record("VISITA123").catalog_entry();
        assert_eq!(patient, "PAC001");
        assert_eq!(visits[0].date, "2025-03-20");
        assert_eq!(visits[1].diagnosis, "Lumbalgia mecánica");
    }
}
