//! Session repository implementations for CareClaw.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileRepository;
pub use in_memory::InMemoryRepository;

#[cfg(test)]
pub(crate) mod fixtures {
    use careclaw_core::{
        AuditLog, PatientInfo, Role, SessionExport, SessionMetrics, VisitInfo, VisitStatus,
    };
    use chrono::Utc;

    pub fn session(visit_id: &str, patient_id: &str, role: Role) -> SessionExport {
        let now = Utc::now();
        SessionExport {
            patient: PatientInfo {
                id: patient_id.into(),
                name: "Ana Pérez".into(),
                attributes: Default::default(),
            },
            visit: VisitInfo {
                id: visit_id.into(),
                professional_id: "PRO-7".into(),
                reason: "Dolor cervical".into(),
                started_at: now,
                status: VisitStatus::Active,
            },
            role,
            history: AuditLog::new(),
            metrics: SessionMetrics::new(now),
            short_term_memory: Vec::new(),
            long_term_memory: Vec::new(),
        }
    }
}
