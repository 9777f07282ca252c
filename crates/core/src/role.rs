//! Roles and the static per-role policy table.
//!
//! The role of a session is fixed when the session is created. Every
//! behavior that varies by role (memory capacities, priority threshold,
//! allowed tools, iteration bound, response style) is read from the
//! [`RolePolicy`] returned by [`Role::policy`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::block::Priority;
use crate::error::ConfigurationError;
use crate::tool::names::{DIAGNOSIS_SUGGESTION, LEGAL_RISK_EVALUATION, PRIOR_VISIT_RECALL};

/// The role of the user interacting with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    HealthProfessional,
    Patient,
    AdminStaff,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::HealthProfessional, Role::Patient, Role::AdminStaff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::HealthProfessional => "health_professional",
            Role::Patient => "patient",
            Role::AdminStaff => "admin_staff",
        }
    }

    /// The static policy for this role.
    pub fn policy(&self) -> RolePolicy {
        match self {
            Role::HealthProfessional => PROFESSIONAL_POLICY,
            Role::Patient => PATIENT_POLICY,
            Role::AdminStaff => ADMIN_POLICY,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "health_professional" => Ok(Role::HealthProfessional),
            "patient" => Ok(Role::Patient),
            "admin_staff" => Ok(Role::AdminStaff),
            other => Err(ConfigurationError::UnknownRole(other.to_string())),
        }
    }
}

/// How much clinical detail a response may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Low,
    Medium,
    High,
}

/// Response template variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    /// Full clinical wording for professionals.
    Clinical,
    /// Plain language for patients.
    Simplified,
    /// Registry-style wording for administrative staff.
    Structured,
}

/// Static per-role configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RolePolicy {
    pub short_term_capacity: usize,
    pub long_term_capacity: usize,
    /// Blocks ranked below this are never returned by budget filtering.
    pub priority_threshold: Priority,
    pub use_long_term_memory: bool,
    pub allowed_tools: &'static [&'static str],
    /// Tools that must have run before the reasoning loop may finish.
    pub primary_tools: &'static [&'static str],
    pub max_iterations: u32,
    pub detail_level: DetailLevel,
    pub response_style: ResponseStyle,
    /// Whether the reasoning trace is attached to response events.
    pub show_reasoning: bool,
}

impl RolePolicy {
    pub fn allows_tool(&self, name: &str) -> bool {
        self.allowed_tools.contains(&name)
    }
}

pub const PROFESSIONAL_POLICY: RolePolicy = RolePolicy {
    short_term_capacity: 20,
    long_term_capacity: 100,
    priority_threshold: Priority::Low,
    use_long_term_memory: true,
    allowed_tools: &[DIAGNOSIS_SUGGESTION, LEGAL_RISK_EVALUATION, PRIOR_VISIT_RECALL],
    primary_tools: &[DIAGNOSIS_SUGGESTION, LEGAL_RISK_EVALUATION],
    max_iterations: 5,
    detail_level: DetailLevel::High,
    response_style: ResponseStyle::Clinical,
    show_reasoning: true,
};

pub const PATIENT_POLICY: RolePolicy = RolePolicy {
    short_term_capacity: 10,
    long_term_capacity: 0,
    priority_threshold: Priority::Medium,
    use_long_term_memory: false,
    allowed_tools: &[PRIOR_VISIT_RECALL],
    primary_tools: &[PRIOR_VISIT_RECALL],
    max_iterations: 3,
    detail_level: DetailLevel::Low,
    response_style: ResponseStyle::Simplified,
    show_reasoning: false,
};

pub const ADMIN_POLICY: RolePolicy = RolePolicy {
    short_term_capacity: 15,
    long_term_capacity: 50,
    priority_threshold: Priority::Medium,
    use_long_term_memory: true,
    allowed_tools: &[PRIOR_VISIT_RECALL, LEGAL_RISK_EVALUATION],
    primary_tools: &[PRIOR_VISIT_RECALL, LEGAL_RISK_EVALUATION],
    max_iterations: 4,
    detail_level: DetailLevel::Medium,
    response_style: ResponseStyle::Structured,
    show_reasoning: true,
};
