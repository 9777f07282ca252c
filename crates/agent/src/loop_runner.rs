//! The reasoning loop implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use careclaw_config::AppConfig;
use careclaw_core::block::{Actor, Priority};
use careclaw_core::error::ToolError;
use careclaw_core::event::{EventKind, EventOrigin};
use careclaw_core::role::{Role, RolePolicy};
use careclaw_core::tool::{ToolCall, ToolRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::classifier::{KeywordClassifier, PriorityClassifier};
use crate::context::WorkingMemory;
use crate::selector::{KeywordToolSelector, SelectionInput, ToolSelector};
use crate::session::{SessionContext, object};
use crate::synthesizer::{SynthesisInput, synthesize};

/// Filter budget used when neither options nor config set one.
pub const DEFAULT_MEMORY_BUDGET: u32 = 300;

/// Tool output shorter than this is not fed back into memory.
const FEEDBACK_MIN_CHARS: usize = 20;
const FEEDBACK_MAX_CHARS: usize = 200;

/// Per-agent overrides of the role policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOptions {
    pub max_iterations: Option<u32>,
    pub memory_budget: Option<u32>,
}

impl AgentOptions {
    /// Options for `role` from the `[roles.<role>]` table, falling back to
    /// the configured default budget.
    pub fn from_config(config: &AppConfig, role: Role) -> Self {
        let overrides = config.role_override(role);
        Self {
            max_iterations: overrides.max_iterations,
            memory_budget: overrides
                .memory_budget
                .or(Some(config.memory.default_budget)),
        }
    }
}

/// The result of one tool execution. Failures are carried in `error`,
/// never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub success: bool,
    pub output: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Where the loop is for the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Start,
    Iterating { iteration: u32 },
    Finalized(Termination),
}

/// How the loop reached [`LoopState::Finalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The continuation check signalled finalize.
    Signal,
    /// No tool was selected for the iteration.
    NoTools,
    /// The iteration bound ran out with no signal.
    Exhausted,
}

/// Outcome of the continuation check after an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    Finalize(String),
    Continue {
        missing: Option<&'static str>,
        note: String,
    },
}

/// Decide whether the loop may finish after `iteration`.
///
/// A role finishes once all its primary tools have run in the session,
/// or immediately when it may not run any tool. From iteration
/// `max_iterations - 1` on the loop always finishes.
pub fn decide_next(
    policy: &RolePolicy,
    used: &BTreeSet<String>,
    iteration: u32,
    max_iterations: u32,
) -> Continuation {
    if policy.allowed_tools.is_empty() {
        return Continuation::Finalize("El rol no tiene herramientas habilitadas.".into());
    }
    match missing_primary(policy, used) {
        None => Continuation::Finalize(format!(
            "Se han obtenido los resultados de {}.",
            policy.primary_tools.join(", ")
        )),
        Some(_) if iteration + 1 >= max_iterations => {
            Continuation::Finalize("Se ha recopilado suficiente información para responder.".into())
        }
        Some(missing) => Continuation::Continue {
            missing: Some(missing),
            note: format!("Falta ejecutar {missing} antes de responder."),
        },
    }
}

/// First primary tool of the role that has not run yet.
fn missing_primary(policy: &RolePolicy, used: &BTreeSet<String>) -> Option<&'static str> {
    policy
        .primary_tools
        .iter()
        .find(|tool| !used.contains(**tool))
        .copied()
}

/// Per-message scratch state threaded through the transitions.
struct Turn<'m> {
    message: &'m str,
    mentioned: Vec<&'static str>,
    trace: WorkingMemory,
}

/// The reasoning loop: tool selection, execution, continuation and
/// response synthesis for one session at a time.
pub struct AgentLoop {
    tools: Arc<ToolRegistry>,
    classifier: Box<dyn PriorityClassifier>,
    selector: Box<dyn ToolSelector>,
    options: AgentOptions,
}

impl AgentLoop {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            classifier: Box::new(KeywordClassifier::default()),
            selector: Box::new(KeywordToolSelector),
            options: AgentOptions::default(),
        }
    }

    /// Build a loop for `role` from application config.
    pub fn from_config(config: &AppConfig, tools: Arc<ToolRegistry>, role: Role) -> Self {
        Self::new(tools)
            .with_classifier(Box::new(KeywordClassifier::from_config(&config.classifier)))
            .with_options(AgentOptions::from_config(config, role))
    }

    pub fn with_options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn PriorityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_selector(mut self, selector: Box<dyn ToolSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn options(&self) -> AgentOptions {
        self.options
    }

    pub fn classifier(&self) -> &dyn PriorityClassifier {
        self.classifier.as_ref()
    }

    /// Effective iteration bound for a role.
    pub fn max_iterations(&self, policy: &RolePolicy) -> u32 {
        self.options.max_iterations.unwrap_or(policy.max_iterations)
    }

    pub fn memory_budget(&self) -> u32 {
        self.options.memory_budget.unwrap_or(DEFAULT_MEMORY_BUDGET)
    }

    /// Record the effective configuration on the session.
    pub fn attach(&self, session: &mut SessionContext) {
        let policy = session.policy();
        let metadata = object(json!({
            "max_iterations": self.max_iterations(&policy),
            "memory_budget": self.memory_budget(),
            "allowed_tools": policy.allowed_tools,
        }));
        session.record(
            EventOrigin::System,
            EventKind::Lifecycle,
            json!("Agente configurado"),
            metadata,
        );
    }

    /// Process one message and return the reply. Never fails: tool
    /// errors and exhausted iterations degrade the reply instead.
    pub fn process(&self, session: &mut SessionContext, message: &str) -> String {
        let policy = session.policy();
        let max_iterations = self.max_iterations(&policy);

        session.record(EventOrigin::User, EventKind::Message, json!(message), Map::new());

        let priority = self.classifier.classify(message);
        let actor = if session.role() == Role::Patient {
            Actor::Patient
        } else {
            Actor::Professional
        };
        session.add_block(actor, message, priority);

        info!(
            visit_id = %session.key(),
            role = %session.role(),
            priority = %priority,
            max_iterations,
            "Processing message"
        );

        let mentioned: Vec<&'static str> = self
            .selector
            .mentioned_tools(message)
            .into_iter()
            .filter(|tool| policy.allows_tool(tool))
            .collect();

        let mut turn = Turn {
            message,
            mentioned,
            trace: WorkingMemory::new(max_iterations),
        };
        turn.trace.add_thought(format!(
            "Mensaje recibido sobre paciente {} (ID: {}).",
            session.patient().name,
            session.patient().id
        ));
        turn.trace
            .add_thought(format!("Motivo de consulta: {}", session.visit().reason));

        let relevant = session.filter_relevant(self.memory_budget());
        if relevant.is_empty() {
            turn.trace
                .add_thought("No hay bloques de memoria relevantes para este contexto.");
        } else {
            turn.trace.add_thought(format!(
                "Utilizando {} bloques de memoria relevantes:",
                relevant.len()
            ));
            for block in relevant.iter().rev().take(3).rev() {
                let preview: String = block.text.chars().take(50).collect();
                turn.trace.add_thought(format!(
                    "  - {} ({}): {preview}...",
                    block.actor.as_str().to_uppercase(),
                    block.priority
                ));
            }
            if relevant.len() > 3 {
                turn.trace
                    .add_thought(format!("  - Y {} bloques más...", relevant.len() - 3));
            }
        }

        let mut state = LoopState::Start;
        let termination = loop {
            state = self.step(state, session, &mut turn);
            if let LoopState::Finalized(termination) = state {
                break termination;
            }
        };

        let emergency = termination == Termination::Exhausted;
        if emergency {
            turn.trace
                .add_reflection("Se alcanzó el límite de iteraciones sin respuesta definitiva.");
        }

        let response = synthesize(&SynthesisInput {
            policy: &policy,
            patient_name: &session.patient().name,
            trace: &turn.trace,
            emergency,
        });

        let mut metadata = Map::new();
        if policy.show_reasoning {
            metadata.insert("reasoning".into(), json!(turn.trace.render()));
        }
        session.record(
            EventOrigin::Assistant,
            EventKind::Response,
            json!(response),
            metadata,
        );
        session.add_block(Actor::Professional, response.clone(), Priority::High);

        info!(
            visit_id = %session.key(),
            termination = ?termination,
            summary = %turn.trace.summarize(),
            "Message processed"
        );

        response
    }

    /// One transition of the loop state machine.
    fn step(&self, state: LoopState, session: &mut SessionContext, turn: &mut Turn<'_>) -> LoopState {
        let iteration = match state {
            LoopState::Start if turn.trace.max_iterations == 0 => {
                return LoopState::Finalized(Termination::Exhausted);
            }
            LoopState::Start => 1,
            LoopState::Iterating { iteration } => iteration,
            finalized @ LoopState::Finalized(_) => return finalized,
        };

        turn.trace.tick();
        debug!(visit_id = %session.key(), iteration, "Reasoning iteration");

        let policy = session.policy();
        let last_diagnosis = session.last_diagnosis();
        let calls = self.selector.select(&SelectionInput {
            message: turn.message,
            mentioned: &turn.mentioned,
            iteration,
            policy: &policy,
            patient_id: &session.patient().id,
            visit_reason: &session.visit().reason,
            last_diagnosis: last_diagnosis.as_deref(),
        });

        if calls.is_empty() {
            turn.trace
                .add_reflection("No se requieren más herramientas. Generando respuesta final.");
            return LoopState::Finalized(Termination::NoTools);
        }

        for call in &calls {
            turn.trace.add_action(format!(
                "Ejecutando herramienta: {} con argumentos: {}",
                call.name, call.arguments
            ));

            let outcome = self.execute_tool(session, call);
            turn.trace.add_tool_result(&outcome.tool_name, outcome.success);
            match &outcome.error {
                Some(error) => turn.trace.add_observation(format!("Error: {error}")),
                None => turn.trace.add_observation(outcome.output.clone()),
            }

            if outcome.success && outcome.output.chars().count() > FEEDBACK_MIN_CHARS {
                let excerpt: String = outcome.output.chars().take(FEEDBACK_MAX_CHARS).collect();
                session.add_block(
                    Actor::System,
                    format!("Resultado de {}: {excerpt}...", outcome.tool_name),
                    Priority::High,
                );
            }
        }

        let max_iterations = turn.trace.max_iterations;
        let used = session.used_tools();
        let decision = decide_next(&policy, &used, iteration, max_iterations);
        if matches!(decision, Continuation::Finalize(_)) && !policy.allowed_tools.is_empty() {
            if let Some(missing) = missing_primary(&policy, &used) {
                warn!(iteration, max_iterations, missing, "Iteration bound reached, forcing final response");
            }
        }
        match decision {
            Continuation::Finalize(note) => {
                turn.trace.add_reflection(format!("Análisis: {note}"));
                LoopState::Finalized(Termination::Signal)
            }
            Continuation::Continue { note, .. } => {
                turn.trace.add_reflection(format!("Análisis: {note}"));
                if iteration >= max_iterations {
                    LoopState::Finalized(Termination::Exhausted)
                } else {
                    LoopState::Iterating {
                        iteration: iteration + 1,
                    }
                }
            }
        }
    }

    /// Run one tool call for the session and record it.
    ///
    /// Unknown tools, tools the role may not use, and tool failures all
    /// come back as an outcome carrying `error`.
    pub fn execute_tool(&self, session: &mut SessionContext, call: &ToolCall) -> ToolOutcome {
        let policy = session.policy();
        let result = if self.tools.get(&call.name).is_some() && !policy.allows_tool(&call.name) {
            Err(ToolError::PermissionDenied {
                tool_name: call.name.clone(),
                reason: format!("not allowed for role {}", session.role()),
            })
        } else {
            self.tools.execute(call)
        };

        let outcome = match result {
            Ok(result) => ToolOutcome {
                tool_name: call.name.clone(),
                success: result.success,
                output: result.output,
                data: result.data,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolOutcome {
                    tool_name: call.name.clone(),
                    success: false,
                    output: String::new(),
                    data: Value::Null,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                }
            }
        };

        let metadata = object(json!({
            "tool_name": call.name,
            "arguments": call.arguments,
        }));
        session.record(
            EventOrigin::Tool,
            EventKind::ToolUse,
            serde_json::to_value(&outcome).unwrap_or_default(),
            metadata,
        );
        outcome
    }
}

/// Build a loop with `options` and record its configuration on `session`.
pub fn create_agent(
    session: &mut SessionContext,
    tools: Arc<ToolRegistry>,
    options: AgentOptions,
) -> AgentLoop {
    let agent = AgentLoop::new(tools).with_options(options);
    agent.attach(session);
    agent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionParams;
    use careclaw_core::tool::{Tool, ToolResult, names};
    use careclaw_tools::default_registry;

    fn session(role: Role) -> SessionContext {
        SessionContext::new(SessionParams::new(
            "P001",
            "Ana Pérez",
            "VISITA123",
            "PRO-1",
            "Dolor cervical",
            role,
        ))
    }

    fn agent() -> AgentLoop {
        AgentLoop::new(Arc::new(default_registry()))
    }

    fn used(tools: &[&str]) -> BTreeSet<String> {
        tools.iter().map(|t| t.to_string()).collect()
    }

    struct FailingTool;

    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn execute(&self, _arguments: &Value) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "failing".into(),
                reason: "backend down".into(),
            })
        }
    }

    #[test]
    fn professional_needs_both_primary_tools() {
        let policy = Role::HealthProfessional.policy();
        let decision = decide_next(&policy, &used(&[names::DIAGNOSIS_SUGGESTION]), 1, 5);
        assert_eq!(
            decision,
            Continuation::Continue {
                missing: Some(names::LEGAL_RISK_EVALUATION),
                note: format!("Falta ejecutar {} antes de responder.", names::LEGAL_RISK_EVALUATION),
            }
        );

        let both = used(&[names::DIAGNOSIS_SUGGESTION, names::LEGAL_RISK_EVALUATION]);
        assert!(matches!(decide_next(&policy, &both, 1, 5), Continuation::Finalize(_)));
    }

    #[test]
    fn patient_finishes_after_prior_visits() {
        let policy = Role::Patient.policy();
        assert!(matches!(
            decide_next(&policy, &used(&[names::PRIOR_VISIT_RECALL]), 1, 3),
            Continuation::Finalize(_)
        ));
    }

    #[test]
    fn bound_forces_finalize() {
        let policy = Role::AdminStaff.policy();
        assert!(matches!(
            decide_next(&policy, &used(&[]), 2, 4),
            Continuation::Continue { .. }
        ));
        assert!(matches!(
            decide_next(&policy, &used(&[]), 3, 4),
            Continuation::Finalize(_)
        ));
    }

    #[test]
    fn missing_primary_follows_declared_order() {
        let policy = Role::AdminStaff.policy();
        assert_eq!(missing_primary(&policy, &used(&[])), Some(names::PRIOR_VISIT_RECALL));
        assert_eq!(
            missing_primary(&policy, &used(&[names::PRIOR_VISIT_RECALL])),
            Some(names::LEGAL_RISK_EVALUATION)
        );
        let both = used(&[names::PRIOR_VISIT_RECALL, names::LEGAL_RISK_EVALUATION]);
        assert_eq!(missing_primary(&policy, &both), None);
        // Forced finish at the bound still reports the gap to the caller.
        assert!(matches!(decide_next(&policy, &used(&[]), 3, 4), Continuation::Finalize(_)));
        assert!(missing_primary(&policy, &used(&[])).is_some());
    }

    #[test]
    fn nonexistent_tool_returns_error_outcome() {
        let agent = agent();
        let mut s = session(Role::HealthProfessional);
        let outcome = agent.execute_tool(&mut s, &ToolCall::new("nonexistent_tool", json!({})));
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("nonexistent_tool"));

        let event = s.history().events().last().unwrap();
        assert_eq!(event.kind, EventKind::ToolUse);
        assert!(event.content.get("error").is_some());
        assert!(event.content.get("timestamp").is_some());
        assert_eq!(s.metrics().tool_uses, 1);
    }

    #[test]
    fn disallowed_tool_is_permission_error() {
        let agent = agent();
        let mut s = session(Role::Patient);
        let call = ToolCall::new(names::DIAGNOSIS_SUGGESTION, json!({ "visit_reason": "x" }));
        let outcome = agent.execute_tool(&mut s, &call);
        assert!(outcome.error.unwrap().starts_with("Permission denied"));
    }

    #[test]
    fn failing_tool_is_absorbed() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));
        let agent = AgentLoop::new(Arc::new(registry));
        let mut s = session(Role::HealthProfessional);
        let outcome = agent.execute_tool(&mut s, &ToolCall::new("failing", json!({})));
        assert!(outcome.error.unwrap().contains("backend down"));
    }

    #[test]
    fn professional_runs_diagnosis_then_legal_risk() {
        let agent = agent();
        let mut s = session(Role::HealthProfessional);
        let reply = agent.process(
            &mut s,
            "Dolor cervical intenso, propongo manipulación con consentimiento",
        );

        assert!(reply.contains("El diagnóstico principal sugerido es Cervicalgia mecánica."));
        assert!(reply.contains("aspectos de riesgo legal:"));
        assert!(reply.contains("- Documentar detalladamente procedimiento y respuesta para 'manipulación'"));
        let tools = s.used_tools();
        assert!(tools.contains(names::DIAGNOSIS_SUGGESTION));
        assert!(tools.contains(names::LEGAL_RISK_EVALUATION));

        let response = s
            .history()
            .iter()
            .find(|e| e.kind == EventKind::Response)
            .unwrap();
        assert!(response.metadata_str("reasoning").unwrap().contains("[Action]"));
    }

    #[test]
    fn tool_results_feed_back_into_memory() {
        let agent = agent();
        let mut s = session(Role::Patient);
        agent.process(&mut s, "¿Qué dice mi historial?");
        assert!(
            s.short_term()
                .iter()
                .any(|b| b.actor == Actor::System && b.text.starts_with("Resultado de prior_visit_recall:"))
        );
    }

    #[test]
    fn patient_reply_hides_reasoning() {
        let agent = agent();
        let mut s = session(Role::Patient);
        agent.process(&mut s, "hola");
        let response = s
            .history()
            .iter()
            .find(|e| e.kind == EventKind::Response)
            .unwrap();
        assert!(response.metadata_str("reasoning").is_none());
    }

    #[test]
    fn zero_iterations_gives_emergency_reply() {
        let agent = agent().with_options(AgentOptions {
            max_iterations: Some(0),
            memory_budget: None,
        });
        let mut s = session(Role::HealthProfessional);
        let reply = agent.process(&mut s, "dolor cervical");
        assert!(reply.contains("Realizar una evaluación clínica completa"));
        assert_eq!(s.metrics().tool_uses, 0);
    }

    #[test]
    fn create_agent_records_configuration() {
        let mut s = session(Role::AdminStaff);
        let agent = create_agent(
            &mut s,
            Arc::new(default_registry()),
            AgentOptions {
                max_iterations: Some(2),
                memory_budget: Some(120),
            },
        );
        assert_eq!(agent.memory_budget(), 120);
        let event = s.history().events().last().unwrap();
        assert_eq!(event.kind, EventKind::Lifecycle);
        assert_eq!(event.metadata["max_iterations"], 2);
        assert_eq!(event.metadata["memory_budget"], 120);
    }

    #[test]
    fn options_from_config_apply_role_overrides() {
        let mut config = AppConfig::default();
        config.memory.default_budget = 500;
        config.roles.insert(
            "patient".into(),
            careclaw_config::RoleOverride {
                max_iterations: Some(2),
                memory_budget: None,
            },
        );
        let options = AgentOptions::from_config(&config, Role::Patient);
        assert_eq!(options.max_iterations, Some(2));
        assert_eq!(options.memory_budget, Some(500));

        let pro = AgentOptions::from_config(&config, Role::HealthProfessional);
        assert_eq!(pro.max_iterations, None);
    }

    struct PriorVisitsOnly;

    impl ToolSelector for PriorVisitsOnly {
        fn mentioned_tools(&self, _message: &str) -> Vec<&'static str> {
            Vec::new()
        }

        fn select(&self, input: &SelectionInput<'_>) -> Vec<ToolCall> {
            if input.iteration > 1 {
                return Vec::new();
            }
            vec![ToolCall::new(
                names::PRIOR_VISIT_RECALL,
                json!({ "patient_id": input.patient_id }),
            )]
        }
    }

    #[test]
    fn selector_can_be_swapped() {
        let agent = agent().with_selector(Box::new(PriorVisitsOnly));
        let mut s = session(Role::HealthProfessional);
        let reply = agent.process(&mut s, "Dolor cervical, ¿diagnóstico?");

        assert_eq!(s.used_tools(), used(&[names::PRIOR_VISIT_RECALL]));
        assert!(reply.contains("Basado en su historial de visitas:"));
        assert!(!reply.contains("diagnóstico principal"));
    }

    #[test]
    fn classifier_and_options_are_exposed() {
        let mut config = AppConfig::default();
        config.classifier.long_message_chars = 5;
        let agent = AgentLoop::from_config(&config, Arc::new(default_registry()), Role::Patient);

        assert_eq!(agent.classifier().classify("ok"), Priority::Low);
        assert_eq!(agent.classifier().classify("una frase larga"), Priority::Medium);
        assert_eq!(agent.options().memory_budget, Some(300));
        assert_eq!(agent.max_iterations(&Role::Patient.policy()), 3);
    }
}
