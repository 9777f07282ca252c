//! The clinical reasoning agent.
//!
//! A [`SessionContext`] holds one visit: the audit log, role-bounded
//! memory and metrics. The [`AgentLoop`] answers each message with a
//! bounded **Think → Act → Observe** cycle:
//!
//! 1. **Classify** the message priority and store it as a memory block
//! 2. **Select** tools from keywords and the role's permissions
//! 3. **Execute** them, recording every use and feeding results back to memory
//! 4. **Decide** whether the role's primary tools are covered or iterations ran out
//! 5. **Synthesize** a reply with the role's template
//!
//! Nothing here calls out to a language model; every step is deterministic.

pub mod classifier;
pub mod context;
pub mod ingest;
pub mod loop_runner;
pub mod selector;
pub mod session;
pub mod synthesizer;

pub use classifier::{KeywordClassifier, PriorityClassifier};
pub use context::{MemoryStore, Selection, TraceEntry, TraceKind, WorkingMemory, estimate_tokens};
pub use ingest::{
    RecordSource, StaticRecordSource, VisitRecord, ingest_record, new_session_from_record,
    sync_record,
};
pub use loop_runner::{
    AgentLoop, AgentOptions, Continuation, LoopState, Termination, ToolOutcome, create_agent,
    decide_next,
};
pub use selector::{KeywordToolSelector, SelectionInput, ToolSelector};
pub use session::{SessionContext, SessionParams};
pub use synthesizer::{SynthesisInput, synthesize};
