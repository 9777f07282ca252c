//! Session memory: cost estimation, the two capacity-bounded block
//! collections, and the per-message reasoning scratchpad.
//!
//! | Piece | Lifetime | Bounded by |
//! |-------|----------|------------|
//! | Short-term blocks | Session | Role's short-term capacity |
//! | Long-term blocks | Session | Role's long-term capacity |
//! | Working memory | One message | Iteration limit |

pub mod store;
pub mod token;
pub mod working_memory;

pub use store::{MemoryStore, Selection};
pub use token::estimate_tokens;
pub use working_memory::{ToolResultEntry, TraceEntry, TraceKind, WorkingMemory};
