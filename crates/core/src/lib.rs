//! # CareClaw Core
//!
//! Domain types, traits, and error definitions for the CareClaw clinical
//! assistant. This crate has **zero framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here (tools, session storage,
//! audit sinks). Implementations live in their respective crates, so a
//! test can swap any of them for a stub.

pub mod block;
pub mod error;
pub mod event;
pub mod repository;
pub mod role;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use block::{Actor, MemoryBlock, Priority};
pub use error::{ConfigurationError, Error, Result, SessionError, StorageError, ToolError};
pub use event::{AuditLog, Event, EventKind, EventOrigin, EventSink, TracingEventSink};
pub use repository::{SessionFilter, SessionRepository};
pub use role::{DetailLevel, ResponseStyle, Role, RolePolicy};
pub use session::{PatientInfo, SessionExport, SessionMetrics, VisitInfo, VisitStatus};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
