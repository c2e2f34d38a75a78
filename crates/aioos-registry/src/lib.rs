//! # aioos-registry
//!
//! Persistent state for the governance engine, all in one SQLite database:
//!
//! - **Agents**: identity, license, lifecycle status, reputation.
//! - **Tasks**: what each agent was asked to do and how it ended.
//! - **Audit log**: append-only trail of lifecycle and execution events.
//!
//! One connection is opened by [`RegistryStore`] and handed to each component,
//! so tests can build components around their own in-memory database.

pub mod agents;
pub mod audit;
pub mod store;
pub mod tasks;

pub use agents::{
    Agent, AgentRegistry, AgentReputation, AgentStatus, ExpiryPreset, NewAgent, RevokeOutcome,
    is_agent_valid,
};
pub use audit::{AuditLog, AuditLogEntry};
pub use store::{Db, RegistryStore, ResetSummary, init_schema};
pub use tasks::{TaskLedger, TaskRecord, TaskStatus, TaskStep, TaskUpdate};
