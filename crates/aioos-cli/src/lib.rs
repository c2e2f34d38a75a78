//! # aioos-cli
//!
//! Command-line interface for the AIoOS governance engine.
//!
//! ## Commands
//!
//! - `aioos assess` — Score a task description without running it
//! - `aioos agent` — Create, list, inspect and revoke agents
//! - `aioos run` — Authorize a task through the execution gate and run it
//! - `aioos audit` — Show the audit trail for your agents
//! - `aioos sweep` — Persist expiry for agents past their lifetime
//! - `aioos reset` — Delete all of your agents, tasks and audit entries
//! - `aioos config` — Show and check configuration

pub mod commands;

pub use commands::Cli;
