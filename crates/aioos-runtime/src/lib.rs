//! # aioos-runtime
//!
//! Ties the governance model to execution.
//!
//! ```text
//!   task text ──► ExecutionGate::authorize ──► GateDecision
//!                   │  1. agent exists, caller owns it
//!                   │  2. agent active and unexpired
//!                   │  3. risk evaluated against the license
//!                   │  4. task recorded, audit appended
//!                   ▼
//!   executor ──► ensure_active (polled) ──► complete / fail
//! ```
//!
//! [`ExpirySweeper`] runs alongside on a tokio interval and persists expiry
//! for agents whose lifetime has passed.

pub mod gate;
pub mod sweeper;

pub use gate::{ExecutionGate, GateDecision};
pub use sweeper::ExpirySweeper;
