//! # aioos-core
//!
//! Core types and primitives for the AIoOS agent governance engine.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! identifiers, timestamps, lifecycle events, and the unified error type.

pub mod error;
pub mod event;
pub mod types;

pub use error::{AioosError, Result};
pub use event::{Event, EventBus};
pub use types::*;
