use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the AIoOS governance engine.
///
/// Authorization outcomes (escalations, blocked tasks, revoking an agent that
/// is already inactive) are ordinary return values, not errors.
#[derive(Error, Debug)]
pub enum AioosError {
    // ── Input errors ───────────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    // ── Agent errors ───────────────────────────────────────────
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("AGENT_REVOKED: agent {0} is no longer active")]
    AgentRevoked(Uuid),

    // ── Storage errors ─────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AioosError {
    /// Whether this error means the input was rejected before any work was done.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::ConfigValidation { .. })
    }
}

pub type Result<T> = std::result::Result<T, AioosError>;
