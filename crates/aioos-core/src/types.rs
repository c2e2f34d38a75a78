use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Unique identifier for an agent.
pub type AgentId = Uuid;

/// Unique identifier for a task.
pub type TaskId = Uuid;

/// Identifier of a human user (owner or actor). Opaque, supplied by the auth layer.
pub type UserId = String;

/// Actor recorded for transitions performed by the engine itself.
pub const SYSTEM_ACTOR: &str = "system";

/// Fixed-width RFC 3339 encoding used for every persisted timestamp.
///
/// Always UTC with a `Z` suffix and microsecond precision, so stored values
/// sort lexicographically in time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`] (or any RFC 3339 string).
pub fn parse_timestamp(raw: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| crate::AioosError::Storage(format!("invalid timestamp '{raw}': {e}")))
}
