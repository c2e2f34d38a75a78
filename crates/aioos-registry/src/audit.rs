use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use aioos_core::{AgentId, Result, format_timestamp, parse_timestamp};

use crate::store::{Db, db_err};

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub agent_id: Option<AgentId>,
    pub user_id: Option<String>,
    pub action: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit trail, queryable by agent.
pub struct AuditLog {
    db: Db,
}

impl AuditLog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Append an entry. Returns the new entry's id.
    pub fn append(
        &self,
        agent_id: Option<AgentId>,
        user_id: Option<&str>,
        action: &str,
        details: Option<&str>,
    ) -> Result<i64> {
        let db = self.db.lock();
        append_in(&db, agent_id, user_id, action, details, Utc::now())
    }

    /// Most recent entries first, optionally for a single agent.
    pub fn query(&self, agent_id: Option<AgentId>, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let db = self.db.lock();
        let limit = limit as i64;
        let rows = match agent_id {
            Some(id) => {
                let mut stmt = db
                    .prepare(
                        "SELECT id, agent_id, user_id, action, details, created_at
                         FROM audit_logs WHERE agent_id = ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2",
                    )
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(rusqlite::params![id.to_string(), limit], read_row)
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?;
                rows
            }
            None => {
                let mut stmt = db
                    .prepare(
                        "SELECT id, agent_id, user_id, action, details, created_at
                         FROM audit_logs
                         ORDER BY created_at DESC, id DESC LIMIT ?1",
                    )
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(rusqlite::params![limit], read_row)
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?;
                rows
            }
        };

        rows.into_iter().map(AuditRow::into_entry).collect()
    }

    /// Number of entries with the given action, optionally for one agent.
    pub fn count_action(&self, agent_id: Option<AgentId>, action: &str) -> Result<usize> {
        let db = self.db.lock();
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM audit_logs
                 WHERE action = ?1 AND (?2 IS NULL OR agent_id = ?2)",
                rusqlite::params![action, agent_id.map(|id| id.to_string())],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

/// Insert an audit row on an existing connection or transaction, so lifecycle
/// writes and their audit entries commit together.
pub(crate) fn append_in(
    conn: &Connection,
    agent_id: Option<AgentId>,
    user_id: Option<&str>,
    action: &str,
    details: Option<&str>,
    at: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO audit_logs (agent_id, user_id, action, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            agent_id.map(|id| id.to_string()),
            user_id,
            action,
            details,
            format_timestamp(&at),
        ],
    )
    .map_err(db_err)?;
    let id = conn.last_insert_rowid();
    debug!(id, action, agent = ?agent_id, "audit entry appended");
    Ok(id)
}

struct AuditRow {
    id: i64,
    agent_id: Option<String>,
    user_id: Option<String>,
    action: String,
    details: Option<String>,
    created_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        user_id: row.get(2)?,
        action: row.get(3)?,
        details: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditLogEntry> {
        let agent_id = self
            .agent_id
            .map(|raw| {
                Uuid::parse_str(&raw).map_err(|e| {
                    aioos_core::AioosError::Storage(format!(
                        "audit entry {} has invalid agent id '{raw}': {e}",
                        self.id
                    ))
                })
            })
            .transpose()?;
        Ok(AuditLogEntry {
            id: self.id,
            agent_id,
            user_id: self.user_id,
            action: self.action,
            details: self.details,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
