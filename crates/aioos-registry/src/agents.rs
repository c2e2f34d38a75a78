use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use aioos_core::{
    AgentId, AioosError, Result, SYSTEM_ACTOR, format_timestamp, parse_timestamp,
};
use aioos_governance::{License, PermissionLevel};

use crate::audit::append_in;
use crate::store::{Db, db_err};

/// Lifecycle status of an agent. `Revoked` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Revoked,
    Expired,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = AioosError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(AioosError::Storage(format!("unknown agent status '{other}'"))),
        }
    }
}

/// Running track record of an agent's task outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReputation {
    pub tasks_completed: u64,
    /// Percentage of tasks that succeeded, 0-100.
    pub success_rate: f64,
    /// Mean task duration in seconds.
    pub avg_response_time: f64,
    pub user_rating: f64,
    /// 0-100.
    pub trust_score: u8,
}

impl Default for AgentReputation {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            success_rate: 100.0,
            avg_response_time: 0.0,
            user_rating: 5.0,
            trust_score: 50,
        }
    }
}

impl AgentReputation {
    /// Fold one finished task into the record.
    ///
    /// Trust is a base of 25, plus half a point per task (capped at 25), plus
    /// half the success rate.
    pub fn record(&self, success: bool, response_time_secs: f64) -> Self {
        let done = self.tasks_completed as f64;
        let n = done + 1.0;
        let success_rate = (self.success_rate * done + if success { 100.0 } else { 0.0 }) / n;
        let avg_response_time = (self.avg_response_time * done + response_time_secs) / n;
        let trust = 25.0 + (n * 0.5).min(25.0) + success_rate * 0.5;

        Self {
            tasks_completed: self.tasks_completed + 1,
            success_rate: round1(success_rate),
            avg_response_time: round1(avg_response_time),
            user_rating: self.user_rating,
            trust_score: trust.round().min(100.0) as u8,
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// A registered agent.
///
/// `status` as returned by [`AgentRegistry`] reads is the effective status:
/// an active agent past `expires_at` is reported `Expired` even before the
/// sweeper has persisted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: String,
    pub name: String,
    pub license: License,
    pub status: AgentStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub reputation: AgentReputation,
}

impl Agent {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Status after applying expiry at `now`. Never writes anything.
    pub fn effective_status(&self, now: DateTime<Utc>) -> AgentStatus {
        match self.status {
            AgentStatus::Active if self.is_expired_at(now) => AgentStatus::Expired,
            other => other,
        }
    }

    /// Active and not past expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AgentStatus::Active && !self.is_expired_at(now)
    }
}

/// Whether `agent` may execute tasks at `now`.
pub fn is_agent_valid(agent: &Agent, now: DateTime<Utc>) -> bool {
    agent.is_valid_at(now)
}

/// Lifetime presets offered when creating an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPreset {
    FifteenMinutes,
    OneHour,
    OneDay,
    OneWeek,
    Never,
}

impl ExpiryPreset {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::FifteenMinutes => Some(Duration::minutes(15)),
            Self::OneHour => Some(Duration::hours(1)),
            Self::OneDay => Some(Duration::hours(24)),
            Self::OneWeek => Some(Duration::days(7)),
            Self::Never => None,
        }
    }

    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| now + d)
    }
}

impl FromStr for ExpiryPreset {
    type Err = AioosError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "15m" => Ok(Self::FifteenMinutes),
            "1h" => Ok(Self::OneHour),
            "24h" => Ok(Self::OneDay),
            "7d" => Ok(Self::OneWeek),
            "never" => Ok(Self::Never),
            other => Err(AioosError::Validation(format!(
                "unknown expiry '{other}' (expected 15m, 1h, 24h, 7d or never)"
            ))),
        }
    }
}

/// Input for [`AgentRegistry::create`].
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub owner_id: String,
    pub name: String,
    /// `None` gives the agent a basic license at the registry's default level.
    pub license: Option<License>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of a revoke attempt. Only `Revoked` changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked { revoked_at: DateTime<Utc> },
    /// The agent exists but was already revoked or expired.
    AlreadyInactive(AgentStatus),
    NotFound,
}

impl RevokeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Revoked { .. })
    }
}

/// Agent lifecycle operations over the shared registry database.
pub struct AgentRegistry {
    db: Db,
    default_level: PermissionLevel,
}

const AGENT_COLUMNS: &str =
    "id, owner_id, name, license, reputation, status, expires_at, created_at, revoked_at";

impl AgentRegistry {
    pub fn new(db: Db, default_level: PermissionLevel) -> Self {
        Self { db, default_level }
    }

    pub fn default_level(&self) -> PermissionLevel {
        self.default_level
    }

    /// Register a new active agent and audit its creation.
    pub fn create(&self, new: NewAgent) -> Result<Agent> {
        self.create_at(new, Utc::now())
    }

    pub fn create_at(&self, new: NewAgent, now: DateTime<Utc>) -> Result<Agent> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(AioosError::Validation("agent name is required".into()));
        }
        if new.owner_id.trim().is_empty() {
            return Err(AioosError::Validation("agent owner is required".into()));
        }
        if new.expires_at.is_some_and(|exp| exp <= now) {
            return Err(AioosError::Validation(
                "expiry must be in the future".into(),
            ));
        }
        let license = new
            .license
            .unwrap_or_else(|| License::basic(self.default_level));
        license.validate()?;

        let agent = Agent {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            name: name.to_string(),
            license,
            status: AgentStatus::Active,
            expires_at: new.expires_at,
            created_at: now,
            revoked_at: None,
            reputation: AgentReputation::default(),
        };

        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO agents (id, owner_id, name, license, reputation, status, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7)",
            rusqlite::params![
                agent.id.to_string(),
                agent.owner_id,
                agent.name,
                serde_json::to_string(&agent.license)?,
                serde_json::to_string(&agent.reputation)?,
                agent.expires_at.as_ref().map(format_timestamp),
                format_timestamp(&agent.created_at),
            ],
        )
        .map_err(db_err)?;
        append_in(
            &tx,
            Some(agent.id),
            Some(&agent.owner_id),
            "agent_created",
            Some(&format!(
                "Agent \"{}\" created with license type: {}",
                agent.name, agent.license.license_type
            )),
            now,
        )?;
        tx.commit().map_err(db_err)?;

        info!(
            agent_id = %agent.id,
            owner = %agent.owner_id,
            license = %agent.license.license_type,
            level = %agent.license.permission_level,
            "agent created"
        );
        Ok(agent)
    }

    /// Look up an agent, reporting its effective status at `now`. Read-only.
    pub fn get(&self, id: AgentId, now: DateTime<Utc>) -> Result<Option<Agent>> {
        let db = self.db.lock();
        let row = db
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
                rusqlite::params![id.to_string()],
                read_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(|r| r.into_agent(now)).transpose()
    }

    /// Status as persisted, without applying expiry.
    pub fn stored_status(&self, id: AgentId) -> Result<Option<AgentStatus>> {
        let db = self.db.lock();
        let raw: Option<String> = db
            .query_row(
                "SELECT status FROM agents WHERE id = ?1",
                rusqlite::params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.map(|s| s.parse()).transpose()
    }

    /// All agents owned by `owner_id`, newest first, with effective status.
    pub fn list_by_owner(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Agent>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE owner_id = ?1 ORDER BY created_at DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![owner_id], read_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(|r| r.into_agent(now)).collect()
    }

    /// Re-derive validity from storage. Unknown agents are not valid.
    pub fn is_valid(&self, id: AgentId, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.get(id, now)?.is_some_and(|a| a.is_valid_at(now)))
    }

    /// Revoke an active agent on behalf of `actor_id`.
    pub fn revoke(&self, id: AgentId, actor_id: &str) -> Result<RevokeOutcome> {
        self.revoke_at(id, actor_id, Utc::now())
    }

    pub fn revoke_at(&self, id: AgentId, actor_id: &str, now: DateTime<Utc>) -> Result<RevokeOutcome> {
        let now_ts = format_timestamp(&now);
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;

        let changed = tx
            .execute(
                "UPDATE agents SET status = 'revoked', revoked_at = ?2
                 WHERE id = ?1 AND status = 'active'
                   AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![id.to_string(), now_ts],
            )
            .map_err(db_err)?;

        if changed > 0 {
            append_in(&tx, Some(id), Some(actor_id), "agent_revoked", Some("Agent revoked"), now)?;
            tx.commit().map_err(db_err)?;
            info!(agent_id = %id, actor = actor_id, "agent revoked");
            return Ok(RevokeOutcome::Revoked { revoked_at: now });
        }

        let current: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT status, expires_at FROM agents WHERE id = ?1",
                rusqlite::params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        match current {
            None => Ok(RevokeOutcome::NotFound),
            Some((status, expires_at)) => {
                let status = match status.parse::<AgentStatus>()? {
                    AgentStatus::Active if expires_at.is_some_and(|e| e <= now_ts) => {
                        AgentStatus::Expired
                    }
                    other => other,
                };
                warn!(agent_id = %id, %status, "revoke requested for inactive agent");
                Ok(RevokeOutcome::AlreadyInactive(status))
            }
        }
    }

    /// Persist `expired` for every active agent past its expiry at `now`,
    /// auditing each one. Returns the agents that were expired.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>> {
        let now_ts = format_timestamp(&now);
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;

        let due: Vec<(String, String)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, expires_at FROM agents
                     WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(rusqlite::params![now_ts], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            rows
        };

        let mut expired = Vec::with_capacity(due.len());
        for (raw_id, expires_at) in due {
            let id = parse_agent_id(&raw_id)?;
            tx.execute(
                "UPDATE agents SET status = 'expired' WHERE id = ?1 AND status = 'active'",
                rusqlite::params![raw_id],
            )
            .map_err(db_err)?;
            append_in(
                &tx,
                Some(id),
                Some(SYSTEM_ACTOR),
                "agent_expired",
                Some(&format!("Agent expired at {expires_at}")),
                now,
            )?;
            expired.push(id);
        }

        tx.commit().map_err(db_err)?;
        if !expired.is_empty() {
            info!(count = expired.len(), "expired agents swept");
        }
        Ok(expired)
    }

    /// Fold a finished task into the agent's reputation.
    /// Returns `None` if the agent no longer exists.
    pub fn record_task_outcome(
        &self,
        id: AgentId,
        success: bool,
        response_time_secs: f64,
    ) -> Result<Option<AgentReputation>> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;
        let updated = record_outcome_in(&tx, id, success, response_time_secs)?;
        tx.commit().map_err(db_err)?;
        Ok(updated)
    }
}

/// Reputation update on an existing connection or transaction, so a task's
/// terminal write and its reputation change commit together.
pub(crate) fn record_outcome_in(
    conn: &Connection,
    id: AgentId,
    success: bool,
    response_time_secs: f64,
) -> Result<Option<AgentReputation>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT reputation FROM agents WHERE id = ?1",
            rusqlite::params![id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    let current: AgentReputation = serde_json::from_str(&raw)
        .map_err(|e| AioosError::Storage(format!("agent {id} has a corrupt reputation: {e}")))?;
    let updated = current.record(success, response_time_secs);

    conn.execute(
        "UPDATE agents SET reputation = ?2 WHERE id = ?1",
        rusqlite::params![id.to_string(), serde_json::to_string(&updated)?],
    )
    .map_err(db_err)?;
    Ok(Some(updated))
}

fn parse_agent_id(raw: &str) -> Result<AgentId> {
    Uuid::parse_str(raw)
        .map_err(|e| AioosError::Storage(format!("invalid agent id '{raw}': {e}")))
}

/// A raw agent row; JSON columns are validated when converted.
struct AgentRow {
    id: String,
    owner_id: String,
    name: String,
    license: String,
    reputation: String,
    status: String,
    expires_at: Option<String>,
    created_at: String,
    revoked_at: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRow> {
    Ok(AgentRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        license: row.get(3)?,
        reputation: row.get(4)?,
        status: row.get(5)?,
        expires_at: row.get(6)?,
        created_at: row.get(7)?,
        revoked_at: row.get(8)?,
    })
}

impl AgentRow {
    fn into_agent(self, now: DateTime<Utc>) -> Result<Agent> {
        let id = parse_agent_id(&self.id)?;
        let license: License = serde_json::from_str(&self.license)
            .map_err(|e| AioosError::Storage(format!("agent {id} has a corrupt license: {e}")))?;
        let reputation: AgentReputation = serde_json::from_str(&self.reputation).map_err(|e| {
            AioosError::Storage(format!("agent {id} has a corrupt reputation: {e}"))
        })?;

        let mut agent = Agent {
            id,
            owner_id: self.owner_id,
            name: self.name,
            license,
            status: self.status.parse()?,
            expires_at: self.expires_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            revoked_at: self.revoked_at.as_deref().map(parse_timestamp).transpose()?,
            reputation,
        };
        agent.status = agent.effective_status(now);
        Ok(agent)
    }
}
