use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use aioos_core::{AgentId, AioosError, Result, TaskId, format_timestamp, parse_timestamp};

use crate::agents::record_outcome_in;
use crate::audit::append_in;
use crate::store::{Db, db_err};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AioosError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            other => Err(AioosError::Storage(format!("unknown task status '{other}'"))),
        }
    }
}

/// One recorded step of a task's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub step: u32,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TaskStep {
    pub fn new(step: u32, description: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            step,
            description: description.into(),
            status,
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub agent_id: AgentId,
    pub description: String,
    pub status: TaskStatus,
    pub steps: Vec<TaskStep>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial update for a task. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub steps: Option<Vec<TaskStep>>,
    pub result: Option<String>,
}

/// Task records, one per authorized execution.
pub struct TaskLedger {
    db: Db,
}

const TASK_COLUMNS: &str =
    "id, agent_id, description, status, steps, result, created_at, completed_at";

impl TaskLedger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert a new task for `agent_id` with the given initial status.
    pub fn create(&self, agent_id: AgentId, description: &str, status: TaskStatus) -> Result<TaskRecord> {
        let record = TaskRecord {
            id: Uuid::new_v4(),
            agent_id,
            description: description.to_string(),
            status,
            steps: Vec::new(),
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        let db = self.db.lock();
        db.execute(
            "INSERT INTO tasks (id, agent_id, description, status, steps, created_at)
             VALUES (?1, ?2, ?3, ?4, '[]', ?5)",
            rusqlite::params![
                record.id.to_string(),
                agent_id.to_string(),
                record.description,
                status.as_str(),
                format_timestamp(&record.created_at),
            ],
        )
        .map_err(db_err)?;

        debug!(task_id = %record.id, agent_id = %agent_id, %status, "task created");
        Ok(record)
    }

    /// Insert a `running` task and its `task_started` audit entry in one
    /// transaction.
    pub fn start(
        &self,
        agent_id: AgentId,
        actor_id: &str,
        description: &str,
        audit_details: &str,
    ) -> Result<TaskRecord> {
        let record = TaskRecord {
            id: Uuid::new_v4(),
            agent_id,
            description: description.to_string(),
            status: TaskStatus::Running,
            steps: Vec::new(),
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO tasks (id, agent_id, description, status, steps, created_at)
             VALUES (?1, ?2, ?3, 'running', '[]', ?4)",
            rusqlite::params![
                record.id.to_string(),
                agent_id.to_string(),
                record.description,
                format_timestamp(&record.created_at),
            ],
        )
        .map_err(db_err)?;
        append_in(
            &tx,
            Some(agent_id),
            Some(actor_id),
            "task_started",
            Some(audit_details),
            record.created_at,
        )?;
        tx.commit().map_err(db_err)?;

        debug!(task_id = %record.id, agent_id = %agent_id, "task started");
        Ok(record)
    }

    /// Move an unfinished task to a terminal `status` in one transaction:
    /// the status change, the agent's reputation and a `task_<status>` audit
    /// entry commit together or not at all.
    ///
    /// Completed and failed tasks count toward reputation; aborted ones do
    /// not. A task that already finished is a validation error and nothing is
    /// written.
    pub fn finish(
        &self,
        id: TaskId,
        actor_id: &str,
        status: TaskStatus,
        result: &str,
        response_time_secs: f64,
        audit_details: &str,
    ) -> Result<TaskRecord> {
        if !status.is_terminal() {
            return Err(AioosError::Validation(format!(
                "cannot finish task {id} as {status}"
            )));
        }
        let now = Utc::now();

        {
            let mut db = self.db.lock();
            let tx = db.transaction().map_err(db_err)?;

            let changed = tx
                .execute(
                    "UPDATE tasks SET status = ?2, result = ?3, completed_at = ?4
                     WHERE id = ?1 AND status NOT IN ('completed', 'failed', 'aborted')",
                    rusqlite::params![
                        id.to_string(),
                        status.as_str(),
                        result,
                        format_timestamp(&now),
                    ],
                )
                .map_err(db_err)?;

            if changed == 0 {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT status FROM tasks WHERE id = ?1",
                        rusqlite::params![id.to_string()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(db_err)?;
                return Err(match current {
                    None => AioosError::TaskNotFound(id),
                    Some(current) => AioosError::Validation(format!(
                        "task {id} already finished as {current}"
                    )),
                });
            }

            let agent_id: String = tx
                .query_row(
                    "SELECT agent_id FROM tasks WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            let agent_id = Uuid::parse_str(&agent_id)
                .map_err(|e| AioosError::Storage(format!("invalid id '{agent_id}': {e}")))?;

            match status {
                TaskStatus::Completed => {
                    record_outcome_in(&tx, agent_id, true, response_time_secs)?;
                }
                TaskStatus::Failed => {
                    record_outcome_in(&tx, agent_id, false, response_time_secs)?;
                }
                _ => {}
            }
            append_in(
                &tx,
                Some(agent_id),
                Some(actor_id),
                &format!("task_{status}"),
                Some(audit_details),
                now,
            )?;
            tx.commit().map_err(db_err)?;
        }

        debug!(task_id = %id, %status, "task finished");
        self.get(id)?.ok_or(AioosError::TaskNotFound(id))
    }

    pub fn get(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let db = self.db.lock();
        let row = db
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                rusqlite::params![id.to_string()],
                read_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(TaskRow::into_record).transpose()
    }

    /// Tasks for an agent, newest first.
    pub fn for_agent(&self, agent_id: AgentId) -> Result<Vec<TaskRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE agent_id = ?1 ORDER BY created_at DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![agent_id.to_string()], read_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(TaskRow::into_record).collect()
    }

    /// Apply a partial update. Moving to a terminal status stamps `completed_at`.
    pub fn update(&self, id: TaskId, update: TaskUpdate) -> Result<TaskRecord> {
        let steps = update.steps.as_ref().map(serde_json::to_string).transpose()?;
        let completed_at = update
            .status
            .filter(TaskStatus::is_terminal)
            .map(|_| format_timestamp(&Utc::now()));

        {
            let db = self.db.lock();
            let changed = db
                .execute(
                    "UPDATE tasks SET
                        status = COALESCE(?2, status),
                        steps = COALESCE(?3, steps),
                        result = COALESCE(?4, result),
                        completed_at = COALESCE(?5, completed_at)
                     WHERE id = ?1",
                    rusqlite::params![
                        id.to_string(),
                        update.status.map(|s| s.as_str()),
                        steps,
                        update.result,
                        completed_at,
                    ],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(AioosError::TaskNotFound(id));
            }
        }

        self.get(id)?.ok_or(AioosError::TaskNotFound(id))
    }
}

struct TaskRow {
    id: String,
    agent_id: String,
    description: String,
    status: String,
    steps: String,
    result: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        steps: row.get(4)?,
        result: row.get(5)?,
        created_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}

impl TaskRow {
    fn into_record(self) -> Result<TaskRecord> {
        let parse_id = |raw: &str| {
            Uuid::parse_str(raw).map_err(|e| AioosError::Storage(format!("invalid id '{raw}': {e}")))
        };
        let id = parse_id(&self.id)?;
        let steps: Vec<TaskStep> = serde_json::from_str(&self.steps)
            .map_err(|e| AioosError::Storage(format!("task {id} has corrupt steps: {e}")))?;

        Ok(TaskRecord {
            id,
            agent_id: parse_id(&self.agent_id)?,
            description: self.description,
            status: self.status.parse()?,
            steps,
            result: self.result,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}
