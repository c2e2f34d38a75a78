use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use aioos_core::{AioosError, Result};
use aioos_governance::PermissionLevel;

use crate::agents::AgentRegistry;
use crate::audit::AuditLog;
use crate::tasks::TaskLedger;

/// Shared handle to the registry database.
pub type Db = Arc<Mutex<Connection>>;

pub(crate) fn db_err(e: rusqlite::Error) -> AioosError {
    AioosError::Storage(e.to_string())
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        license TEXT NOT NULL,
        reputation TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        expires_at TEXT,
        created_at TEXT NOT NULL,
        revoked_at TEXT
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL REFERENCES agents(id),
        description TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        steps TEXT NOT NULL DEFAULT '[]',
        result TEXT,
        created_at TEXT NOT NULL,
        completed_at TEXT
    );

    CREATE TABLE IF NOT EXISTS audit_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT,
        user_id TEXT,
        action TEXT NOT NULL,
        details TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_agents_owner_id ON agents(owner_id);
    CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);
    CREATE INDEX IF NOT EXISTS idx_tasks_agent_id ON tasks(agent_id);
    CREATE INDEX IF NOT EXISTS idx_audit_logs_agent_id ON audit_logs(agent_id);
    CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs(created_at);
";

/// Rows removed by [`RegistryStore::reset_owner_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub agents: usize,
    pub tasks: usize,
    pub audit_entries: usize,
}

/// The registry database plus the components that share its connection.
pub struct RegistryStore {
    pub agents: AgentRegistry,
    pub audit: AuditLog,
    pub tasks: TaskLedger,
    db: Db,
}

impl RegistryStore {
    /// Open or create the registry database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, PermissionLevel::ExecuteWithHuman)
    }

    /// Open the database; agents created without a license get `default_level`.
    pub fn open_with(path: &Path, default_level: PermissionLevel) -> Result<Self> {
        info!(?path, "opening registry store");

        if path.as_os_str() != ":memory:" {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL for concurrent readers; foreign keys so tasks can't outlive agents
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        Ok(Self::from_db(Arc::new(Mutex::new(conn)), default_level))
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Wire the components around an already-initialized connection.
    pub fn from_db(db: Db, default_level: PermissionLevel) -> Self {
        let audit = AuditLog::new(Arc::clone(&db));
        Self {
            agents: AgentRegistry::new(Arc::clone(&db), default_level),
            tasks: TaskLedger::new(Arc::clone(&db)),
            audit,
            db,
        }
    }

    /// Clone of the shared connection handle.
    pub fn handle(&self) -> Db {
        Arc::clone(&self.db)
    }

    /// Delete everything belonging to an owner: their agents, those agents'
    /// tasks, and every audit entry by the owner or about their agents.
    ///
    /// This is the only path that removes audit entries.
    pub fn reset_owner_data(&self, owner_id: &str) -> Result<ResetSummary> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;

        let audit_entries = tx
            .execute(
                "DELETE FROM audit_logs
                 WHERE user_id = ?1
                    OR agent_id IN (SELECT id FROM agents WHERE owner_id = ?1)",
                rusqlite::params![owner_id],
            )
            .map_err(db_err)?;
        let tasks = tx
            .execute(
                "DELETE FROM tasks WHERE agent_id IN (SELECT id FROM agents WHERE owner_id = ?1)",
                rusqlite::params![owner_id],
            )
            .map_err(db_err)?;
        let agents = tx
            .execute(
                "DELETE FROM agents WHERE owner_id = ?1",
                rusqlite::params![owner_id],
            )
            .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        let summary = ResetSummary {
            agents,
            tasks,
            audit_entries,
        };
        info!(owner = owner_id, ?summary, "owner data reset");
        Ok(summary)
    }
}

/// Create the schema on a bare connection (for components built without a store).
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
    conn.execute_batch(SCHEMA).map_err(db_err)
}
