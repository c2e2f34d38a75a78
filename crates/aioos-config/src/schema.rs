use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `aioos.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AioosConfig {
    pub storage: StorageConfig,
    pub governance: GovernanceConfig,
    pub sweep: SweepConfig,
    pub logging: LoggingConfig,
    pub identity: IdentityConfig,
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database holding agents, tasks, and the audit log.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/aioos.db"),
        }
    }
}

// ── Governance ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Permission level given to agents created without a license:
    /// "advisory_only", "execute_with_human" or "autonomous".
    pub default_permission_level: String,
    /// Number of audit entries returned when no limit is given.
    pub audit_default_limit: usize,
    /// Upper bound on audit entries returned by a single query.
    pub audit_max_limit: usize,
    /// How many characters of a task description are copied into the audit log.
    pub task_preview_chars: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            default_permission_level: "execute_with_human".into(),
            audit_default_limit: 100,
            audit_max_limit: 500,
            task_preview_chars: 100,
        }
    }
}

// ── Expiry sweep ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run the background expiry sweeper in long-running commands.
    pub enabled: bool,
    /// Seconds between sweeps.
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Identity ───────────────────────────────────────────────────

/// Who the CLI acts as when `--user` is not given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub default_user: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_user: "demo-user-001".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A config problem found during validation.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

pub const PERMISSION_LEVELS: [&str; 3] = ["advisory_only", "execute_with_human", "autonomous"];

impl AioosConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Storage ───
        if self.storage.db_path.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "storage.db_path".into(),
                message: "database path is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. './data/aioos.db' or ':memory:'".into()),
            });
        } else if self.storage.db_path.as_os_str() == ":memory:" {
            warnings.push(ConfigWarning {
                field: "storage.db_path".into(),
                message: "in-memory database — nothing survives the process".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Permission level ───
        if !PERMISSION_LEVELS.contains(&self.governance.default_permission_level.as_str()) {
            warnings.push(ConfigWarning {
                field: "governance.default_permission_level".into(),
                message: format!(
                    "unknown permission level '{}'",
                    self.governance.default_permission_level
                ),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", PERMISSION_LEVELS.join(", "))),
            });
        } else if self.governance.default_permission_level == "autonomous" {
            warnings.push(ConfigWarning {
                field: "governance.default_permission_level".into(),
                message: "unlicensed agents will act autonomously".into(),
                severity: WarningSeverity::Warning,
                hint: Some("'execute_with_human' keeps a human in the loop".into()),
            });
        }

        // ── Audit limits ───
        if self.governance.audit_max_limit == 0 {
            warnings.push(ConfigWarning {
                field: "governance.audit_max_limit".into(),
                message: "audit_max_limit is 0 — audit queries return nothing".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 500".into()),
            });
        } else if self.governance.audit_default_limit > self.governance.audit_max_limit {
            warnings.push(ConfigWarning {
                field: "governance.audit_default_limit".into(),
                message: format!(
                    "default limit {} exceeds max limit {} and will be clamped",
                    self.governance.audit_default_limit, self.governance.audit_max_limit
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Sweep interval ───
        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            warnings.push(ConfigWarning {
                field: "sweep.interval_secs".into(),
                message: "interval is 0 while the sweeper is enabled".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use a positive interval or set sweep.enabled = false".into()),
            });
        }

        // ── Identity ───
        if self.identity.default_user.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "identity.default_user".into(),
                message: "default user is empty — commands need --user".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }

    /// Clamp a requested audit limit into `1..=audit_max_limit`, using the
    /// configured default when none was requested.
    pub fn audit_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.governance.audit_default_limit)
            .clamp(1, self.governance.audit_max_limit.max(1))
    }
}
