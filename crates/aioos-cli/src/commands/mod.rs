use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use aioos_config::{AioosConfig, ConfigLoader, WarningSeverity};
use aioos_core::{AioosError, Result};
use aioos_governance::PermissionLevel;
use aioos_registry::{Agent, RegistryStore};

mod agent;
mod assess;
mod audit;
mod run;

/// AIoOS — agent authorization and risk escalation
#[derive(Parser)]
#[command(name = "aioos", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to aioos.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Act as this user (defaults to identity.default_user)
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a task description and show the escalation decision
    Assess {
        /// The task description to score
        task: String,
        /// Score against this agent's license
        #[arg(short, long, conflicts_with_all = ["level", "prohibit"])]
        agent: Option<Uuid>,
        /// Permission level to assume (default from config)
        #[arg(long)]
        level: Option<String>,
        /// Prohibited action to include in the license (repeatable)
        #[arg(long)]
        prohibit: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Authorize a task through the execution gate and run it
    Run {
        /// Agent that should run the task
        agent: Uuid,
        /// The task description
        task: String,
        /// Confirm a task that needs human review
        #[arg(short = 'y', long)]
        confirm: bool,
    },
    /// Show audit log entries for your agents
    Audit {
        /// Only entries about this agent
        #[arg(short, long)]
        agent: Option<Uuid>,
        /// Number of entries to show (default from config)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Only entries whose action contains this text
        #[arg(short = 't', long)]
        action: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist expiry for agents whose lifetime has passed
    Sweep {
        /// Keep sweeping on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Delete all of your agents, their tasks, and your audit entries
    Reset {
        /// Required; there is no undo
        #[arg(long)]
        yes: bool,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Validate and list warnings instead of printing the config
        #[arg(long)]
        check: bool,
    },
    /// Show version and build info
    Version,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub(crate) enum AgentAction {
    /// Register a new agent
    Create {
        /// Display name
        name: String,
        /// Lifetime: 15m, 1h, 24h, 7d or never
        #[arg(short, long, default_value = "never")]
        expires: String,
        /// License category, e.g. RealEstate
        #[arg(long)]
        license_type: Option<String>,
        /// advisory_only, execute_with_human or autonomous
        #[arg(long)]
        level: Option<String>,
        /// Permitted action (repeatable)
        #[arg(long)]
        permit: Vec<String>,
        /// Prohibited action (repeatable)
        #[arg(long)]
        prohibit: Vec<String>,
        /// Jurisdiction code (repeatable)
        #[arg(long)]
        jurisdiction: Vec<String>,
        /// Insurance policy reference
        #[arg(long)]
        insurance: Option<String>,
        /// Read the whole license from a JSON file instead
        #[arg(long, conflicts_with_all = ["license_type", "level", "permit", "prohibit", "jurisdiction", "insurance"])]
        license_file: Option<PathBuf>,
    },
    /// List your agents, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show an agent with its license, reputation and recent tasks
    Show {
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Revoke an agent; running tasks abort at their next check
    Revoke { id: Uuid },
}

/// What every command runs with: the loaded config and the acting user.
pub(crate) struct Session {
    pub config: AioosConfig,
    pub user: String,
}

impl Session {
    pub fn default_level(&self) -> Result<PermissionLevel> {
        self.config.governance.default_permission_level.parse()
    }

    pub fn open_store(&self) -> Result<Arc<RegistryStore>> {
        let store = RegistryStore::open_with(&self.config.storage.db_path, self.default_level()?)?;
        Ok(Arc::new(store))
    }
}

/// Fetch an agent the session user owns.
pub(crate) fn owned_agent(store: &RegistryStore, session: &Session, id: Uuid) -> Result<Agent> {
    let agent = store
        .agents
        .get(id, chrono::Utc::now())?
        .ok_or(AioosError::AgentNotFound(id))?;
    if agent.owner_id != session.user {
        return Err(AioosError::Forbidden(format!(
            "agent {id} belongs to another user"
        )));
    }
    Ok(agent)
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        init_tracing(log_level, &config.logging.format);

        let user = self
            .user
            .unwrap_or_else(|| config.identity.default_user.clone());
        if user.trim().is_empty() {
            return Err(AioosError::Validation(
                "no user given; pass --user or set identity.default_user".into(),
            ));
        }
        let session = Session { config, user };

        match self.command {
            Commands::Assess {
                task,
                agent,
                level,
                prohibit,
                json,
            } => assess::cmd_assess(&session, task, agent, level, prohibit, json),
            Commands::Agent { action } => agent::cmd_agent(&session, action),
            Commands::Run {
                agent,
                task,
                confirm,
            } => run::cmd_run(&session, agent, task, confirm).await,
            Commands::Audit {
                agent,
                limit,
                action,
                json,
            } => audit::cmd_audit(&session, agent, limit, action, json),
            Commands::Sweep { watch } => audit::cmd_sweep(&session, watch).await,
            Commands::Reset { yes } => audit::cmd_reset(&session, yes),
            Commands::Config { json, check } => Self::cmd_config(&session.config, json, check),
            Commands::Version => Self::cmd_version(),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    fn cmd_config(config: &AioosConfig, json: bool, check: bool) -> Result<()> {
        if check {
            let warnings = config.validate().map_err(AioosError::Config)?;
            if warnings.is_empty() {
                println!("{} configuration looks good", style("✓").green());
                return Ok(());
            }
            for w in &warnings {
                let line = w.to_string();
                match w.severity {
                    WarningSeverity::Error => println!("  {}", style(line).red()),
                    WarningSeverity::Warning => println!("  {}", style(line).yellow()),
                    WarningSeverity::Info => println!("  {}", style(line).dim()),
                }
            }
            return Ok(());
        }

        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| AioosError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("AIoOS v{}", env!("CARGO_PKG_VERSION"));
        println!("   Rust edition: 2024");
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "aioos", &mut std::io::stdout());
        Ok(())
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(level: &str, format: &str) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
    };

    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .init(),
    }
}

/// Truncate a string to `max` characters, appending "..." if truncated.
pub(crate) fn truncate_output(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        format!("{}...", flat.chars().take(max).collect::<String>())
    }
}
