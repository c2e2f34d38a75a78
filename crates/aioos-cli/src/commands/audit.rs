use chrono::Utc;
use console::style;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use aioos_core::{AioosError, EventBus, Result};
use aioos_registry::{AuditLogEntry, RegistryStore};
use aioos_runtime::ExpirySweeper;

use super::{Session, owned_agent, truncate_output};

pub(super) fn cmd_audit(
    session: &Session,
    agent: Option<Uuid>,
    limit: Option<usize>,
    action: Option<String>,
    json: bool,
) -> Result<()> {
    let store = session.open_store()?;
    let limit = session.config.audit_limit(limit);

    let mut entries = match agent {
        Some(id) => {
            owned_agent(&store, session, id)?;
            store.audit.query(Some(id), session.config.governance.audit_max_limit)?
        }
        None => visible_entries(&store, session)?,
    };
    if let Some(ref needle) = action {
        entries.retain(|e| e.action.contains(needle.as_str()));
    }
    entries.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!(
            "No audit log entries{}",
            action
                .as_ref()
                .map(|t| format!(" matching '{t}'"))
                .unwrap_or_default()
        );
        return Ok(());
    }

    println!("{} ({} entries)", style("Audit Log").bold(), entries.len());
    println!("{}", "-".repeat(80));
    for entry in &entries {
        let action = match entry.action.as_str() {
            a if a.contains("revoked") || a.contains("blocked") || a.contains("aborted") => {
                style(a).red()
            }
            a if a.contains("escalated") || a.contains("expired") || a.contains("rejected") => {
                style(a).yellow()
            }
            a if a.starts_with("task_") => style(a).cyan(),
            a => style(a),
        };
        let agent = entry
            .agent_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {action}  {}",
            style(entry.created_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            style(agent).dim()
        );
        if let Some(ref details) = entry.details {
            println!("   {}", style(truncate_output(details, 120)).dim());
        }
    }
    Ok(())
}

/// The most recent entries the session user may see: written by them, or
/// about one of their agents.
fn visible_entries(store: &RegistryStore, session: &Session) -> Result<Vec<AuditLogEntry>> {
    let owned: HashSet<Uuid> = store
        .agents
        .list_by_owner(&session.user, Utc::now())?
        .into_iter()
        .map(|a| a.id)
        .collect();
    let mut entries = store
        .audit
        .query(None, session.config.governance.audit_max_limit)?;
    entries.retain(|e| {
        e.user_id.as_deref() == Some(session.user.as_str())
            || e.agent_id.is_some_and(|id| owned.contains(&id))
    });
    Ok(entries)
}

pub(super) async fn cmd_sweep(session: &Session, watch: bool) -> Result<()> {
    let store = session.open_store()?;
    let events = EventBus::default();
    let sweeper = ExpirySweeper::from_config(store, events.clone(), &session.config.sweep);

    if !watch {
        let expired = sweeper.sweep_once(Utc::now())?;
        if expired.is_empty() {
            println!("No agents due for expiry.");
        } else {
            println!("{} Expired {} agent(s)", style("✓").green(), expired.len());
            for id in expired {
                println!("   {id}");
            }
        }
        return Ok(());
    }

    if !session.config.sweep.enabled {
        return Err(AioosError::Config(
            "sweep.enabled is false; enable it to watch".into(),
        ));
    }

    println!(
        "Sweeping every {}s. Press Ctrl-C to stop.",
        sweeper.interval().as_secs()
    );
    let mut rx = events.subscribe();
    let cancel = CancellationToken::new();
    let handle = sweeper.spawn(cancel.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Ok(aioos_core::Event::AgentExpired { agent_id, .. }) => {
                    println!("   {} {agent_id}", style("expired").yellow());
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    let _ = handle.await;
    info!("sweep watch stopped");
    Ok(())
}

pub(super) fn cmd_reset(session: &Session, yes: bool) -> Result<()> {
    if !yes {
        return Err(AioosError::Validation(format!(
            "this deletes every agent, task and audit entry for {}; pass --yes to confirm",
            session.user
        )));
    }

    let store = session.open_store()?;
    let summary = store.reset_owner_data(&session.user)?;
    println!(
        "{} Removed {} agent(s), {} task(s), {} audit entries",
        style("✓").green(),
        summary.agents,
        summary.tasks,
        summary.audit_entries
    );
    Ok(())
}
