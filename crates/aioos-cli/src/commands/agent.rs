use chrono::Utc;
use console::style;
use std::path::Path;

use aioos_core::{AioosError, Result};
use aioos_governance::{License, PermissionLevel};
use aioos_registry::{Agent, AgentStatus, ExpiryPreset, NewAgent, RevokeOutcome};

use super::{AgentAction, Session, owned_agent, truncate_output};

pub(super) fn cmd_agent(session: &Session, action: AgentAction) -> Result<()> {
    match action {
        AgentAction::Create {
            name,
            expires,
            license_type,
            level,
            permit,
            prohibit,
            jurisdiction,
            insurance,
            license_file,
        } => {
            let license = match license_file {
                Some(path) => Some(read_license(&path)?),
                None => {
                    let flags = LicenseFlags {
                        license_type,
                        level,
                        permit,
                        prohibit,
                        jurisdiction,
                        insurance,
                    };
                    flags.into_license(session.default_level()?)?
                }
            };
            cmd_create(session, name, &expires, license)
        }
        AgentAction::List { json } => cmd_list(session, json),
        AgentAction::Show { id, json } => cmd_show(session, id, json),
        AgentAction::Revoke { id } => cmd_revoke(session, id),
    }
}

/// License pieces given as individual flags.
struct LicenseFlags {
    license_type: Option<String>,
    level: Option<String>,
    permit: Vec<String>,
    prohibit: Vec<String>,
    jurisdiction: Vec<String>,
    insurance: Option<String>,
}

impl LicenseFlags {
    /// `None` when no flag was given, so the registry applies its default.
    fn into_license(self, default_level: PermissionLevel) -> Result<Option<License>> {
        let untouched = self.license_type.is_none()
            && self.level.is_none()
            && self.permit.is_empty()
            && self.prohibit.is_empty()
            && self.jurisdiction.is_empty()
            && self.insurance.is_none();
        if untouched {
            return Ok(None);
        }

        let level = match self.level {
            Some(raw) => raw.parse()?,
            None => default_level,
        };
        let mut license = License::basic(level);
        if let Some(kind) = self.license_type {
            license.license_type = kind;
        }
        license.permitted_actions = self.permit.into_iter().collect();
        license.prohibited_actions = self.prohibit.into_iter().collect();
        license.jurisdiction = self.jurisdiction.into_iter().collect();
        license.insurance_policy_id = self.insurance.unwrap_or_default();
        Ok(Some(license))
    }
}

fn read_license(path: &Path) -> Result<License> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AioosError::Validation(format!("cannot read license {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        AioosError::Validation(format!("invalid license in {}: {e}", path.display()))
    })
}

fn cmd_create(
    session: &Session,
    name: String,
    expires: &str,
    license: Option<License>,
) -> Result<()> {
    let preset: ExpiryPreset = expires.parse()?;
    let store = session.open_store()?;
    let agent = store.agents.create(NewAgent {
        owner_id: session.user.clone(),
        name,
        license,
        expires_at: preset.expires_at(Utc::now()),
    })?;

    println!("{} Agent created", style("✓").green());
    print_agent(&agent);
    Ok(())
}

fn cmd_list(session: &Session, json: bool) -> Result<()> {
    let store = session.open_store()?;
    let agents = store.agents.list_by_owner(&session.user, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }
    if agents.is_empty() {
        println!("No agents for {}.", session.user);
        return Ok(());
    }

    println!("{} ({} agents)", style("Agents").bold(), agents.len());
    println!("{}", "-".repeat(80));
    for agent in &agents {
        println!(
            "{}  {:<20}  {}  {:<18}  trust {}",
            style(agent.id).dim(),
            truncate_output(&agent.name, 20),
            status_label(agent.status),
            agent.license.permission_level.as_str(),
            agent.reputation.trust_score,
        );
    }
    Ok(())
}

fn cmd_show(session: &Session, id: uuid::Uuid, json: bool) -> Result<()> {
    let store = session.open_store()?;
    let agent = owned_agent(&store, session, id)?;
    let tasks = store.tasks.for_agent(id)?;

    if json {
        let value = serde_json::json!({
            "agent": agent,
            "tasks": tasks,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_agent(&agent);
    let license = &agent.license;
    println!("   Jurisdiction: {}", join_or_dash(license.jurisdiction.iter()));
    println!("   Permitted:    {}", join_or_dash(license.permitted_actions.iter()));
    println!("   Prohibited:   {}", join_or_dash(license.prohibited_actions.iter()));
    if !license.insurance_policy_id.is_empty() {
        println!("   Insurance:    {}", license.insurance_policy_id);
    }

    let rep = &agent.reputation;
    println!();
    println!("{}", style("Reputation").bold());
    println!("   Tasks:         {}", rep.tasks_completed);
    println!("   Success rate:  {}%", rep.success_rate);
    println!("   Avg response:  {}s", rep.avg_response_time);
    println!("   Trust score:   {}/100", rep.trust_score);

    println!();
    println!("{} ({})", style("Tasks").bold(), tasks.len());
    for task in tasks.iter().take(10) {
        println!(
            "   {}  {:<9}  {}",
            style(task.created_at.format("%Y-%m-%d %H:%M")).dim(),
            task.status.as_str(),
            truncate_output(&task.description, 60)
        );
    }
    Ok(())
}

fn cmd_revoke(session: &Session, id: uuid::Uuid) -> Result<()> {
    let store = session.open_store()?;
    owned_agent(&store, session, id)?;

    match store.agents.revoke(id, &session.user)? {
        RevokeOutcome::Revoked { revoked_at } => {
            println!(
                "{} Agent {id} revoked at {}",
                style("✓").green(),
                revoked_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        RevokeOutcome::AlreadyInactive(status) => {
            println!("Agent {id} is already {status}; nothing to do.");
        }
        RevokeOutcome::NotFound => return Err(AioosError::AgentNotFound(id)),
    }
    Ok(())
}

fn print_agent(agent: &Agent) {
    println!("   ID:           {}", agent.id);
    println!("   Name:         {}", agent.name);
    println!("   Status:       {}", status_label(agent.status));
    println!(
        "   License:      {} ({})",
        agent.license.license_type, agent.license.permission_level
    );
    match agent.expires_at {
        Some(exp) => println!("   Expires:      {}", exp.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("   Expires:      never"),
    }
    if let Some(revoked) = agent.revoked_at {
        println!("   Revoked:      {}", revoked.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

fn status_label(status: AgentStatus) -> console::StyledObject<&'static str> {
    match status {
        AgentStatus::Active => style("active ").green(),
        AgentStatus::Revoked => style("revoked").red(),
        AgentStatus::Expired => style("expired").yellow(),
    }
}

fn join_or_dash<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() { "-".into() } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> LicenseFlags {
        LicenseFlags {
            license_type: None,
            level: None,
            permit: Vec::new(),
            prohibit: Vec::new(),
            jurisdiction: Vec::new(),
            insurance: None,
        }
    }

    #[test]
    fn test_no_flags_means_registry_default() {
        let license = flags().into_license(PermissionLevel::Autonomous).unwrap();
        assert!(license.is_none());
    }

    #[test]
    fn test_flags_build_license() {
        let mut f = flags();
        f.license_type = Some("Travel".into());
        f.prohibit = vec!["wire_money".into()];
        let license = f
            .into_license(PermissionLevel::ExecuteWithHuman)
            .unwrap()
            .unwrap();
        assert_eq!(license.license_type, "Travel");
        assert_eq!(license.permission_level, PermissionLevel::ExecuteWithHuman);
        assert!(license.prohibits("wire_money"));
    }

    #[test]
    fn test_bad_level_is_rejected() {
        let mut f = flags();
        f.level = Some("root".into());
        assert!(f.into_license(PermissionLevel::Autonomous).is_err());
    }
}
