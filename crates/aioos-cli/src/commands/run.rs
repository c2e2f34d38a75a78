use console::style;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use aioos_core::{AioosError, EventBus, Result, TaskId};
use aioos_governance::format_assessment;
use aioos_registry::{TaskStatus, TaskStep};
use aioos_runtime::{ExecutionGate, ExpirySweeper, GateDecision};

use super::Session;

/// Stages a governed task passes through. Each one re-checks the agent first,
/// so a revoke or expiry lands between stages.
const STAGES: [&str; 3] = ["Verify delegation", "Execute task", "Record outcome"];

pub(super) async fn cmd_run(session: &Session, agent_id: Uuid, task: String, confirm: bool) -> Result<()> {
    let store = session.open_store()?;
    let events = EventBus::default();
    let gate = ExecutionGate::new(store.clone())
        .with_events(events.clone())
        .with_preview_chars(session.config.governance.task_preview_chars);

    let cancel = CancellationToken::new();
    let sweeper = session.config.sweep.enabled.then(|| {
        ExpirySweeper::from_config(store.clone(), events.clone(), &session.config.sweep)
            .spawn(cancel.clone())
    });

    let outcome = authorize_and_run(&gate, session, agent_id, &task, confirm).await;

    cancel.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    outcome
}

async fn authorize_and_run(
    gate: &ExecutionGate,
    session: &Session,
    agent_id: Uuid,
    task: &str,
    confirm: bool,
) -> Result<()> {
    match gate.authorize(agent_id, &session.user, task, confirm)? {
        GateDecision::Authorized {
            task_id,
            assessment,
        } => {
            println!("{}", format_assessment(&assessment));
            println!();
            execute(gate, session, agent_id, task_id).await
        }
        GateDecision::NeedsConfirmation(assessment) => {
            println!("{}", style(format_assessment(&assessment)).yellow());
            println!();
            println!("Re-run with --confirm to proceed.");
            Ok(())
        }
        GateDecision::Blocked(assessment) => {
            println!("{}", style(format_assessment(&assessment)).red());
            println!();
            println!("{} A human must carry out this task.", style("✗").red());
            Ok(())
        }
        GateDecision::Inactive(status) => {
            println!("{} Agent {agent_id} is {status} and cannot run tasks.", style("✗").red());
            Ok(())
        }
    }
}

async fn execute(gate: &ExecutionGate, session: &Session, agent_id: Uuid, task_id: TaskId) -> Result<()> {
    let started = Instant::now();

    if let Err(e) = run_stages(gate, session, agent_id, task_id).await {
        gate.fail(task_id, &session.user, &e, started.elapsed())?;
        println!("{} {e}", style("✗").red());
        return match e {
            AioosError::AgentRevoked(_) => Ok(()),
            other => Err(other),
        };
    }

    let record = gate.complete(
        task_id,
        &session.user,
        "All stages completed",
        started.elapsed(),
    )?;
    println!();
    println!("{} Task {} {}", style("✓").green(), record.id, record.status);
    Ok(())
}

/// Walk the stages, stopping at the first error. The caller finishes the task
/// either way.
async fn run_stages(gate: &ExecutionGate, session: &Session, agent_id: Uuid, task_id: TaskId) -> Result<()> {
    let mut steps = Vec::with_capacity(STAGES.len());

    for (i, stage) in STAGES.iter().enumerate() {
        gate.ensure_active(agent_id)?;

        println!("   {} {}", style("✓").green(), stage);
        if i == 0 {
            gate.record_delegation_check(agent_id, &session.user, "verified")?;
        }
        steps.push(TaskStep::new(i as u32 + 1, *stage, TaskStatus::Completed));
        gate.record_steps(task_id, steps.clone())?;
        tokio::task::yield_now().await;
    }
    Ok(())
}
