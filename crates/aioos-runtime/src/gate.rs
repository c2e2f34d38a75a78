use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use aioos_core::{AgentId, AioosError, Event, EventBus, Result, TaskId};
use aioos_governance::{EscalationLevel, RiskAssessment, RiskEvaluator};
use aioos_registry::{AgentStatus, RegistryStore, TaskRecord, TaskStatus, TaskStep, TaskUpdate};

/// What the gate decided about one execution request.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Cleared to run. A task record exists in `running` state.
    Authorized {
        task_id: TaskId,
        assessment: RiskAssessment,
    },
    /// Needs a human to confirm; call again with `confirmed = true`.
    NeedsConfirmation(RiskAssessment),
    /// A human must act. Confirmation does not unlock this.
    Blocked(RiskAssessment),
    /// The agent is revoked or expired.
    Inactive(AgentStatus),
}

impl GateDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }

    pub fn assessment(&self) -> Option<&RiskAssessment> {
        match self {
            Self::Authorized { assessment, .. }
            | Self::NeedsConfirmation(assessment)
            | Self::Blocked(assessment) => Some(assessment),
            Self::Inactive(_) => None,
        }
    }
}

/// Authorizes tasks against an agent's lifecycle and license, and records
/// how they finish.
pub struct ExecutionGate {
    store: Arc<RegistryStore>,
    evaluator: RiskEvaluator,
    events: Option<EventBus>,
    preview_chars: usize,
}

impl ExecutionGate {
    pub fn new(store: Arc<RegistryStore>) -> Self {
        Self {
            store,
            evaluator: RiskEvaluator::new(),
            events: None,
            preview_chars: 100,
        }
    }

    pub fn with_evaluator(mut self, evaluator: RiskEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// How much of the task description goes into the `task_started` entry.
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn evaluator(&self) -> &RiskEvaluator {
        &self.evaluator
    }

    pub fn authorize(
        &self,
        agent_id: AgentId,
        actor_id: &str,
        description: &str,
        confirmed: bool,
    ) -> Result<GateDecision> {
        self.authorize_at(agent_id, actor_id, description, confirmed, Utc::now())
    }

    /// Decide whether `actor_id` may run `description` on the agent at `now`.
    ///
    /// Errors are reserved for bad input, unknown agents, foreign owners and
    /// storage failures. Every decision taken on a known agent is audited.
    pub fn authorize_at(
        &self,
        agent_id: AgentId,
        actor_id: &str,
        description: &str,
        confirmed: bool,
        now: DateTime<Utc>,
    ) -> Result<GateDecision> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AioosError::Validation("task description is required".into()));
        }

        let agent = self
            .store
            .agents
            .get(agent_id, now)?
            .ok_or(AioosError::AgentNotFound(agent_id))?;
        if agent.owner_id != actor_id {
            warn!(agent_id = %agent_id, actor = actor_id, "task request from non-owner");
            return Err(AioosError::Forbidden(format!(
                "agent {agent_id} does not belong to {actor_id}"
            )));
        }

        if !agent.is_valid_at(now) {
            self.store.audit.append(
                Some(agent_id),
                Some(actor_id),
                "task_rejected",
                Some(&format!("Agent is {}", agent.status)),
            )?;
            info!(agent_id = %agent_id, status = %agent.status, "task rejected, agent inactive");
            return Ok(GateDecision::Inactive(agent.status));
        }

        let assessment = self.evaluator.evaluate(
            description,
            &agent.license,
            agent.license.permission_level,
        );

        match assessment.escalation_level {
            EscalationLevel::HumanRequired => {
                self.escalated(agent_id, actor_id, "task_blocked", &assessment)?;
                return Ok(GateDecision::Blocked(assessment));
            }
            EscalationLevel::HumanReview if !confirmed => {
                self.escalated(agent_id, actor_id, "task_escalated", &assessment)?;
                return Ok(GateDecision::NeedsConfirmation(assessment));
            }
            _ => {}
        }

        let preview: String = description.chars().take(self.preview_chars).collect();
        let task = self.store.tasks.start(
            agent_id,
            actor_id,
            description,
            &format!("Task: {preview}"),
        )?;

        info!(
            task_id = %task.id,
            agent_id = %agent_id,
            score = assessment.overall_score,
            confirmed,
            "task authorized"
        );
        self.publish(Event::TaskAuthorized {
            task_id: task.id,
            agent_id,
            overall_score: assessment.overall_score,
        });

        Ok(GateDecision::Authorized {
            task_id: task.id,
            assessment,
        })
    }

    /// Polled by executors between steps. An agent that is gone, revoked or
    /// expired yields `AgentRevoked`.
    pub fn ensure_active(&self, agent_id: AgentId) -> Result<()> {
        if self.store.agents.is_valid(agent_id, Utc::now())? {
            Ok(())
        } else {
            Err(AioosError::AgentRevoked(agent_id))
        }
    }

    /// Persist progress for a running task.
    pub fn record_steps(&self, task_id: TaskId, steps: Vec<TaskStep>) -> Result<TaskRecord> {
        self.store.tasks.update(
            task_id,
            TaskUpdate {
                steps: Some(steps),
                ..Default::default()
            },
        )
    }

    /// Audit the outcome of a delegation check made during execution.
    pub fn record_delegation_check(
        &self,
        agent_id: AgentId,
        actor_id: &str,
        status: &str,
    ) -> Result<()> {
        self.store.audit.append(
            Some(agent_id),
            Some(actor_id),
            "delegation_verified",
            Some(&format!("Status: {status}")),
        )?;
        Ok(())
    }

    /// Mark a running task completed and credit the agent's reputation.
    pub fn complete(
        &self,
        task_id: TaskId,
        actor_id: &str,
        result: &str,
        elapsed: Duration,
    ) -> Result<TaskRecord> {
        let record = self.store.tasks.finish(
            task_id,
            actor_id,
            TaskStatus::Completed,
            result,
            elapsed.as_secs_f64(),
            "Task completed successfully",
        )?;

        info!(task_id = %task_id, agent_id = %record.agent_id, elapsed_ms = elapsed.as_millis() as u64, "task completed");
        self.publish(Event::TaskFinished {
            task_id,
            agent_id: record.agent_id,
            success: true,
        });
        Ok(record)
    }

    /// Mark a running task failed.
    ///
    /// An `AgentRevoked` error aborts the task instead; aborts leave the
    /// agent's reputation untouched.
    pub fn fail(
        &self,
        task_id: TaskId,
        actor_id: &str,
        error: &AioosError,
        elapsed: Duration,
    ) -> Result<TaskRecord> {
        let message = error.to_string();
        let record = if matches!(error, AioosError::AgentRevoked(_)) {
            let record = self.store.tasks.finish(
                task_id,
                actor_id,
                TaskStatus::Aborted,
                &message,
                elapsed.as_secs_f64(),
                "Task aborted due to agent revocation",
            )?;
            warn!(task_id = %task_id, agent_id = %record.agent_id, "task aborted, agent no longer active");
            record
        } else {
            let record = self.store.tasks.finish(
                task_id,
                actor_id,
                TaskStatus::Failed,
                &message,
                elapsed.as_secs_f64(),
                &message,
            )?;
            warn!(task_id = %task_id, agent_id = %record.agent_id, error = %message, "task failed");
            record
        };

        self.publish(Event::TaskFinished {
            task_id,
            agent_id: record.agent_id,
            success: false,
        });
        Ok(record)
    }

    fn escalated(
        &self,
        agent_id: AgentId,
        actor_id: &str,
        action: &str,
        assessment: &RiskAssessment,
    ) -> Result<()> {
        let reason = assessment.escalation_reason.clone();
        self.store.audit.append(
            Some(agent_id),
            Some(actor_id),
            action,
            Some(&format!(
                "{} (score {}/10)",
                reason.as_deref().unwrap_or("Escalated"),
                assessment.overall_score
            )),
        )?;
        info!(
            agent_id = %agent_id,
            level = %assessment.escalation_level,
            score = assessment.overall_score,
            action,
            "task escalated"
        );
        self.publish(Event::TaskEscalated {
            agent_id,
            escalation_level: assessment.escalation_level.to_string(),
            reason,
        });
        Ok(())
    }

    fn publish(&self, event: Event) {
        if let Some(ref events) = self.events {
            events.publish(event);
        }
    }
}
