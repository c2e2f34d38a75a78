use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::license::{License, PermissionLevel};
use crate::scorer::{KeywordRiskScorer, RiskScorer, SubScores};

/// Outcome of risk evaluation, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    /// The agent may proceed on its own.
    AiHandles,
    /// A human must confirm before the agent proceeds.
    HumanReview,
    /// A human must act; the agent may not execute.
    HumanRequired,
}

impl EscalationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiHandles => "ai_handles",
            Self::HumanReview => "human_review",
            Self::HumanRequired => "human_required",
        }
    }

    pub fn requires_human(&self) -> bool {
        *self != Self::AiHandles
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one task description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub task_complexity: u8,
    pub data_sensitivity: u8,
    pub financial_impact: u8,
    pub legal_implications: u8,
    pub overall_score: f64,
    pub escalation_level: EscalationLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    /// Prohibited actions that matched the task text (empty when none did).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prohibited_matches: Vec<String>,
}

impl RiskAssessment {
    pub fn sub_scores(&self) -> SubScores {
        SubScores {
            task_complexity: self.task_complexity,
            data_sensitivity: self.data_sensitivity,
            financial_impact: self.financial_impact,
            legal_implications: self.legal_implications,
        }
    }

    pub fn is_prohibited(&self) -> bool {
        !self.prohibited_matches.is_empty()
    }
}

/// Which prohibited actions a task description touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProhibitedMatch {
    pub matched_actions: Vec<String>,
}

impl ProhibitedMatch {
    pub fn is_prohibited(&self) -> bool {
        !self.matched_actions.is_empty()
    }
}

/// Match prohibited actions against a task description.
///
/// Each action is lower-cased and split on `_`; the action matches when any
/// resulting token occurs as a substring of the lower-cased task. Matching is
/// literal: `financial_transactions` does not match "transfer". Blank tokens
/// are skipped.
pub fn check_prohibited_actions<'a, I>(task: &str, prohibited_actions: I) -> ProhibitedMatch
where
    I: IntoIterator<Item = &'a String>,
{
    let lower_task = task.to_lowercase();
    let matched_actions = prohibited_actions
        .into_iter()
        .filter(|action| {
            action
                .to_lowercase()
                .split(['_', ' '])
                .filter(|token| !token.is_empty())
                .any(|token| lower_task.contains(token))
        })
        .cloned()
        .collect();
    ProhibitedMatch { matched_actions }
}

/// Map an overall score and permission level to an escalation decision.
///
/// Rules apply in order: advisory-only always needs a human; execute-with-human
/// needs review above 3; otherwise 7+ needs a human and 4+ needs review.
pub fn escalate(overall_score: f64, level: PermissionLevel) -> (EscalationLevel, Option<String>) {
    match level {
        PermissionLevel::AdvisoryOnly => (
            EscalationLevel::HumanRequired,
            Some(
                "Agent is in advisory-only mode - all actions require human execution".to_string(),
            ),
        ),
        PermissionLevel::ExecuteWithHuman if overall_score > 3.0 => (
            EscalationLevel::HumanReview,
            Some("Execute-with-human mode - task requires confirmation".to_string()),
        ),
        _ if overall_score >= 7.0 => (
            EscalationLevel::HumanRequired,
            Some(format!(
                "High risk score ({overall_score}/10) - human intervention required"
            )),
        ),
        _ if overall_score >= 4.0 => (
            EscalationLevel::HumanReview,
            Some(format!(
                "Medium risk score ({overall_score}/10) - human review recommended"
            )),
        ),
        _ => (EscalationLevel::AiHandles, None),
    }
}

/// Scores tasks with a pluggable [`RiskScorer`] and applies the escalation rules.
pub struct RiskEvaluator {
    scorer: Box<dyn RiskScorer>,
}

impl Default for RiskEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskEvaluator {
    /// Evaluator backed by the keyword heuristic.
    pub fn new() -> Self {
        Self::with_scorer(Box::new(KeywordRiskScorer))
    }

    pub fn with_scorer(scorer: Box<dyn RiskScorer>) -> Self {
        Self { scorer }
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Evaluate a task against a license at the given permission level.
    ///
    /// A prohibited-action match short-circuits to maximal risk and
    /// `HumanRequired` before any scoring happens.
    pub fn evaluate(
        &self,
        task: &str,
        license: &License,
        permission_level: PermissionLevel,
    ) -> RiskAssessment {
        let prohibited = check_prohibited_actions(task, &license.prohibited_actions);
        if prohibited.is_prohibited() {
            info!(
                matched = ?prohibited.matched_actions,
                license = %license.license_type,
                "task touches prohibited actions"
            );
            let max = SubScores::MAX;
            return RiskAssessment {
                task_complexity: max.task_complexity,
                data_sensitivity: max.data_sensitivity,
                financial_impact: max.financial_impact,
                legal_implications: max.legal_implications,
                overall_score: 10.0,
                escalation_level: EscalationLevel::HumanRequired,
                escalation_reason: Some(format!(
                    "Prohibited actions detected: {}",
                    prohibited.matched_actions.join(", ")
                )),
                prohibited_matches: prohibited.matched_actions,
            };
        }

        let scores = self.scorer.score(task);
        let overall_score = scores.overall();
        let (escalation_level, escalation_reason) = escalate(overall_score, permission_level);

        debug!(
            scorer = self.scorer.name(),
            overall_score,
            %escalation_level,
            %permission_level,
            "task risk evaluated"
        );

        RiskAssessment {
            task_complexity: scores.task_complexity,
            data_sensitivity: scores.data_sensitivity,
            financial_impact: scores.financial_impact,
            legal_implications: scores.legal_implications,
            overall_score,
            escalation_level,
            escalation_reason,
            prohibited_matches: Vec::new(),
        }
    }
}

/// Evaluate a task with the default keyword evaluator.
pub fn evaluate_risk(
    task: &str,
    license: &License,
    permission_level: PermissionLevel,
) -> RiskAssessment {
    RiskEvaluator::new().evaluate(task, license, permission_level)
}
