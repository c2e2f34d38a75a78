//! # aioos-governance
//!
//! The authorization and risk escalation model. An agent carries a [`License`]
//! scoping what it may do; a [`RiskEvaluator`] scores free-text task
//! descriptions against that license and maps the score to an
//! [`EscalationLevel`]: let the agent proceed, ask a human to review, or
//! require a human to act.

pub mod license;
pub mod report;
pub mod risk;
pub mod scorer;

pub use license::{License, PermissionLevel};
pub use report::{format_assessment, risk_label};
pub use risk::{
    EscalationLevel, ProhibitedMatch, RiskAssessment, RiskEvaluator, check_prohibited_actions,
    escalate, evaluate_risk,
};
pub use scorer::{KeywordRiskScorer, RiskScorer, SubScores};
