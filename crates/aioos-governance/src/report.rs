use crate::risk::{EscalationLevel, RiskAssessment};

/// Coarse label for a single 0-10 axis.
pub fn risk_label(score: u8) -> &'static str {
    match score {
        0 => "None",
        1..=3 => "Low",
        4..=6 => "Medium",
        _ => "High",
    }
}

fn verdict(level: EscalationLevel) -> &'static str {
    match level {
        EscalationLevel::AiHandles => "AI CAN PROCEED",
        EscalationLevel::HumanReview => "HUMAN REVIEW NEEDED",
        EscalationLevel::HumanRequired => "HUMAN REQUIRED",
    }
}

/// Render an assessment as a multi-line tree for terminals and audit details.
pub fn format_assessment(assessment: &RiskAssessment) -> String {
    let axes = [
        ("Task Complexity", assessment.task_complexity),
        ("Data Sensitivity", assessment.data_sensitivity),
        ("Financial Impact", assessment.financial_impact),
        ("Legal Implications", assessment.legal_implications),
    ];

    let mut out = String::from("RISK ASSESSMENT\n");
    for (name, score) in axes {
        out.push_str(&format!("├── {name}: {} ({score}/10)\n", risk_label(score)));
    }
    out.push_str(&format!(
        "└── OVERALL RISK SCORE: {}/10 — {}",
        assessment.overall_score,
        verdict(assessment.escalation_level)
    ));
    if let Some(ref reason) = assessment.escalation_reason {
        out.push_str(&format!("\n    {reason}"));
    }
    out
}
