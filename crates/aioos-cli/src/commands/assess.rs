use console::style;
use uuid::Uuid;

use aioos_core::Result;
use aioos_governance::{EscalationLevel, License, RiskEvaluator, format_assessment};

use super::{Session, owned_agent};

pub(super) fn cmd_assess(
    session: &Session,
    task: String,
    agent: Option<Uuid>,
    level: Option<String>,
    prohibit: Vec<String>,
    json: bool,
) -> Result<()> {
    let license = match agent {
        Some(id) => {
            let store = session.open_store()?;
            owned_agent(&store, session, id)?.license
        }
        None => {
            let level = match level {
                Some(raw) => raw.parse()?,
                None => session.default_level()?,
            };
            let mut license = License::basic(level);
            license.prohibited_actions = prohibit.into_iter().collect();
            license.validate()?;
            license
        }
    };

    if task.trim().is_empty() {
        return Err(aioos_core::AioosError::Validation(
            "task description is required".into(),
        ));
    }

    let evaluator = RiskEvaluator::new();
    let assessment = evaluator.evaluate(&task, &license, license.permission_level);

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }

    let report = format_assessment(&assessment);
    let styled = match assessment.escalation_level {
        EscalationLevel::AiHandles => style(report).green(),
        EscalationLevel::HumanReview => style(report).yellow(),
        EscalationLevel::HumanRequired => style(report).red(),
    };
    println!("{styled}");
    Ok(())
}
