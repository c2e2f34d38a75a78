use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Keywords that push task complexity up by 4.
pub const HIGH_RISK_KEYWORDS: &[&str] = &[
    "transfer", "payment", "transaction", "money", "funds", "bank", "wire",
    "legal", "contract", "agreement", "lawsuit", "liability", "compliance",
    "delete", "remove", "destroy", "permanent", "irreversible",
    "password", "credential", "secret", "private key", "api key",
    "medical", "diagnosis", "treatment", "prescription",
    "hire", "fire", "terminate", "salary", "compensation",
];

/// Keywords that push task complexity up by 2 when no high-risk keyword is present.
pub const MEDIUM_RISK_KEYWORDS: &[&str] = &[
    "send", "email", "message", "contact", "share",
    "create", "modify", "update", "change", "edit",
    "schedule", "book", "reserve", "appointment",
    "report", "analysis", "summary", "review",
];

pub const FINANCIAL_KEYWORDS: &[&str] = &[
    "dollar", "price", "cost", "budget", "expense", "revenue",
    "trade", "stock", "crypto", "bitcoin", "invest", "portfolio",
    "$", "€", "£", "¥",
];

pub const LEGAL_KEYWORDS: &[&str] = &[
    "contract", "agreement", "terms", "policy", "legal", "law",
    "compliance", "regulation", "liability", "indemnify", "warranty",
    "sue", "court", "attorney", "lawyer",
];

pub const SENSITIVE_DATA_KEYWORDS: &[&str] = &[
    "personal", "private", "confidential", "secret", "ssn", "social security",
    "credit card", "password", "health", "medical", "phi", "pii",
];

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$[0-9,]+|[0-9]+\s*(dollar|usd|eur|gbp)").expect("amount pattern is valid")
});

/// The four risk axes, each in `0..=10`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub task_complexity: u8,
    pub data_sensitivity: u8,
    pub financial_impact: u8,
    pub legal_implications: u8,
}

impl SubScores {
    /// Every axis at its maximum.
    pub const MAX: SubScores = SubScores {
        task_complexity: 10,
        data_sensitivity: 10,
        financial_impact: 10,
        legal_implications: 10,
    };

    /// Weighted average (0.2 / 0.3 / 0.3 / 0.2) rounded to one decimal.
    pub fn overall(&self) -> f64 {
        let raw = f64::from(self.task_complexity) * 0.2
            + f64::from(self.data_sensitivity) * 0.3
            + f64::from(self.financial_impact) * 0.3
            + f64::from(self.legal_implications) * 0.2;
        (raw * 10.0).round() / 10.0
    }
}

/// Strategy that turns a task description into sub-scores.
///
/// Escalation mapping never looks inside a scorer, so a real classifier can
/// replace the keyword heuristic without touching the decision rules.
pub trait RiskScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, text: &str) -> SubScores;
}

/// Fixed keyword-list heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRiskScorer;

impl KeywordRiskScorer {
    pub fn task_complexity(&self, text: &str, lower: &str) -> u8 {
        let length_part = (text.chars().count() as f64 / 50.0).min(5.0);
        let bonus = if contains_any(lower, HIGH_RISK_KEYWORDS) {
            4.0
        } else if contains_any(lower, MEDIUM_RISK_KEYWORDS) {
            2.0
        } else {
            0.0
        };
        ((length_part + bonus).round() as u8).min(10)
    }

    pub fn data_sensitivity(&self, lower: &str) -> u8 {
        if contains_any(lower, SENSITIVE_DATA_KEYWORDS) {
            8
        } else if lower.contains("data") || lower.contains("information") {
            3
        } else {
            0
        }
    }

    pub fn financial_impact(&self, text: &str, lower: &str) -> u8 {
        if !contains_any(lower, FINANCIAL_KEYWORDS) {
            return 0;
        }
        match parse_amount(text) {
            Some(amount) if amount > 1000 => 9,
            Some(amount) if amount > 100 => 7,
            _ => 6,
        }
    }

    pub fn legal_implications(&self, lower: &str) -> u8 {
        if contains_any(lower, LEGAL_KEYWORDS) { 7 } else { 0 }
    }
}

impl RiskScorer for KeywordRiskScorer {
    fn name(&self) -> &str {
        "keyword"
    }

    fn score(&self, text: &str) -> SubScores {
        let lower = text.to_lowercase();
        SubScores {
            task_complexity: self.task_complexity(text, &lower),
            data_sensitivity: self.data_sensitivity(&lower),
            financial_impact: self.financial_impact(text, &lower),
            legal_implications: self.legal_implications(&lower),
        }
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

/// First monetary amount in the text (`$1,500`, `250 usd`, ...), digits only.
///
/// Amounts too large for a `u64` saturate; a bare `$` or `$,` yields `None`.
pub fn parse_amount(text: &str) -> Option<u64> {
    let found = AMOUNT_RE.find(text)?;
    let digits: String = found.as_str().chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(digits.parse::<u64>().unwrap_or(u64::MAX))
}
