use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use aioos_core::{AioosError, Result};

/// How much latitude an agent has before a human must step in.
///
/// - **Advisory only**: the agent may only advise; every action goes to a human.
/// - **Execute with human**: anything above trivial risk needs confirmation.
/// - **Autonomous**: escalates only on medium or high risk scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    AdvisoryOnly,
    ExecuteWithHuman,
    Autonomous,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdvisoryOnly => "advisory_only",
            Self::ExecuteWithHuman => "execute_with_human",
            Self::Autonomous => "autonomous",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::AdvisoryOnly => "Agent advises only, a human executes every action",
            Self::ExecuteWithHuman => "Agent executes after human confirmation",
            Self::Autonomous => "Agent executes independently, escalates risky tasks",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = AioosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "advisory_only" => Ok(Self::AdvisoryOnly),
            "execute_with_human" => Ok(Self::ExecuteWithHuman),
            "autonomous" => Ok(Self::Autonomous),
            other => Err(AioosError::Validation(format!(
                "unknown permission level '{other}' (expected advisory_only, execute_with_human or autonomous)"
            ))),
        }
    }
}

/// Static authorization record scoping what an agent may and may not do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    /// Descriptive category, e.g. "RealEstate".
    pub license_type: String,
    #[serde(default)]
    pub jurisdiction: BTreeSet<String>,
    pub permission_level: PermissionLevel,
    #[serde(default)]
    pub permitted_actions: BTreeSet<String>,
    #[serde(default)]
    pub prohibited_actions: BTreeSet<String>,
    /// Opaque reference to an insurance policy.
    #[serde(default)]
    pub insurance_policy_id: String,
}

impl License {
    /// The license given to agents created without one.
    pub fn basic(permission_level: PermissionLevel) -> Self {
        Self {
            license_type: "Basic".into(),
            jurisdiction: BTreeSet::new(),
            permission_level,
            permitted_actions: BTreeSet::new(),
            prohibited_actions: BTreeSet::new(),
            insurance_policy_id: String::new(),
        }
    }

    /// Check the license before it is attached to an agent.
    ///
    /// Rejects an empty type, blank action names, and any action that is both
    /// permitted and prohibited (compared case-insensitively).
    pub fn validate(&self) -> Result<()> {
        if self.license_type.trim().is_empty() {
            return Err(AioosError::Validation("license type is required".into()));
        }

        let blank = self
            .permitted_actions
            .iter()
            .chain(self.prohibited_actions.iter())
            .any(|a| a.trim().is_empty());
        if blank {
            return Err(AioosError::Validation(
                "license actions must not be blank".into(),
            ));
        }

        let prohibited: BTreeSet<String> = self
            .prohibited_actions
            .iter()
            .map(|a| a.to_lowercase())
            .collect();
        let overlap: Vec<&str> = self
            .permitted_actions
            .iter()
            .filter(|a| prohibited.contains(&a.to_lowercase()))
            .map(String::as_str)
            .collect();
        if !overlap.is_empty() {
            return Err(AioosError::Validation(format!(
                "actions both permitted and prohibited: {}",
                overlap.join(", ")
            )));
        }

        Ok(())
    }

    /// Whether `action` is explicitly permitted by name.
    pub fn permits(&self, action: &str) -> bool {
        self.permitted_actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(action))
    }

    /// Whether `action` is explicitly prohibited by name.
    pub fn prohibits(&self, action: &str) -> bool {
        self.prohibited_actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(action))
    }
}
