//! Address-resolution policies.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which discovery mechanism a consumer trusts.
///
/// The variants have no severity ordering; compare them only for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStep {
    /// Interface-level registry subscription only.
    ForceInterface,
    /// Subscribe to both mechanisms and arbitrate per request.
    ApplicationFirst,
    /// Application-level service discovery only.
    ForceApplication,
}

impl MigrationStep {
    /// All steps, in declaration order.
    pub const ALL: [MigrationStep; 3] = [
        Self::ForceInterface,
        Self::ApplicationFirst,
        Self::ForceApplication,
    ];

    /// The canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForceInterface => "FORCE_INTERFACE",
            Self::ApplicationFirst => "APPLICATION_FIRST",
            Self::ForceApplication => "FORCE_APPLICATION",
        }
    }
}

impl Default for MigrationStep {
    fn default() -> Self {
        Self::ApplicationFirst
    }
}

impl std::fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a step name outside the recognised set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown migration step '{0}', expected one of FORCE_INTERFACE, APPLICATION_FIRST, FORCE_APPLICATION")]
pub struct UnknownStep(pub String);

impl FromStr for MigrationStep {
    type Err = UnknownStep;

    /// Names are matched exactly; no case folding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_names() {
        for step in MigrationStep::ALL {
            assert_eq!(step.as_str().parse::<MigrationStep>().unwrap(), step);
        }
    }

    #[test]
    fn rejects_other_spellings() {
        assert!("application_first".parse::<MigrationStep>().is_err());
        assert!("FORCE_APP".parse::<MigrationStep>().is_err());
        assert!("".parse::<MigrationStep>().is_err());
    }

    #[test]
    fn serde_uses_config_names() {
        let json = serde_json::to_string(&MigrationStep::ForceApplication).unwrap();
        assert_eq!(json, "\"FORCE_APPLICATION\"");
        let step: MigrationStep = serde_json::from_str("\"FORCE_INTERFACE\"").unwrap();
        assert_eq!(step, MigrationStep::ForceInterface);
    }

    #[test]
    fn default_is_application_first() {
        assert_eq!(MigrationStep::default(), MigrationStep::ApplicationFirst);
    }
}
