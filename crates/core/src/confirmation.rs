//! Decides whether a proposed action needs a human in the loop.

use serde::{Deserialize, Serialize};

use crate::domain::action::RiskLevel;
use crate::domain::settings::UserAgentSettings;

/// How `auto_approve_low_risk_only` is read for high and critical actions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoApproveMode {
    /// Confirmation is skipped when the user explicitly set the flag to
    /// `false`. This is the behaviour the product shipped with.
    #[default]
    Literal,
    /// High and critical actions always need confirmation; the flag has no
    /// effect on them.
    Strict,
}

impl std::str::FromStr for AutoApproveMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "literal" => Ok(Self::Literal),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unsupported auto approve mode `{other}` (expected literal|strict)")),
        }
    }
}

pub fn requires_confirmation(
    risk_level: RiskLevel,
    settings: Option<&UserAgentSettings>,
    mode: AutoApproveMode,
) -> bool {
    if risk_level < RiskLevel::High {
        return false;
    }

    match mode {
        AutoApproveMode::Strict => true,
        AutoApproveMode::Literal => {
            settings.and_then(|settings| settings.auto_approve_low_risk_only) != Some(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{requires_confirmation, AutoApproveMode};
    use crate::domain::action::{RiskLevel, UserId};
    use crate::domain::settings::UserAgentSettings;

    fn settings(flag: Option<bool>) -> UserAgentSettings {
        let mut settings = UserAgentSettings::unset(UserId("user-1".to_string()));
        settings.auto_approve_low_risk_only = flag;
        settings
    }

    #[test]
    fn low_and_medium_never_need_confirmation() {
        for mode in [AutoApproveMode::Literal, AutoApproveMode::Strict] {
            for flag in [None, Some(true), Some(false)] {
                let settings = settings(flag);
                assert!(!requires_confirmation(RiskLevel::Low, Some(&settings), mode));
                assert!(!requires_confirmation(RiskLevel::Medium, Some(&settings), mode));
            }
        }
    }

    #[test]
    fn high_risk_needs_confirmation_when_flag_is_unset_or_true() {
        assert!(requires_confirmation(RiskLevel::High, None, AutoApproveMode::Literal));
        assert!(requires_confirmation(
            RiskLevel::High,
            Some(&settings(None)),
            AutoApproveMode::Literal
        ));
        assert!(requires_confirmation(
            RiskLevel::Critical,
            Some(&settings(Some(true))),
            AutoApproveMode::Literal
        ));
    }

    // The literal reading: explicitly disabling "approve low risk only"
    // removes the confirmation step for high and critical actions.
    #[test]
    fn literal_mode_skips_confirmation_when_flag_is_explicitly_false() {
        let settings = settings(Some(false));
        assert!(!requires_confirmation(RiskLevel::High, Some(&settings), AutoApproveMode::Literal));
        assert!(!requires_confirmation(
            RiskLevel::Critical,
            Some(&settings),
            AutoApproveMode::Literal
        ));
    }

    #[test]
    fn strict_mode_ignores_the_flag_for_high_risk() {
        let settings = settings(Some(false));
        assert!(requires_confirmation(RiskLevel::High, Some(&settings), AutoApproveMode::Strict));
        assert!(requires_confirmation(RiskLevel::Critical, None, AutoApproveMode::Strict));
    }

    #[test]
    fn mode_parses_from_config_strings() {
        assert_eq!("STRICT".parse::<AutoApproveMode>(), Ok(AutoApproveMode::Strict));
        assert_eq!("literal".parse::<AutoApproveMode>(), Ok(AutoApproveMode::Literal));
        assert!("loose".parse::<AutoApproveMode>().is_err());
    }
}
