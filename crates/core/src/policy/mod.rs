//! Team policy gate, evaluated before anything else in the pipeline.

use crate::domain::action::ActionType;
use crate::domain::settings::TeamPolicy;
use crate::errors::ActionError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { policy: &'static str, reason_code: &'static str, user_message: String },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn into_result(self) -> Result<(), ActionError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny { policy, user_message, .. } => {
                Err(ActionError::PolicyDenied { policy, message: user_message })
            }
        }
    }
}

/// Capabilities that a team can switch off. Anything not listed is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatedCapability {
    Email,
    Sms,
    VoiceCall,
}

impl GatedCapability {
    pub fn for_action(action_type: &ActionType) -> Option<Self> {
        match action_type {
            ActionType::SendEmail => Some(Self::Email),
            ActionType::SendSms => Some(Self::Sms),
            ActionType::MakeVoiceCall => Some(Self::VoiceCall),
            _ => None,
        }
    }

    pub fn policy_flag(&self) -> &'static str {
        match self {
            Self::Email => "allow_send_email",
            Self::Sms => "allow_send_sms",
            Self::VoiceCall => "allow_voice_calls",
        }
    }

    fn reason_code(&self) -> &'static str {
        match self {
            Self::Email => "team_email_disabled",
            Self::Sms => "team_sms_disabled",
            Self::VoiceCall => "team_voice_calls_disabled",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Email => "sending email",
            Self::Sms => "sending SMS messages",
            Self::VoiceCall => "placing voice calls",
        }
    }

    fn is_enabled(&self, policy: &TeamPolicy) -> bool {
        match self {
            Self::Email => policy.allow_send_email,
            Self::Sms => policy.allow_send_sms,
            Self::VoiceCall => policy.allow_voice_calls,
        }
    }
}

pub fn check_policy(team_policy: Option<&TeamPolicy>, action_type: &ActionType) -> PolicyDecision {
    let Some(policy) = team_policy else {
        return PolicyDecision::Allow;
    };
    let Some(capability) = GatedCapability::for_action(action_type) else {
        return PolicyDecision::Allow;
    };

    if capability.is_enabled(policy) {
        return PolicyDecision::Allow;
    }

    PolicyDecision::Deny {
        policy: capability.policy_flag(),
        reason_code: capability.reason_code(),
        user_message: format!(
            "Your team's policy does not allow {} (`{}` is disabled for team `{}`).",
            capability.description(),
            capability.policy_flag(),
            policy.team_id.0
        ),
    }
}
