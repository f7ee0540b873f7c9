use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

/// Team-level capability switches. A user without a team is unrestricted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPolicy {
    pub team_id: TeamId,
    pub allow_send_email: bool,
    pub allow_send_sms: bool,
    pub allow_voice_calls: bool,
    pub updated_at: DateTime<Utc>,
}

impl TeamPolicy {
    pub fn permissive(team_id: TeamId) -> Self {
        Self {
            team_id,
            allow_send_email: true,
            allow_send_sms: true,
            allow_voice_calls: true,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentSettings {
    pub user_id: UserId,
    /// Tri-state on purpose: unset and `true` behave the same, only an explicit
    /// `false` changes confirmation gating.
    pub auto_approve_low_risk_only: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl UserAgentSettings {
    pub fn unset(user_id: UserId) -> Self {
        Self { user_id, auto_approve_low_risk_only: None, updated_at: Utc::now() }
    }
}
