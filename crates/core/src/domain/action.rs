use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DomainError;

/// Fixed lifetime of a staged action before it can no longer be confirmed.
pub const PENDING_ACTION_TTL_MINUTES: i64 = 30;

pub fn pending_action_ttl() -> Duration {
    Duration::minutes(PENDING_ACTION_TTL_MINUTES)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities an agent may request. Anything the model names that is not
/// listed here is carried through as `Other` so it can still be classified,
/// audited and rejected by the executor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionType {
    MarkHabitComplete,
    CreateTask,
    UpdateGoalProgress,
    CreateGoal,
    CreateHabit,
    CreateCalendarEvent,
    SendEmail,
    SendSms,
    MakeVoiceCall,
    Other(String),
}

impl ActionType {
    pub const KNOWN: [ActionType; 9] = [
        Self::MarkHabitComplete,
        Self::CreateTask,
        Self::UpdateGoalProgress,
        Self::CreateGoal,
        Self::CreateHabit,
        Self::CreateCalendarEvent,
        Self::SendEmail,
        Self::SendSms,
        Self::MakeVoiceCall,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::MarkHabitComplete => "mark_habit_complete",
            Self::CreateTask => "create_task",
            Self::UpdateGoalProgress => "update_goal_progress",
            Self::CreateGoal => "create_goal",
            Self::CreateHabit => "create_habit",
            Self::CreateCalendarEvent => "create_calendar_event",
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::MakeVoiceCall => "make_voice_call",
            Self::Other(raw) => raw.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        Self::KNOWN
            .iter()
            .find(|known| known.as_str() == normalized)
            .cloned()
            .unwrap_or_else(|| Self::Other(value.trim().to_string()))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionStatus {
    Pending,
    Confirmed,
    Executed,
    Failed,
    Cancelled,
    Expired,
}

impl PendingActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "executed" => Some(Self::Executed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Cancelled | Self::Expired)
    }

    /// Allowed lifecycle edges. `Confirmed` is transient: it only exists
    /// between the claim and the executor's outcome.
    pub fn can_transition_to(&self, next: PendingActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Pending, Self::Expired)
                | (Self::Confirmed, Self::Executed)
                | (Self::Confirmed, Self::Failed)
        )
    }
}

impl fmt::Display for PendingActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerContext {
    Chat,
    Confirmation,
    LiveVoice,
}

impl TriggerContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Confirmation => "confirmation",
            Self::LiveVoice => "live_voice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "confirmation" => Some(Self::Confirmation),
            "live_voice" => Some(Self::LiveVoice),
            _ => None,
        }
    }
}

/// A tool call proposed by the model, before any decision has been made.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: ActionType,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl ActionRequest {
    pub fn new(action_type: ActionType, payload: Map<String, Value>) -> Self {
        Self { action_type, payload, confidence_score: None }
    }

    pub fn with_confidence(mut self, confidence_score: f64) -> Self {
        self.confidence_score = Some(confidence_score);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ActionId,
    pub user_id: UserId,
    pub session_id: Option<String>,
    pub action_type: ActionType,
    pub payload: Map<String, Value>,
    pub risk_level: RiskLevel,
    pub confidence_score: Option<f64>,
    pub status: PendingActionStatus,
    pub proposed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub execution_result: Option<Value>,
    pub cancel_reason: Option<String>,
}

impl PendingAction {
    /// Stage a new action in `pending` with the fixed TTL.
    pub fn stage(
        user_id: UserId,
        session_id: Option<String>,
        request: ActionRequest,
        risk_level: RiskLevel,
        proposed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActionId::generate(),
            user_id,
            session_id,
            action_type: request.action_type,
            payload: request.payload,
            risk_level,
            confidence_score: request.confidence_score,
            status: PendingActionStatus::Pending,
            proposed_at,
            expires_at: proposed_at + pending_action_ttl(),
            confirmed_at: None,
            executed_at: None,
            execution_result: None,
            cancel_reason: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Status as a reader should see it: overdue pending rows count as expired
    /// even before storage has been updated.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PendingActionStatus {
        if self.status == PendingActionStatus::Pending && self.is_overdue(now) {
            PendingActionStatus::Expired
        } else {
            self.status
        }
    }

    pub fn transition_to(&mut self, next: PendingActionStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidActionTransition { from: self.status, to: next })
    }

    pub fn time_to_decision_ms(&self) -> Option<i64> {
        self.confirmed_at.map(|confirmed_at| (confirmed_at - self.proposed_at).num_milliseconds())
    }
}
