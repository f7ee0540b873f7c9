use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::action::{
    ActionId, ActionType, PendingAction, PendingActionStatus, RiskLevel, TriggerContext, UserId,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub String);

/// Outcome recorded in the ledger. Only terminal attempts are recorded, so
/// this is narrower than `PendingActionStatus`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Executed,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "executed" => Some(Self::Executed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Executed
        } else {
            Self::Failed
        }
    }
}

impl From<HistoryStatus> for PendingActionStatus {
    fn from(value: HistoryStatus) -> Self {
        match value {
            HistoryStatus::Executed => Self::Executed,
            HistoryStatus::Failed => Self::Failed,
        }
    }
}

/// Append-only ledger entry. One per terminal attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionHistoryRecord {
    pub id: HistoryId,
    pub user_id: UserId,
    /// Pending row this record resolves; `None` for auto-executed actions.
    pub action_id: Option<ActionId>,
    pub action_type: ActionType,
    pub action_status: HistoryStatus,
    pub payload: Map<String, Value>,
    pub trigger_context: TriggerContext,
    pub risk_level: Option<RiskLevel>,
    pub confidence_score: Option<f64>,
    pub executed_at: DateTime<Utc>,
}

impl ActionHistoryRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        action_id: Option<ActionId>,
        action_type: ActionType,
        action_status: HistoryStatus,
        payload: Map<String, Value>,
        trigger_context: TriggerContext,
        risk_level: Option<RiskLevel>,
        confidence_score: Option<f64>,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryId(uuid::Uuid::new_v4().to_string()),
            user_id,
            action_id,
            action_type,
            action_status,
            payload,
            trigger_context,
            risk_level,
            confidence_score,
            executed_at,
        }
    }

    /// Ledger entry for a staged action whose confirmation has resolved.
    pub fn for_confirmed(
        action: &PendingAction,
        action_status: HistoryStatus,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            action.user_id.clone(),
            Some(action.id.clone()),
            action.action_type.clone(),
            action_status,
            action.payload.clone(),
            TriggerContext::Confirmation,
            Some(action.risk_level),
            action.confidence_score,
            executed_at,
        )
    }
}

pub const MIN_FEEDBACK_RATING: u8 = 1;
pub const MAX_FEEDBACK_RATING: u8 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FeedbackError {
    #[error("rating must be between {MIN_FEEDBACK_RATING} and {MAX_FEEDBACK_RATING}, got {0}")]
    RatingOutOfRange(u8),
}

/// What the user optionally tells us at confirmation time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

impl FeedbackInput {
    pub fn is_empty(&self) -> bool {
        self.rating.is_none()
            && self.comment.as_deref().map(str::trim).map_or(true, str::is_empty)
    }

    pub fn validate(&self) -> Result<(), FeedbackError> {
        match self.rating {
            Some(rating) if !(MIN_FEEDBACK_RATING..=MAX_FEEDBACK_RATING).contains(&rating) => {
                Err(FeedbackError::RatingOutOfRange(rating))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFeedback {
    pub action_id: ActionId,
    pub user_id: UserId,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub time_to_decision_ms: i64,
    pub created_at: DateTime<Utc>,
}
