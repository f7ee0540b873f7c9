use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use actgate_core::domain::action::{ActionId, PendingAction, PendingActionStatus, UserId};
use actgate_core::domain::history::{ActionFeedback, ActionHistoryRecord};
use actgate_core::domain::settings::{TeamId, TeamPolicy, UserAgentSettings};
use actgate_core::errors::ApplicationError;

pub mod feedback;
pub mod history;
pub mod memory;
pub mod pending_action;
pub mod settings;

pub use feedback::SqlActionFeedbackRepository;
pub use history::SqlActionHistoryRepository;
pub use memory::{
    InMemoryActionFeedbackRepository, InMemoryActionHistoryRepository,
    InMemoryPendingActionRepository, InMemorySettingsRepository,
};
pub use pending_action::SqlPendingActionRepository;
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// Staged actions. Every status change is a single conditional write keyed by
/// `(id, user_id)`; a `None` result means the guard did not match.
#[async_trait]
pub trait PendingActionRepository: Send + Sync {
    async fn insert(&self, action: PendingAction) -> Result<(), RepositoryError>;

    async fn find_for_user(
        &self,
        id: &ActionId,
        user_id: &UserId,
    ) -> Result<Option<PendingAction>, RepositoryError>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        status: Option<PendingActionStatus>,
        limit: u32,
    ) -> Result<Vec<PendingAction>, RepositoryError>;

    /// `pending -> confirmed` while `expires_at >= at`.
    async fn mark_confirmed(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, RepositoryError>;

    /// `pending -> cancelled` while `expires_at >= at`.
    async fn mark_cancelled(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<Option<PendingAction>, RepositoryError>;

    /// `pending -> expired` once `expires_at < at`.
    async fn mark_expired(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, RepositoryError>;

    /// `confirmed -> executed | failed`, taking the status from `history` and
    /// appending `history` in the same write. Either both land or neither does.
    async fn record_outcome(
        &self,
        id: &ActionId,
        user_id: &UserId,
        result: &Value,
        history: &ActionHistoryRecord,
    ) -> Result<Option<PendingAction>, RepositoryError>;

    /// Flips every overdue pending row, optionally for one user only.
    async fn expire_overdue(
        &self,
        user_id: Option<&UserId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<PendingAction>, RepositoryError>;

    /// Deletes terminal rows proposed before `cutoff`.
    async fn delete_resolved_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PendingAction>, RepositoryError>;
}

/// Append-only ledger of terminal attempts.
#[async_trait]
pub trait ActionHistoryRepository: Send + Sync {
    async fn append(&self, record: ActionHistoryRecord) -> Result<(), RepositoryError>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ActionHistoryRecord>, RepositoryError>;
}

#[async_trait]
pub trait ActionFeedbackRepository: Send + Sync {
    async fn insert(&self, feedback: ActionFeedback) -> Result<(), RepositoryError>;

    async fn find_for_action(
        &self,
        action_id: &ActionId,
    ) -> Result<Option<ActionFeedback>, RepositoryError>;
}

/// Team policy and per-user agent settings. Read fresh on every proposal.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn team_policy_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<TeamPolicy>, RepositoryError>;

    async fn find_team_policy(&self, team_id: &TeamId)
        -> Result<Option<TeamPolicy>, RepositoryError>;

    async fn save_team_policy(&self, policy: TeamPolicy) -> Result<(), RepositoryError>;

    /// A user belongs to at most one team; assigning again moves them.
    async fn assign_member(
        &self,
        user_id: &UserId,
        team_id: &TeamId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn user_settings(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserAgentSettings>, RepositoryError>;

    async fn save_user_settings(&self, settings: UserAgentSettings)
        -> Result<(), RepositoryError>;
}

pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|raw| decode_timestamp(column, &raw)).transpose()
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn decode_payload(column: &str, raw: &str) -> Result<Map<String, Value>, RepositoryError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(RepositoryError::Decode(format!(
            "{column}: expected a JSON object, found {other}"
        ))),
        Err(error) => Err(RepositoryError::Decode(format!("{column}: {error}"))),
    }
}

pub(crate) fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use actgate_core::errors::ApplicationError;

    use super::{decode_payload, decode_timestamp, encode_timestamp, RepositoryError};

    #[test]
    fn timestamps_are_fixed_width_and_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).single().expect("valid date");
        let later = earlier + chrono::Duration::milliseconds(1500);

        let (a, b) = (encode_timestamp(earlier), encode_timestamp(later));
        assert_eq!(a, "2026-01-01T09:00:00.000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_timestamp("t", &b).expect("decode"), later);
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(decode_payload("payload_json", "{\"to\":\"+1555\"}").is_ok());
        assert!(decode_payload("payload_json", "null").expect("null").is_empty());
        assert!(decode_payload("payload_json", "[1,2]").is_err());
    }

    #[test]
    fn repository_errors_surface_as_persistence_failures() {
        let error = ApplicationError::from(RepositoryError::Conflict("duplicate".to_string()));
        assert_eq!(
            error,
            ApplicationError::Persistence("constraint violation: duplicate".to_string())
        );
    }
}
