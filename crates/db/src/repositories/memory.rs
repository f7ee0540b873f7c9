//! In-process repositories with the same guard semantics as the SQL ones.
//! Each conditional write happens under a single write lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use actgate_core::domain::action::{ActionId, PendingAction, PendingActionStatus, UserId};
use actgate_core::domain::history::{ActionFeedback, ActionHistoryRecord};
use actgate_core::domain::settings::{TeamId, TeamPolicy, UserAgentSettings};

use super::{
    ActionFeedbackRepository, ActionHistoryRepository, PendingActionRepository, RepositoryError,
    SettingsRepository,
};

/// Outcome writes go through the attached history store; the status change is
/// only kept once the history append has succeeded.
pub struct InMemoryPendingActionRepository {
    actions: RwLock<HashMap<String, PendingAction>>,
    history: Arc<dyn ActionHistoryRepository>,
}

impl Default for InMemoryPendingActionRepository {
    fn default() -> Self {
        Self::with_history(Arc::new(InMemoryActionHistoryRepository::default()))
    }
}

impl InMemoryPendingActionRepository {
    pub fn with_history(history: Arc<dyn ActionHistoryRepository>) -> Self {
        Self { actions: RwLock::default(), history }
    }

    async fn transition<F>(
        &self,
        id: &ActionId,
        user_id: &UserId,
        apply: F,
    ) -> Result<Option<PendingAction>, RepositoryError>
    where
        F: FnOnce(&mut PendingAction) -> bool + Send,
    {
        let mut actions = self.actions.write().await;
        let Some(action) = actions.get_mut(&id.0).filter(|action| action.user_id == *user_id)
        else {
            return Ok(None);
        };

        let mut candidate = action.clone();
        if !apply(&mut candidate) {
            return Ok(None);
        }
        *action = candidate.clone();
        Ok(Some(candidate))
    }
}

#[async_trait::async_trait]
impl PendingActionRepository for InMemoryPendingActionRepository {
    async fn insert(&self, action: PendingAction) -> Result<(), RepositoryError> {
        let mut actions = self.actions.write().await;
        if actions.contains_key(&action.id.0) {
            return Err(RepositoryError::Conflict(format!("pending action {} exists", action.id)));
        }
        actions.insert(action.id.0.clone(), action);
        Ok(())
    }

    async fn find_for_user(
        &self,
        id: &ActionId,
        user_id: &UserId,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions.get(&id.0).filter(|action| action.user_id == *user_id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        status: Option<PendingActionStatus>,
        limit: u32,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let actions = self.actions.read().await;
        let mut listed: Vec<PendingAction> = actions
            .values()
            .filter(|action| action.user_id == *user_id)
            .filter(|action| status.map_or(true, |status| action.status == status))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.proposed_at.cmp(&a.proposed_at).then_with(|| a.id.cmp(&b.id)));
        listed.truncate(limit as usize);
        Ok(listed)
    }

    async fn mark_confirmed(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        self.transition(id, user_id, |action| {
            if action.status != PendingActionStatus::Pending || action.expires_at < at {
                return false;
            }
            action.status = PendingActionStatus::Confirmed;
            action.confirmed_at = Some(at);
            true
        })
        .await
    }

    async fn mark_cancelled(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let reason = reason.map(str::to_string);
        self.transition(id, user_id, move |action| {
            if action.status != PendingActionStatus::Pending || action.expires_at < at {
                return false;
            }
            action.status = PendingActionStatus::Cancelled;
            action.cancel_reason = reason;
            true
        })
        .await
    }

    async fn mark_expired(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        self.transition(id, user_id, |action| {
            if action.status != PendingActionStatus::Pending || action.expires_at >= at {
                return false;
            }
            action.status = PendingActionStatus::Expired;
            true
        })
        .await
    }

    async fn record_outcome(
        &self,
        id: &ActionId,
        user_id: &UserId,
        result: &Value,
        history: &ActionHistoryRecord,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let mut actions = self.actions.write().await;
        let Some(action) = actions
            .get_mut(&id.0)
            .filter(|action| action.user_id == *user_id)
            .filter(|action| action.status == PendingActionStatus::Confirmed)
        else {
            return Ok(None);
        };

        let mut candidate = action.clone();
        candidate.status = history.action_status.into();
        candidate.executed_at = Some(history.executed_at);
        candidate.execution_result = Some(result.clone());

        self.history.append(history.clone()).await?;
        *action = candidate.clone();
        Ok(Some(candidate))
    }

    async fn expire_overdue(
        &self,
        user_id: Option<&UserId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let mut actions = self.actions.write().await;
        let mut flipped = Vec::new();
        for action in actions.values_mut() {
            let owned = user_id.map_or(true, |user_id| action.user_id == *user_id);
            if owned && action.status == PendingActionStatus::Pending && action.expires_at < at {
                action.status = PendingActionStatus::Expired;
                flipped.push(action.clone());
            }
        }
        Ok(flipped)
    }

    async fn delete_resolved_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let mut actions = self.actions.write().await;
        let doomed: Vec<String> = actions
            .values()
            .filter(|action| action.status.is_terminal() && action.proposed_at < cutoff)
            .map(|action| action.id.0.clone())
            .collect();
        Ok(doomed.iter().filter_map(|id| actions.remove(id)).collect())
    }
}

#[derive(Default)]
pub struct InMemoryActionHistoryRepository {
    records: RwLock<Vec<ActionHistoryRecord>>,
}

impl InMemoryActionHistoryRepository {
    /// Every record across users, in insertion order.
    pub async fn snapshot(&self) -> Vec<ActionHistoryRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ActionHistoryRepository for InMemoryActionHistoryRepository {
    async fn append(&self, record: ActionHistoryRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        if let Some(action_id) = &record.action_id {
            if records.iter().any(|existing| existing.action_id.as_ref() == Some(action_id)) {
                return Err(RepositoryError::Conflict(format!(
                    "history already recorded for action {action_id}"
                )));
            }
        }
        records.push(record);
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ActionHistoryRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut listed: Vec<ActionHistoryRecord> =
            records.iter().rev().filter(|record| record.user_id == *user_id).cloned().collect();
        listed.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        listed.truncate(limit as usize);
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryActionFeedbackRepository {
    feedback: RwLock<HashMap<String, ActionFeedback>>,
}

#[async_trait::async_trait]
impl ActionFeedbackRepository for InMemoryActionFeedbackRepository {
    async fn insert(&self, feedback: ActionFeedback) -> Result<(), RepositoryError> {
        let mut rows = self.feedback.write().await;
        if rows.contains_key(&feedback.action_id.0) {
            return Err(RepositoryError::Conflict(format!(
                "feedback already recorded for action {}",
                feedback.action_id
            )));
        }
        rows.insert(feedback.action_id.0.clone(), feedback);
        Ok(())
    }

    async fn find_for_action(
        &self,
        action_id: &ActionId,
    ) -> Result<Option<ActionFeedback>, RepositoryError> {
        Ok(self.feedback.read().await.get(&action_id.0).cloned())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    policies: RwLock<HashMap<String, TeamPolicy>>,
    memberships: RwLock<HashMap<String, TeamId>>,
    settings: RwLock<HashMap<String, UserAgentSettings>>,
}

#[async_trait::async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn team_policy_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<TeamPolicy>, RepositoryError> {
        let team_id = self.memberships.read().await.get(&user_id.0).cloned();
        let Some(team_id) = team_id else {
            return Ok(None);
        };
        Ok(self.policies.read().await.get(&team_id.0).cloned())
    }

    async fn find_team_policy(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<TeamPolicy>, RepositoryError> {
        Ok(self.policies.read().await.get(&team_id.0).cloned())
    }

    async fn save_team_policy(&self, policy: TeamPolicy) -> Result<(), RepositoryError> {
        self.policies.write().await.insert(policy.team_id.0.clone(), policy);
        Ok(())
    }

    async fn assign_member(
        &self,
        user_id: &UserId,
        team_id: &TeamId,
        _at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if !self.policies.read().await.contains_key(&team_id.0) {
            return Err(RepositoryError::Conflict(format!("team {} does not exist", team_id.0)));
        }
        self.memberships.write().await.insert(user_id.0.clone(), team_id.clone());
        Ok(())
    }

    async fn user_settings(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserAgentSettings>, RepositoryError> {
        Ok(self.settings.read().await.get(&user_id.0).cloned())
    }

    async fn save_user_settings(
        &self,
        settings: UserAgentSettings,
    ) -> Result<(), RepositoryError> {
        self.settings.write().await.insert(settings.user_id.0.clone(), settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Map};

    use actgate_core::domain::action::{
        ActionRequest, ActionType, PendingAction, PendingActionStatus, RiskLevel, UserId,
    };
    use actgate_core::domain::history::{ActionHistoryRecord, HistoryStatus};
    use actgate_core::domain::settings::{TeamId, TeamPolicy};

    use crate::repositories::{
        ActionHistoryRepository, InMemoryActionHistoryRepository, InMemoryPendingActionRepository,
        InMemorySettingsRepository, PendingActionRepository, RepositoryError, SettingsRepository,
    };

    fn staged() -> PendingAction {
        PendingAction::stage(
            UserId("user-1".to_string()),
            None,
            ActionRequest::new(ActionType::SendEmail, Map::new()),
            RiskLevel::High,
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).single().expect("valid date"),
        )
    }

    #[tokio::test]
    async fn in_memory_guards_match_sql_semantics() {
        let history = Arc::new(InMemoryActionHistoryRepository::default());
        let repo = InMemoryPendingActionRepository::with_history(history.clone());
        let action = staged();
        repo.insert(action.clone()).await.expect("insert");

        let foreign = UserId("user-2".to_string());
        assert!(repo.mark_confirmed(&action.id, &foreign, action.proposed_at).await.expect("ok").is_none());

        let late = action.expires_at + Duration::seconds(1);
        assert!(repo.mark_confirmed(&action.id, &action.user_id, late).await.expect("ok").is_none());

        let confirmed = repo
            .mark_confirmed(&action.id, &action.user_id, action.proposed_at)
            .await
            .expect("ok")
            .expect("claimed");
        assert_eq!(confirmed.status, PendingActionStatus::Confirmed);

        let record = ActionHistoryRecord::for_confirmed(&action, HistoryStatus::Failed, late);
        let executed = repo
            .record_outcome(&action.id, &action.user_id, &json!({"error": "boom"}), &record)
            .await
            .expect("ok")
            .expect("recorded");
        assert_eq!(executed.status, PendingActionStatus::Failed);
        assert_eq!(executed.executed_at, Some(late));
        assert_eq!(history.snapshot().await, vec![record.clone()]);

        assert!(repo.mark_expired(&action.id, &action.user_id, late).await.expect("ok").is_none());
        assert!(repo
            .record_outcome(&action.id, &action.user_id, &json!({}), &record)
            .await
            .expect("ok")
            .is_none());
    }

    #[tokio::test]
    async fn outcome_is_not_kept_when_the_history_append_fails() {
        let history = Arc::new(InMemoryActionHistoryRepository::default());
        let repo = InMemoryPendingActionRepository::with_history(history.clone());
        let action = staged();
        repo.insert(action.clone()).await.expect("insert");
        repo.mark_confirmed(&action.id, &action.user_id, action.proposed_at)
            .await
            .expect("ok")
            .expect("claimed");

        let earlier = ActionHistoryRecord::for_confirmed(&action, HistoryStatus::Failed, Utc::now());
        history.append(earlier).await.expect("append");

        let record = ActionHistoryRecord::for_confirmed(&action, HistoryStatus::Executed, Utc::now());
        let result =
            repo.record_outcome(&action.id, &action.user_id, &json!({"success": true}), &record).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));

        let stored =
            repo.find_for_user(&action.id, &action.user_id).await.expect("find").expect("row");
        assert_eq!(stored.status, PendingActionStatus::Confirmed);
        assert_eq!(stored.execution_result, None);
        assert_eq!(history.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn in_memory_history_enforces_one_record_per_action() {
        let repo = InMemoryActionHistoryRepository::default();
        let action = staged();
        let record = ActionHistoryRecord::for_confirmed(&action, HistoryStatus::Executed, Utc::now());
        repo.append(record).await.expect("append");

        let duplicate = ActionHistoryRecord::for_confirmed(&action, HistoryStatus::Failed, Utc::now());
        assert!(matches!(repo.append(duplicate).await, Err(RepositoryError::Conflict(_))));
        assert_eq!(repo.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn in_memory_settings_resolve_membership() {
        let repo = InMemorySettingsRepository::default();
        let team = TeamId("team-1".to_string());
        let user = UserId("user-1".to_string());

        assert!(repo.assign_member(&user, &team, Utc::now()).await.is_err());
        repo.save_team_policy(TeamPolicy::permissive(team.clone())).await.expect("save");
        repo.assign_member(&user, &team, Utc::now()).await.expect("assign");

        let policy = repo.team_policy_for_user(&user).await.expect("read").expect("policy");
        assert_eq!(policy.team_id, team);
    }
}
