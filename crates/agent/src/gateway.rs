use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use actgate_core::clock::Clock;
use actgate_core::domain::action::{ActionId, PendingAction, PendingActionStatus, UserId};
use actgate_core::domain::history::{ActionFeedback, ActionHistoryRecord, FeedbackInput, HistoryStatus};
use actgate_core::errors::{ActionError, ApplicationError, DomainError};
use actgate_core::realtime::{ChangeEvent, ChangeNotifier};
use actgate_db::repositories::{ActionFeedbackRepository, PendingActionRepository};

use crate::executor::{ActionExecutor, ExecutionOutcome};

pub const PENDING_LIST_LIMIT: u32 = 100;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfirmationReceipt {
    pub action: PendingAction,
    pub outcome: ExecutionOutcome,
    pub history: ActionHistoryRecord,
    pub time_to_decision_ms: i64,
}

/// The only writer of status transitions after an action has been staged.
///
/// Every transition is claimed with a single conditional write; whoever loses
/// the claim is told why by re-reading the row afterwards. The executor runs
/// at most once per action because only the caller that won `pending ->
/// confirmed` ever reaches it. The outcome and its history record are written
/// together; if that write fails the row stays `confirmed` and is never re-run.
pub struct ConfirmationGateway {
    pending: Arc<dyn PendingActionRepository>,
    feedback: Arc<dyn ActionFeedbackRepository>,
    executor: ActionExecutor,
    notifier: ChangeNotifier,
    clock: Arc<dyn Clock>,
}

impl ConfirmationGateway {
    pub fn new(
        pending: Arc<dyn PendingActionRepository>,
        feedback: Arc<dyn ActionFeedbackRepository>,
        executor: ActionExecutor,
        notifier: ChangeNotifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { pending, feedback, executor, notifier, clock }
    }

    pub async fn confirm(
        &self,
        action_id: &ActionId,
        user_id: &UserId,
        feedback: FeedbackInput,
    ) -> Result<ConfirmationReceipt, ApplicationError> {
        feedback
            .validate()
            .map_err(|error| DomainError::InvariantViolation(error.to_string()))?;

        let now = self.clock.now();
        let Some(claimed) = self.pending.mark_confirmed(action_id, user_id, now).await? else {
            let error = self.explain_unclaimed(action_id, user_id, now).await?;
            log_rejection("confirm", action_id, user_id, &error);
            return Err(error.into());
        };
        self.notifier.publish(ChangeEvent::pending_updated(&claimed));

        let time_to_decision_ms = claimed.time_to_decision_ms().unwrap_or_default();
        tracing::info!(
            event_name = "action.confirmation.claimed",
            user_id = %user_id,
            action_id = %action_id,
            action_type = %claimed.action_type,
            risk_level = %claimed.risk_level,
            time_to_decision_ms,
            "pending action confirmed"
        );

        let attempt =
            self.executor.try_execute(user_id, &claimed.action_type, &claimed.payload).await;
        let (status, outcome) = match &attempt {
            Ok(outcome) => (HistoryStatus::Executed, outcome.clone()),
            Err(error) => (HistoryStatus::Failed, ExecutionOutcome::failed(error)),
        };

        let finished_at = self.clock.now();
        let history = ActionHistoryRecord::for_confirmed(&claimed, status, finished_at);
        let result = outcome.to_value();
        let recorded = self.pending.record_outcome(action_id, user_id, &result, &history).await;
        let resolved = match recorded {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                return Err(DomainError::InvariantViolation(format!(
                    "action {action_id} left the confirmed state before its outcome was recorded"
                ))
                .into())
            }
            Err(error) => {
                tracing::error!(
                    event_name = "action.confirmation.outcome_unrecorded",
                    user_id = %user_id,
                    action_id = %action_id,
                    action_type = %claimed.action_type,
                    outcome = status.as_str(),
                    execution_result = %result,
                    error = %error,
                    "side effect ran but its outcome could not be stored"
                );
                return Err(error.into());
            }
        };
        self.notifier.publish(ChangeEvent::pending_updated(&resolved));
        self.notifier.publish(ChangeEvent::history_inserted(&history));

        match attempt {
            Ok(_) => {
                tracing::info!(
                    event_name = "action.confirmation.executed",
                    user_id = %user_id,
                    action_id = %action_id,
                    action_type = %resolved.action_type,
                    "confirmed action executed"
                );
                if !feedback.is_empty() {
                    self.store_feedback(&resolved, feedback, time_to_decision_ms, finished_at)
                        .await;
                }
                Ok(ConfirmationReceipt { action: resolved, outcome, history, time_to_decision_ms })
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "action.confirmation.failed",
                    user_id = %user_id,
                    action_id = %action_id,
                    action_type = %resolved.action_type,
                    error_code = error.error_code(),
                    error = %error,
                    "confirmed action failed"
                );
                Err(error.into())
            }
        }
    }

    pub async fn cancel(
        &self,
        action_id: &ActionId,
        user_id: &UserId,
        reason: Option<&str>,
    ) -> Result<PendingAction, ApplicationError> {
        let now = self.clock.now();
        let reason = reason.map(str::trim).filter(|reason| !reason.is_empty());
        let Some(cancelled) = self.pending.mark_cancelled(action_id, user_id, now, reason).await?
        else {
            let error = self.explain_unclaimed(action_id, user_id, now).await?;
            log_rejection("cancel", action_id, user_id, &error);
            return Err(error.into());
        };

        self.notifier.publish(ChangeEvent::pending_updated(&cancelled));
        tracing::info!(
            event_name = "action.confirmation.cancelled",
            user_id = %user_id,
            action_id = %action_id,
            action_type = %cancelled.action_type,
            "pending action cancelled"
        );
        Ok(cancelled)
    }

    /// The caller's open actions. Overdue rows are flipped to `expired` first.
    pub async fn list_pending(&self, user_id: &UserId) -> Result<Vec<PendingAction>, ApplicationError> {
        let now = self.clock.now();
        let expired = self.pending.expire_overdue(Some(user_id), now).await?;
        for action in &expired {
            self.notifier.publish(ChangeEvent::pending_updated(action));
        }
        if !expired.is_empty() {
            tracing::info!(
                event_name = "action.pending.expired_on_read",
                user_id = %user_id,
                expired = expired.len(),
                "overdue actions expired"
            );
        }

        Ok(self
            .pending
            .list_for_user(user_id, Some(PendingActionStatus::Pending), PENDING_LIST_LIMIT)
            .await?)
    }

    async fn explain_unclaimed(
        &self,
        action_id: &ActionId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ActionError, ApplicationError> {
        let Some(current) = self.pending.find_for_user(action_id, user_id).await? else {
            return Ok(ActionError::NotFound(action_id.clone()));
        };

        if current.status == PendingActionStatus::Pending && current.is_overdue(now) {
            if let Some(expired) = self.pending.mark_expired(action_id, user_id, now).await? {
                self.notifier.publish(ChangeEvent::pending_updated(&expired));
                return Ok(ActionError::Expired { expired_at: expired.expires_at });
            }
            // Someone else resolved it between the two reads.
            return Ok(match self.pending.find_for_user(action_id, user_id).await? {
                Some(current) => classify_resolved(&current),
                None => ActionError::NotFound(action_id.clone()),
            });
        }

        Ok(classify_resolved(&current))
    }

    async fn store_feedback(
        &self,
        action: &PendingAction,
        input: FeedbackInput,
        time_to_decision_ms: i64,
        at: DateTime<Utc>,
    ) {
        let feedback = ActionFeedback {
            action_id: action.id.clone(),
            user_id: action.user_id.clone(),
            rating: input.rating,
            comment: input.comment.map(|comment| comment.trim().to_string()),
            time_to_decision_ms,
            created_at: at,
        };

        if let Err(error) = self.feedback.insert(feedback).await {
            tracing::warn!(
                event_name = "action.feedback.store_failed",
                action_id = %action.id,
                error = %error,
                "could not store confirmation feedback"
            );
        }
    }
}

fn classify_resolved(current: &PendingAction) -> ActionError {
    match current.status {
        PendingActionStatus::Expired => ActionError::Expired { expired_at: current.expires_at },
        status => ActionError::AlreadyResolved { status },
    }
}

fn log_rejection(operation: &'static str, action_id: &ActionId, user_id: &UserId, error: &ActionError) {
    tracing::info!(
        event_name = "action.confirmation.rejected",
        operation,
        user_id = %user_id,
        action_id = %action_id,
        error_code = error.error_code(),
        "resolution attempt rejected"
    );
}
