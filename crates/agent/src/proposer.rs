use std::sync::Arc;

use serde::Serialize;

use actgate_core::clock::Clock;
use actgate_core::confirmation::{requires_confirmation, AutoApproveMode};
use actgate_core::domain::action::{
    ActionRequest, PendingAction, RiskLevel, TriggerContext, UserId, PENDING_ACTION_TTL_MINUTES,
};
use actgate_core::domain::history::{ActionHistoryRecord, HistoryStatus};
use actgate_core::domain::settings::UserAgentSettings;
use actgate_core::errors::ApplicationError;
use actgate_core::realtime::{ChangeEvent, ChangeNotifier};
use actgate_db::repositories::{ActionHistoryRepository, PendingActionRepository};

use crate::commands::describe_action;
use crate::executor::{ActionExecutor, ExecutionOutcome};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalOutcome {
    AwaitingConfirmation { action: PendingAction, prompt: String },
    Executed { outcome: ExecutionOutcome, history: ActionHistoryRecord },
}

impl ProposalOutcome {
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::AwaitingConfirmation { .. })
    }
}

/// Everything the proposer needs to know about one tool call.
#[derive(Clone, Debug)]
pub struct Proposal {
    pub user_id: UserId,
    pub session_id: Option<String>,
    pub request: ActionRequest,
    pub risk_level: RiskLevel,
    pub trigger_context: TriggerContext,
}

/// Sole creator of pending actions. Decides between running a tool call
/// right away and staging it for the user.
pub struct ActionProposer {
    pending: Arc<dyn PendingActionRepository>,
    history: Arc<dyn ActionHistoryRepository>,
    executor: ActionExecutor,
    notifier: ChangeNotifier,
    clock: Arc<dyn Clock>,
    mode: AutoApproveMode,
}

impl ActionProposer {
    pub fn new(
        pending: Arc<dyn PendingActionRepository>,
        history: Arc<dyn ActionHistoryRepository>,
        executor: ActionExecutor,
        notifier: ChangeNotifier,
        clock: Arc<dyn Clock>,
        mode: AutoApproveMode,
    ) -> Self {
        Self { pending, history, executor, notifier, clock, mode }
    }

    pub fn mode(&self) -> AutoApproveMode {
        self.mode
    }

    pub async fn propose(
        &self,
        proposal: Proposal,
        settings: Option<&UserAgentSettings>,
    ) -> Result<ProposalOutcome, ApplicationError> {
        if requires_confirmation(proposal.risk_level, settings, self.mode) {
            self.stage(proposal).await
        } else {
            self.execute_now(proposal).await
        }
    }

    async fn stage(&self, proposal: Proposal) -> Result<ProposalOutcome, ApplicationError> {
        let action = PendingAction::stage(
            proposal.user_id,
            proposal.session_id,
            proposal.request,
            proposal.risk_level,
            self.clock.now(),
        );
        self.pending.insert(action.clone()).await?;
        self.notifier.publish(ChangeEvent::pending_inserted(&action));

        tracing::info!(
            event_name = "action.proposal.staged",
            user_id = %action.user_id,
            action_id = %action.id,
            action_type = %action.action_type,
            risk_level = %action.risk_level,
            expires_at = %action.expires_at,
            "action staged for confirmation"
        );

        let prompt = confirmation_prompt(&action);
        Ok(ProposalOutcome::AwaitingConfirmation { action, prompt })
    }

    async fn execute_now(&self, proposal: Proposal) -> Result<ProposalOutcome, ApplicationError> {
        let Proposal { user_id, request, risk_level, trigger_context, .. } = proposal;
        let outcome = self.executor.execute(&user_id, &request.action_type, &request.payload).await;

        let history = ActionHistoryRecord::new(
            user_id,
            None,
            request.action_type,
            HistoryStatus::from_success(outcome.success),
            request.payload,
            trigger_context,
            Some(risk_level),
            request.confidence_score,
            self.clock.now(),
        );
        self.history.append(history.clone()).await?;
        self.notifier.publish(ChangeEvent::history_inserted(&history));

        if outcome.success {
            tracing::info!(
                event_name = "action.proposal.auto_executed",
                user_id = %history.user_id,
                action_type = %history.action_type,
                risk_level = %risk_level,
                trigger_context = history.trigger_context.as_str(),
                "action executed without confirmation"
            );
        } else {
            tracing::warn!(
                event_name = "action.proposal.auto_execution_failed",
                user_id = %history.user_id,
                action_type = %history.action_type,
                risk_level = %risk_level,
                error = outcome.error.as_deref().unwrap_or_default(),
                "auto-executed action failed"
            );
        }

        Ok(ProposalOutcome::Executed { outcome, history })
    }
}

fn confirmation_prompt(action: &PendingAction) -> String {
    format!(
        "{}. Please confirm or cancel this {} risk action (id: {}). It expires in {} minutes.",
        describe_action(&action.action_type, &action.payload),
        action.risk_level,
        action.id,
        PENDING_ACTION_TTL_MINUTES
    )
}
