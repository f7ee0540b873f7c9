use std::sync::Arc;

use actgate_core::clock::Clock;
use actgate_core::confirmation::AutoApproveMode;
use actgate_core::domain::action::{
    ActionId, ActionRequest, PendingAction, TriggerContext, UserId,
};
use actgate_core::domain::history::{ActionHistoryRecord, FeedbackInput};
use actgate_core::errors::{ActionError, ApplicationError};
use actgate_core::policy::{check_policy, PolicyDecision};
use actgate_core::realtime::ChangeNotifier;
use actgate_core::risk::classify;
use actgate_db::repositories::{
    ActionFeedbackRepository, ActionHistoryRepository, InMemoryActionFeedbackRepository,
    InMemoryActionHistoryRepository, InMemoryPendingActionRepository, InMemorySettingsRepository,
    PendingActionRepository, SettingsRepository,
};

use crate::executor::ActionExecutor;
use crate::gateway::{ConfirmationGateway, ConfirmationReceipt};
use crate::llm::ToolCall;
use crate::proposer::{ActionProposer, Proposal, ProposalOutcome};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Storage handles shared by every stage of the pipeline.
#[derive(Clone)]
pub struct PipelineStores {
    pub pending: Arc<dyn PendingActionRepository>,
    pub history: Arc<dyn ActionHistoryRepository>,
    pub feedback: Arc<dyn ActionFeedbackRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl PipelineStores {
    pub fn in_memory() -> Self {
        let history = Arc::new(InMemoryActionHistoryRepository::default());
        Self {
            pending: Arc::new(InMemoryPendingActionRepository::with_history(history.clone())),
            history,
            feedback: Arc::new(InMemoryActionFeedbackRepository::default()),
            settings: Arc::new(InMemorySettingsRepository::default()),
        }
    }
}

/// Entry point for tool calls coming out of a conversation.
///
/// Order per proposal: classify, read the team policy, stop on a denial, read
/// the user's settings, then hand off to the proposer. Policy and settings are
/// read fresh every time; nothing is cached between requests.
pub struct AgentRuntime {
    stores: PipelineStores,
    proposer: ActionProposer,
    gateway: ConfirmationGateway,
}

impl AgentRuntime {
    pub fn new(
        stores: PipelineStores,
        executor: ActionExecutor,
        notifier: ChangeNotifier,
        clock: Arc<dyn Clock>,
        mode: AutoApproveMode,
    ) -> Self {
        let proposer = ActionProposer::new(
            stores.pending.clone(),
            stores.history.clone(),
            executor.clone(),
            notifier.clone(),
            clock.clone(),
            mode,
        );
        let gateway = ConfirmationGateway::new(
            stores.pending.clone(),
            stores.feedback.clone(),
            executor,
            notifier,
            clock,
        );
        Self { stores, proposer, gateway }
    }

    pub fn stores(&self) -> &PipelineStores {
        &self.stores
    }

    pub fn auto_approve_mode(&self) -> AutoApproveMode {
        self.proposer.mode()
    }

    pub async fn handle_tool_call(
        &self,
        user_id: &UserId,
        session_id: Option<String>,
        call: ToolCall,
        trigger_context: TriggerContext,
    ) -> Result<ProposalOutcome, ApplicationError> {
        let request = call
            .into_request()
            .map_err(|error| ActionError::ValidationFailed(error.to_string()))?;
        self.propose(user_id, session_id, request, trigger_context).await
    }

    pub async fn propose(
        &self,
        user_id: &UserId,
        session_id: Option<String>,
        request: ActionRequest,
        trigger_context: TriggerContext,
    ) -> Result<ProposalOutcome, ApplicationError> {
        let risk_level = classify(&request.action_type);

        let team_policy = self.stores.settings.team_policy_for_user(user_id).await?;
        let decision = check_policy(team_policy.as_ref(), &request.action_type);
        if let PolicyDecision::Deny { policy, reason_code, .. } = &decision {
            tracing::warn!(
                event_name = "action.policy.denied",
                user_id = %user_id,
                action_type = %request.action_type,
                risk_level = %risk_level,
                policy,
                reason_code,
                "team policy blocked proposed action"
            );
        }
        decision.into_result()?;

        let settings = self.stores.settings.user_settings(user_id).await?;
        let proposal = Proposal {
            user_id: user_id.clone(),
            session_id,
            request,
            risk_level,
            trigger_context,
        };
        self.proposer.propose(proposal, settings.as_ref()).await
    }

    pub async fn confirm(
        &self,
        action_id: &ActionId,
        user_id: &UserId,
        feedback: FeedbackInput,
    ) -> Result<ConfirmationReceipt, ApplicationError> {
        self.gateway.confirm(action_id, user_id, feedback).await
    }

    pub async fn cancel(
        &self,
        action_id: &ActionId,
        user_id: &UserId,
        reason: Option<&str>,
    ) -> Result<PendingAction, ApplicationError> {
        self.gateway.cancel(action_id, user_id, reason).await
    }

    pub async fn list_pending(&self, user_id: &UserId) -> Result<Vec<PendingAction>, ApplicationError> {
        self.gateway.list_pending(user_id).await
    }

    /// Newest first. `limit` is clamped to `1..=MAX_HISTORY_LIMIT`.
    pub async fn recent_history(
        &self,
        user_id: &UserId,
        limit: Option<u32>,
    ) -> Result<Vec<ActionHistoryRecord>, ApplicationError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.stores.history.list_for_user(user_id, limit).await?)
    }
}
