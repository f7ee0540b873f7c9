//! Client-side view of a user's pending actions and recent history, kept in
//! step with the change feed.

use std::collections::{BTreeMap, VecDeque};

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::domain::action::{ActionId, PendingAction, PendingActionStatus, UserId};
use crate::domain::history::ActionHistoryRecord;
use crate::errors::ActionError;
use crate::realtime::notifier::{ChangeEvent, ChangeKind, UserEventReceiver};

pub const DEFAULT_RECENT_HISTORY: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorState {
    Live,
    /// The stream lagged or closed. Data is the last known state and may be
    /// stale until the next `hydrate`.
    Degraded,
}

/// What the server said about a confirm or cancel the client sent.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolutionResponse {
    Succeeded,
    Rejected(ActionError),
    /// The request never got an answer.
    TransportFailed(String),
}

#[derive(Debug)]
pub struct ClientMirror {
    user_id: UserId,
    pending: BTreeMap<ActionId, PendingAction>,
    in_flight: BTreeMap<ActionId, PendingAction>,
    history: VecDeque<ActionHistoryRecord>,
    history_limit: usize,
    state: MirrorState,
}

impl ClientMirror {
    pub fn new(user_id: UserId) -> Self {
        Self::with_history_limit(user_id, DEFAULT_RECENT_HISTORY)
    }

    pub fn with_history_limit(user_id: UserId, history_limit: usize) -> Self {
        Self {
            user_id,
            pending: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            state: MirrorState::Live,
        }
    }

    /// Replace local state with a fresh server snapshot. History is expected
    /// newest first.
    pub fn hydrate(&mut self, pending: Vec<PendingAction>, history: Vec<ActionHistoryRecord>) {
        self.pending = pending
            .into_iter()
            .filter(|action| action.user_id == self.user_id)
            .filter(|action| action.status == PendingActionStatus::Pending)
            .map(|action| (action.id.clone(), action))
            .collect();
        self.in_flight.clear();
        self.history = history.into_iter().take(self.history_limit).collect();
        self.state = MirrorState::Live;
    }

    pub fn apply(&mut self, event: ChangeEvent) {
        if event.user_id != self.user_id {
            return;
        }

        match event.kind {
            ChangeKind::PendingInserted { action } | ChangeKind::PendingUpdated { action } => {
                self.in_flight.remove(&action.id);
                if action.status == PendingActionStatus::Pending {
                    self.pending.insert(action.id.clone(), action);
                } else {
                    self.pending.remove(&action.id);
                }
            }
            ChangeKind::PendingDeleted { action_id } => {
                self.in_flight.remove(&action_id);
                self.pending.remove(&action_id);
            }
            ChangeKind::HistoryInserted { record } => {
                if self.history.iter().any(|existing| existing.id == record.id) {
                    return;
                }
                self.history.push_front(record);
                self.history.truncate(self.history_limit);
            }
        }
    }

    /// Optimistically hide an action while its confirm or cancel is in flight.
    /// Returns `false` when the mirror does not know the action.
    pub fn begin_resolution(&mut self, action_id: &ActionId) -> bool {
        match self.pending.remove(action_id) {
            Some(action) => {
                self.in_flight.insert(action_id.clone(), action);
                true
            }
            None => false,
        }
    }

    /// The row only comes back when the server gave no answer. Any answer,
    /// including `already ...`, means the server has moved on.
    pub fn settle(&mut self, action_id: &ActionId, response: ResolutionResponse) {
        let Some(action) = self.in_flight.remove(action_id) else {
            return;
        };

        match response {
            ResolutionResponse::Succeeded | ResolutionResponse::Rejected(_) => {}
            ResolutionResponse::TransportFailed(reason) => {
                warn!(
                    event_name = "system.mirror.resolution_restored",
                    action_id = %action_id,
                    reason = %reason,
                    "resolution request failed in transit; restoring pending action"
                );
                self.pending.insert(action_id.clone(), action);
            }
        }
    }

    pub fn mark_degraded(&mut self) {
        self.state = MirrorState::Degraded;
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingAction> {
        self.pending.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn contains_pending(&self, action_id: &ActionId) -> bool {
        self.pending.contains_key(action_id)
    }

    pub fn recent_history(&self) -> impl Iterator<Item = &ActionHistoryRecord> {
        self.history.iter()
    }
}

/// Drives a mirror from a live receiver.
pub struct MirrorSubscription {
    receiver: UserEventReceiver,
}

impl MirrorSubscription {
    pub fn new(receiver: UserEventReceiver) -> Self {
        Self { receiver }
    }

    /// Applies events until the channel closes. A lag marks the mirror
    /// degraded but keeps pumping; the caller decides when to re-hydrate.
    pub async fn pump(mut self, mirror: &mut ClientMirror) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => mirror.apply(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        event_name = "system.mirror.lagged",
                        user_id = %mirror.user_id(),
                        skipped,
                        "mirror fell behind the change feed"
                    );
                    mirror.mark_degraded();
                }
                Err(RecvError::Closed) => {
                    info!(
                        event_name = "system.mirror.closed",
                        user_id = %mirror.user_id(),
                        "change feed closed"
                    );
                    mirror.mark_degraded();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::Map;

    use super::{ClientMirror, MirrorState, MirrorSubscription, ResolutionResponse};
    use crate::domain::action::{
        ActionRequest, ActionType, PendingAction, PendingActionStatus, RiskLevel, UserId,
    };
    use crate::domain::history::{ActionHistoryRecord, HistoryStatus};
    use crate::errors::ActionError;
    use crate::realtime::notifier::{ChangeEvent, ChangeNotifier};

    fn alice() -> UserId {
        UserId("alice".to_string())
    }

    fn staged() -> PendingAction {
        PendingAction::stage(
            alice(),
            None,
            ActionRequest::new(ActionType::SendSms, Map::new()),
            RiskLevel::High,
            Utc::now(),
        )
    }

    #[test]
    fn insert_then_terminal_update_removes_the_row() {
        let mut mirror = ClientMirror::new(alice());
        let mut action = staged();
        mirror.apply(ChangeEvent::pending_inserted(&action));
        assert!(mirror.contains_pending(&action.id));

        action.status = PendingActionStatus::Cancelled;
        mirror.apply(ChangeEvent::pending_updated(&action));
        assert_eq!(mirror.pending_count(), 0);
    }

    #[test]
    fn events_for_other_users_are_ignored() {
        let mut mirror = ClientMirror::new(alice());
        let mut foreign = staged();
        foreign.user_id = UserId("bob".to_string());
        mirror.apply(ChangeEvent::pending_inserted(&foreign));
        assert_eq!(mirror.pending_count(), 0);
    }

    #[test]
    fn transport_failure_restores_the_optimistically_removed_row() {
        let mut mirror = ClientMirror::new(alice());
        let action = staged();
        mirror.hydrate(vec![action.clone()], Vec::new());

        assert!(mirror.begin_resolution(&action.id));
        assert!(!mirror.contains_pending(&action.id));

        mirror.settle(&action.id, ResolutionResponse::TransportFailed("timeout".to_string()));
        assert!(mirror.contains_pending(&action.id));
    }

    #[test]
    fn server_answers_keep_the_row_removed() {
        for response in [
            ResolutionResponse::Succeeded,
            ResolutionResponse::Rejected(ActionError::AlreadyResolved {
                status: PendingActionStatus::Executed,
            }),
            ResolutionResponse::Rejected(ActionError::Expired { expired_at: Utc::now() }),
        ] {
            let mut mirror = ClientMirror::new(alice());
            let action = staged();
            mirror.hydrate(vec![action.clone()], Vec::new());
            mirror.begin_resolution(&action.id);
            mirror.settle(&action.id, response);
            assert!(!mirror.contains_pending(&action.id));
        }
    }

    #[test]
    fn history_is_bounded_and_deduplicated() {
        let mut mirror = ClientMirror::with_history_limit(alice(), 2);
        let action = staged();
        let first = ActionHistoryRecord::for_confirmed(&action, HistoryStatus::Executed, Utc::now());
        mirror.apply(ChangeEvent::history_inserted(&first));
        mirror.apply(ChangeEvent::history_inserted(&first));
        for _ in 0..3 {
            let record =
                ActionHistoryRecord::for_confirmed(&action, HistoryStatus::Failed, Utc::now());
            mirror.apply(ChangeEvent::history_inserted(&record));
        }
        assert_eq!(mirror.recent_history().count(), 2);
    }

    #[tokio::test]
    async fn pump_keeps_last_state_when_channel_closes() {
        let notifier = ChangeNotifier::new(8);
        let subscription = MirrorSubscription::new(notifier.subscribe(alice()));
        let action = staged();
        notifier.publish(ChangeEvent::pending_inserted(&action));
        drop(notifier);

        let mut mirror = ClientMirror::new(alice());
        subscription.pump(&mut mirror).await;

        assert_eq!(mirror.state(), MirrorState::Degraded);
        assert!(mirror.contains_pending(&action.id));
    }
}
