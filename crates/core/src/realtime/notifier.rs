use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::domain::action::{ActionId, PendingAction, UserId};
use crate::domain::history::ActionHistoryRecord;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    PendingInserted { action: PendingAction },
    PendingUpdated { action: PendingAction },
    PendingDeleted { action_id: ActionId },
    HistoryInserted { record: ActionHistoryRecord },
}

impl ChangeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PendingInserted { .. } => "pending_inserted",
            Self::PendingUpdated { .. } => "pending_updated",
            Self::PendingDeleted { .. } => "pending_deleted",
            Self::HistoryInserted { .. } => "history_inserted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub user_id: UserId,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn pending_inserted(action: &PendingAction) -> Self {
        Self {
            user_id: action.user_id.clone(),
            kind: ChangeKind::PendingInserted { action: action.clone() },
        }
    }

    pub fn pending_updated(action: &PendingAction) -> Self {
        Self {
            user_id: action.user_id.clone(),
            kind: ChangeKind::PendingUpdated { action: action.clone() },
        }
    }

    pub fn pending_deleted(user_id: UserId, action_id: ActionId) -> Self {
        Self { user_id, kind: ChangeKind::PendingDeleted { action_id } }
    }

    pub fn history_inserted(record: &ActionHistoryRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            kind: ChangeKind::HistoryInserted { record: record.clone() },
        }
    }
}

/// Fan-out of row changes to every connected client.
#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the event. Zero
    /// subscribers is normal.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let kind = event.kind.name();
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                debug!(event_name = "system.realtime.no_subscribers", kind, "change event dropped");
                0
            }
        }
    }

    pub fn subscribe(&self, user_id: UserId) -> UserEventReceiver {
        UserEventReceiver { user_id, receiver: self.sender.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Receiver that only yields one user's events.
#[derive(Debug)]
pub struct UserEventReceiver {
    user_id: UserId,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl UserEventReceiver {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub async fn recv(&mut self) -> Result<ChangeEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.user_id == self.user_id {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::Map;
    use tokio::sync::broadcast::error::RecvError;

    use super::{ChangeEvent, ChangeKind, ChangeNotifier};
    use crate::domain::action::{ActionId, ActionRequest, ActionType, PendingAction, RiskLevel, UserId};

    fn staged(user: &str) -> PendingAction {
        PendingAction::stage(
            UserId(user.to_string()),
            None,
            ActionRequest::new(ActionType::SendEmail, Map::new()),
            RiskLevel::High,
            Utc::now(),
        )
    }

    #[test]
    fn publishing_without_subscribers_is_not_an_error() {
        let notifier = ChangeNotifier::default();
        assert_eq!(notifier.publish(ChangeEvent::pending_inserted(&staged("user-1"))), 0);
    }

    #[tokio::test]
    async fn subscriber_only_sees_its_own_user() {
        let notifier = ChangeNotifier::new(16);
        let mut alice = notifier.subscribe(UserId("alice".to_string()));

        notifier.publish(ChangeEvent::pending_inserted(&staged("bob")));
        let mine = staged("alice");
        notifier.publish(ChangeEvent::pending_inserted(&mine));

        let event = alice.recv().await.expect("event for alice");
        assert_eq!(event.user_id, UserId("alice".to_string()));
        assert!(matches!(event.kind, ChangeKind::PendingInserted { ref action } if action.id == mine.id));
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let notifier = ChangeNotifier::new(2);
        let mut receiver = notifier.subscribe(UserId("alice".to_string()));

        for _ in 0..5 {
            notifier.publish(ChangeEvent::pending_deleted(
                UserId("alice".to_string()),
                ActionId::generate(),
            ));
        }

        assert!(matches!(receiver.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = ChangeEvent::pending_deleted(
            UserId("alice".to_string()),
            ActionId("action-1".to_string()),
        );
        let encoded = serde_json::to_value(&event).expect("encode");
        assert_eq!(encoded["type"], "pending_deleted");
        assert_eq!(encoded["user_id"], "alice");
        assert_eq!(encoded["action_id"], "action-1");
    }
}
