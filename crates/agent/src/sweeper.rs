use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use actgate_core::clock::Clock;
use actgate_core::errors::ApplicationError;
use actgate_core::realtime::{ChangeEvent, ChangeNotifier};
use actgate_db::repositories::PendingActionRepository;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub purged: usize,
}

/// Periodic companion to lazy expiry. Flips overdue rows for every user and
/// drops resolved rows past the retention window. History is never touched.
pub struct ExpirySweeper {
    pending: Arc<dyn PendingActionRepository>,
    notifier: ChangeNotifier,
    clock: Arc<dyn Clock>,
    retention: chrono::Duration,
}

impl ExpirySweeper {
    pub fn new(
        pending: Arc<dyn PendingActionRepository>,
        notifier: ChangeNotifier,
        clock: Arc<dyn Clock>,
        retention_days: u32,
    ) -> Self {
        Self { pending, notifier, clock, retention: chrono::Duration::days(i64::from(retention_days)) }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, ApplicationError> {
        let now = self.clock.now();

        let expired = self.pending.expire_overdue(None, now).await?;
        for action in &expired {
            self.notifier.publish(ChangeEvent::pending_updated(action));
        }

        let purged = self.pending.delete_resolved_before(now - self.retention).await?;
        for action in &purged {
            self.notifier.publish(ChangeEvent::pending_deleted(
                action.user_id.clone(),
                action.id.clone(),
            ));
        }

        let report = SweepReport { expired: expired.len(), purged: purged.len() };
        if report != SweepReport::default() {
            tracing::info!(
                event_name = "action.sweeper.completed",
                expired = report.expired,
                purged = report.purged,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps every `period` until the task is dropped. Failures are logged
    /// and the next tick tries again.
    pub async fn run(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = self.sweep_once().await {
                tracing::warn!(
                    event_name = "action.sweeper.failed",
                    error = %error,
                    "expiry sweep failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Map;

    use actgate_core::clock::{Clock, ManualClock};
    use actgate_core::domain::action::{
        ActionRequest, ActionType, PendingAction, PendingActionStatus, RiskLevel, UserId,
    };
    use actgate_core::realtime::{ChangeKind, ChangeNotifier};
    use actgate_db::repositories::{InMemoryPendingActionRepository, PendingActionRepository};

    use super::{ExpirySweeper, SweepReport};

    fn staged(user: &str, at: chrono::DateTime<Utc>) -> PendingAction {
        PendingAction::stage(
            UserId(user.to_string()),
            None,
            ActionRequest::new(ActionType::MakeVoiceCall, Map::new()),
            RiskLevel::Critical,
            at,
        )
    }

    #[tokio::test]
    async fn sweep_expires_overdue_rows_for_every_user() {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).single().expect("valid date"),
        );
        let pending = Arc::new(InMemoryPendingActionRepository::default());
        let notifier = ChangeNotifier::default();
        let sweeper =
            ExpirySweeper::new(pending.clone(), notifier.clone(), Arc::new(clock.clone()), 30);

        let alice = staged("alice", clock.now());
        let bob = staged("bob", clock.now());
        pending.insert(alice.clone()).await.expect("insert");
        pending.insert(bob.clone()).await.expect("insert");
        let mut bob_events = notifier.subscribe(bob.user_id.clone());

        clock.advance(Duration::minutes(10));
        assert_eq!(sweeper.sweep_once().await.expect("sweep"), SweepReport::default());

        clock.advance(Duration::minutes(25));
        let report = sweeper.sweep_once().await.expect("sweep");
        assert_eq!(report, SweepReport { expired: 2, purged: 0 });

        for action in [&alice, &bob] {
            let stored = pending
                .find_for_user(&action.id, &action.user_id)
                .await
                .expect("find")
                .expect("row");
            assert_eq!(stored.status, PendingActionStatus::Expired);
        }
        let event = bob_events.recv().await.expect("event");
        assert!(matches!(event.kind, ChangeKind::PendingUpdated { ref action } if action.id == bob.id));
    }

    #[tokio::test]
    async fn sweep_purges_resolved_rows_past_retention() {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).single().expect("valid date"),
        );
        let pending = Arc::new(InMemoryPendingActionRepository::default());
        let notifier = ChangeNotifier::default();
        let sweeper =
            ExpirySweeper::new(pending.clone(), notifier.clone(), Arc::new(clock.clone()), 7);

        let old = staged("alice", clock.now());
        pending.insert(old.clone()).await.expect("insert");
        let mut events = notifier.subscribe(old.user_id.clone());

        clock.advance(Duration::days(8));
        let fresh = staged("alice", clock.now());
        pending.insert(fresh.clone()).await.expect("insert");

        let report = sweeper.sweep_once().await.expect("sweep");
        assert_eq!(report, SweepReport { expired: 1, purged: 1 });
        assert_eq!(pending.find_for_user(&old.id, &old.user_id).await.expect("find"), None);
        assert!(pending.find_for_user(&fresh.id, &fresh.user_id).await.expect("find").is_some());

        let first = events.recv().await.expect("event");
        assert!(matches!(first.kind, ChangeKind::PendingUpdated { .. }));
        let second = events.recv().await.expect("event");
        assert!(matches!(second.kind, ChangeKind::PendingDeleted { ref action_id } if *action_id == old.id));
    }
}
