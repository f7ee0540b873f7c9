use std::sync::Arc;

use actgate_agent::ExpirySweeper;
use actgate_core::clock::SystemClock;
use actgate_core::realtime::ChangeNotifier;
use actgate_db::repositories::SqlPendingActionRepository;

use crate::commands::{with_database, CommandResult, EXIT_OPERATION};

/// One expiry pass outside the server. Nobody is subscribed, so change
/// events go nowhere; clients pick the new state up on their next read.
pub fn run() -> CommandResult {
    let result = with_database("sweep", |config, pool| async move {
        let sweeper = ExpirySweeper::new(
            Arc::new(SqlPendingActionRepository::new(pool)),
            ChangeNotifier::new(1),
            Arc::new(SystemClock),
            config.agent.retention_days,
        );
        sweeper
            .sweep_once()
            .await
            .map_err(|error| ("sweep_execution", error.to_string(), EXIT_OPERATION))
    });

    match result {
        Ok(report) => CommandResult::success_with(
            "sweep",
            format!("expired {} action(s), purged {} resolved row(s)", report.expired, report.purged),
            report,
        ),
        Err(failure) => failure,
    }
}
