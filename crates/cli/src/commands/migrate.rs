use actgate_db::migrations;
use serde_json::json;

use crate::commands::{with_database, CommandResult, EXIT_MIGRATION};

pub fn run() -> CommandResult {
    let result = with_database("migrate", |_config, pool| async move {
        migrations::current_version(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))
    });

    match result {
        Ok(version) => CommandResult::success_with(
            "migrate",
            "applied pending migrations",
            json!({ "schema_version": version }),
        ),
        Err(failure) => failure,
    }
}
