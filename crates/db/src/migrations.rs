use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Latest applied migration version, or `None` on a fresh database.
pub async fn current_version(pool: &DbPool) -> Result<Option<i64>, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if exists == 0 {
        return Ok(None);
    }

    sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{current_version, run_pending, MIGRATOR};
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "team_policy",
        "team_membership",
        "user_agent_settings",
        "pending_action",
        "action_history",
        "action_feedback",
        "idx_team_membership_team_id",
        "idx_pending_action_user_status",
        "idx_pending_action_status_expires_at",
        "idx_action_history_action_id",
        "idx_action_history_user_executed_at",
        "idx_action_feedback_user_id",
        "pending_action_terminal_is_final",
        "action_history_no_update",
        "action_history_no_delete",
    ];

    async fn table_exists(pool: &sqlx::SqlitePool, name: &str) -> bool {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
            == 1
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert_eq!(current_version(&pool).await.expect("version"), None);

        run_pending(&pool).await.expect("run migrations");

        for table in [
            "team_policy",
            "team_membership",
            "user_agent_settings",
            "pending_action",
            "action_history",
            "action_feedback",
        ] {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
        assert!(current_version(&pool).await.expect("version").is_some());
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert!(!table_exists(&pool, "pending_action").await);
        assert!(!table_exists(&pool, "action_history").await);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(
            managed_schema_signature(&pool).await.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(
            managed_schema_signature(&pool).await,
            initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    #[tokio::test]
    async fn history_table_rejects_updates_and_deletes() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO action_history (id, user_id, action_type, action_status, trigger_context, executed_at)
             VALUES ('h-1', 'user-1', 'create_task', 'executed', 'chat', '2026-01-01T00:00:00.000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert history");

        let update = sqlx::query("UPDATE action_history SET action_status = 'failed' WHERE id = 'h-1'")
            .execute(&pool)
            .await;
        assert!(update.is_err(), "history rows must not be updated");

        let delete = sqlx::query("DELETE FROM action_history WHERE id = 'h-1'").execute(&pool).await;
        assert!(delete.is_err(), "history rows must not be deleted");
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index', 'trigger')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
