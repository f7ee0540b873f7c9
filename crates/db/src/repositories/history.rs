use sqlx::sqlite::SqliteRow;

use actgate_core::domain::action::{ActionId, ActionType, RiskLevel, TriggerContext, UserId};
use actgate_core::domain::history::{ActionHistoryRecord, HistoryId, HistoryStatus};

use super::{
    column, decode_payload, decode_timestamp, encode_json, encode_timestamp,
    ActionHistoryRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlActionHistoryRepository {
    pool: DbPool,
}

impl SqlActionHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<ActionHistoryRecord, RepositoryError> {
    let id: String = column(row, "id")?;
    let user_id: String = column(row, "user_id")?;
    let action_id: Option<String> = column(row, "action_id")?;
    let action_type: String = column(row, "action_type")?;
    let action_status: String = column(row, "action_status")?;
    let payload_json: String = column(row, "payload_json")?;
    let trigger_context: String = column(row, "trigger_context")?;
    let risk_level: Option<String> = column(row, "risk_level")?;
    let confidence_score: Option<f64> = column(row, "confidence_score")?;
    let executed_at: String = column(row, "executed_at")?;

    let action_status = HistoryStatus::parse(&action_status).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown history status `{action_status}`"))
    })?;
    let trigger_context = TriggerContext::parse(&trigger_context).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown trigger context `{trigger_context}`"))
    })?;
    let risk_level = match risk_level {
        Some(raw) => Some(
            RiskLevel::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown risk level `{raw}`")))?,
        ),
        None => None,
    };

    Ok(ActionHistoryRecord {
        id: HistoryId(id),
        user_id: UserId(user_id),
        action_id: action_id.map(ActionId),
        action_type: ActionType::parse(&action_type),
        action_status,
        payload: decode_payload("payload_json", &payload_json)?,
        trigger_context,
        risk_level,
        confidence_score,
        executed_at: decode_timestamp("executed_at", &executed_at)?,
    })
}

/// Shared by `append` and the outcome transaction in the pending store.
pub(crate) async fn insert_record<'e, E>(
    executor: E,
    record: &ActionHistoryRecord,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO action_history (id, user_id, action_id, action_type, action_status,
                                     payload_json, trigger_context, risk_level,
                                     confidence_score, executed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id.0)
    .bind(&record.user_id.0)
    .bind(record.action_id.as_ref().map(|id| id.0.as_str()))
    .bind(record.action_type.as_str())
    .bind(record.action_status.as_str())
    .bind(encode_json(&record.payload)?)
    .bind(record.trigger_context.as_str())
    .bind(record.risk_level.map(|risk| risk.as_str()))
    .bind(record.confidence_score)
    .bind(encode_timestamp(record.executed_at))
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl ActionHistoryRepository for SqlActionHistoryRepository {
    async fn append(&self, record: ActionHistoryRecord) -> Result<(), RepositoryError> {
        insert_record(&self.pool, &record).await
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ActionHistoryRecord>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT id, user_id, action_id, action_type, action_status, payload_json,
                    trigger_context, risk_level, confidence_score, executed_at
             FROM action_history
             WHERE user_id = ?
             ORDER BY executed_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}
