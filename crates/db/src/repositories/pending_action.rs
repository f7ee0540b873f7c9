use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;

use actgate_core::domain::action::{
    ActionId, ActionType, PendingAction, PendingActionStatus, RiskLevel, UserId,
};
use actgate_core::domain::history::ActionHistoryRecord;

use super::history::insert_record;
use super::{
    column, decode_optional_timestamp, decode_payload, decode_timestamp, encode_json,
    encode_timestamp, PendingActionRepository, RepositoryError,
};
use crate::DbPool;

const COLUMNS: &str = "id, user_id, session_id, action_type, payload_json, risk_level,
    confidence_score, status, proposed_at, expires_at, confirmed_at, executed_at,
    execution_result_json, cancel_reason";

pub struct SqlPendingActionRepository {
    pool: DbPool,
}

impl SqlPendingActionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_pending_action(row: &SqliteRow) -> Result<PendingAction, RepositoryError> {
    let id: String = column(row, "id")?;
    let user_id: String = column(row, "user_id")?;
    let session_id: Option<String> = column(row, "session_id")?;
    let action_type: String = column(row, "action_type")?;
    let payload_json: String = column(row, "payload_json")?;
    let risk_level: String = column(row, "risk_level")?;
    let confidence_score: Option<f64> = column(row, "confidence_score")?;
    let status: String = column(row, "status")?;
    let proposed_at: String = column(row, "proposed_at")?;
    let expires_at: String = column(row, "expires_at")?;
    let confirmed_at: Option<String> = column(row, "confirmed_at")?;
    let executed_at: Option<String> = column(row, "executed_at")?;
    let execution_result_json: Option<String> = column(row, "execution_result_json")?;
    let cancel_reason: Option<String> = column(row, "cancel_reason")?;

    let risk_level = RiskLevel::parse(&risk_level)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown risk level `{risk_level}`")))?;
    let status = PendingActionStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action status `{status}`")))?;
    let execution_result = execution_result_json
        .map(|raw| {
            serde_json::from_str::<Value>(&raw)
                .map_err(|e| RepositoryError::Decode(format!("execution_result_json: {e}")))
        })
        .transpose()?;

    Ok(PendingAction {
        id: ActionId(id),
        user_id: UserId(user_id),
        session_id,
        action_type: ActionType::parse(&action_type),
        payload: decode_payload("payload_json", &payload_json)?,
        risk_level,
        confidence_score,
        status,
        proposed_at: decode_timestamp("proposed_at", &proposed_at)?,
        expires_at: decode_timestamp("expires_at", &expires_at)?,
        confirmed_at: decode_optional_timestamp("confirmed_at", confirmed_at)?,
        executed_at: decode_optional_timestamp("executed_at", executed_at)?,
        execution_result,
        cancel_reason,
    })
}

#[async_trait::async_trait]
impl PendingActionRepository for SqlPendingActionRepository {
    async fn insert(&self, action: PendingAction) -> Result<(), RepositoryError> {
        let payload_json = encode_json(&action.payload)?;
        let execution_result_json = action.execution_result.as_ref().map(encode_json).transpose()?;

        sqlx::query(
            "INSERT INTO pending_action (id, user_id, session_id, action_type, payload_json,
                                         risk_level, confidence_score, status, proposed_at,
                                         expires_at, confirmed_at, executed_at,
                                         execution_result_json, cancel_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&action.id.0)
        .bind(&action.user_id.0)
        .bind(&action.session_id)
        .bind(action.action_type.as_str())
        .bind(payload_json)
        .bind(action.risk_level.as_str())
        .bind(action.confidence_score)
        .bind(action.status.as_str())
        .bind(encode_timestamp(action.proposed_at))
        .bind(encode_timestamp(action.expires_at))
        .bind(action.confirmed_at.map(encode_timestamp))
        .bind(action.executed_at.map(encode_timestamp))
        .bind(execution_result_json)
        .bind(&action.cancel_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_for_user(
        &self,
        id: &ActionId,
        user_id: &UserId,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let sql = format!("SELECT {COLUMNS} FROM pending_action WHERE id = ? AND user_id = ?");
        let row = sqlx::query(&sql)
            .bind(&id.0)
            .bind(&user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_pending_action).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        status: Option<PendingActionStatus>,
        limit: u32,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let rows: Vec<SqliteRow> = if let Some(status) = status {
            let sql = format!(
                "SELECT {COLUMNS} FROM pending_action
                 WHERE user_id = ? AND status = ?
                 ORDER BY proposed_at DESC, id ASC
                 LIMIT ?"
            );
            sqlx::query(&sql)
                .bind(&user_id.0)
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!(
                "SELECT {COLUMNS} FROM pending_action
                 WHERE user_id = ?
                 ORDER BY proposed_at DESC, id ASC
                 LIMIT ?"
            );
            sqlx::query(&sql).bind(&user_id.0).bind(limit).fetch_all(&self.pool).await?
        };

        rows.iter().map(row_to_pending_action).collect()
    }

    async fn mark_confirmed(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let at = encode_timestamp(at);
        let sql = format!(
            "UPDATE pending_action
             SET status = 'confirmed', confirmed_at = ?
             WHERE id = ? AND user_id = ? AND status = 'pending' AND expires_at >= ?
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&at)
            .bind(&id.0)
            .bind(&user_id.0)
            .bind(&at)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_pending_action).transpose()
    }

    async fn mark_cancelled(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let sql = format!(
            "UPDATE pending_action
             SET status = 'cancelled', cancel_reason = ?
             WHERE id = ? AND user_id = ? AND status = 'pending' AND expires_at >= ?
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(reason)
            .bind(&id.0)
            .bind(&user_id.0)
            .bind(encode_timestamp(at))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_pending_action).transpose()
    }

    async fn mark_expired(
        &self,
        id: &ActionId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let sql = format!(
            "UPDATE pending_action
             SET status = 'expired'
             WHERE id = ? AND user_id = ? AND status = 'pending' AND expires_at < ?
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&id.0)
            .bind(&user_id.0)
            .bind(encode_timestamp(at))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_pending_action).transpose()
    }

    async fn record_outcome(
        &self,
        id: &ActionId,
        user_id: &UserId,
        result: &Value,
        history: &ActionHistoryRecord,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE pending_action
             SET status = ?, executed_at = ?, execution_result_json = ?
             WHERE id = ? AND user_id = ? AND status = 'confirmed'
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(PendingActionStatus::from(history.action_status).as_str())
            .bind(encode_timestamp(history.executed_at))
            .bind(encode_json(result)?)
            .bind(&id.0)
            .bind(&user_id.0)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let resolved = row_to_pending_action(&row)?;

        insert_record(&mut *tx, history).await?;
        tx.commit().await?;
        Ok(Some(resolved))
    }

    async fn expire_overdue(
        &self,
        user_id: Option<&UserId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let at = encode_timestamp(at);
        let rows: Vec<SqliteRow> = if let Some(user_id) = user_id {
            let sql = format!(
                "UPDATE pending_action
                 SET status = 'expired'
                 WHERE user_id = ? AND status = 'pending' AND expires_at < ?
                 RETURNING {COLUMNS}"
            );
            sqlx::query(&sql).bind(&user_id.0).bind(&at).fetch_all(&self.pool).await?
        } else {
            let sql = format!(
                "UPDATE pending_action
                 SET status = 'expired'
                 WHERE status = 'pending' AND expires_at < ?
                 RETURNING {COLUMNS}"
            );
            sqlx::query(&sql).bind(&at).fetch_all(&self.pool).await?
        };

        rows.iter().map(row_to_pending_action).collect()
    }

    async fn delete_resolved_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let sql = format!(
            "DELETE FROM pending_action
             WHERE status IN ('executed', 'failed', 'cancelled', 'expired') AND proposed_at < ?
             RETURNING {COLUMNS}"
        );
        let rows = sqlx::query(&sql).bind(encode_timestamp(cutoff)).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_pending_action).collect()
    }
}
