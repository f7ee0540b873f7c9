use sqlx::sqlite::SqliteRow;

use actgate_core::domain::action::{ActionId, UserId};
use actgate_core::domain::history::ActionFeedback;

use super::{column, decode_timestamp, encode_timestamp, ActionFeedbackRepository, RepositoryError};
use crate::DbPool;

pub struct SqlActionFeedbackRepository {
    pool: DbPool,
}

impl SqlActionFeedbackRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_feedback(row: &SqliteRow) -> Result<ActionFeedback, RepositoryError> {
    let action_id: String = column(row, "action_id")?;
    let user_id: String = column(row, "user_id")?;
    let rating: Option<i64> = column(row, "rating")?;
    let comment: Option<String> = column(row, "comment")?;
    let time_to_decision_ms: i64 = column(row, "time_to_decision_ms")?;
    let created_at: String = column(row, "created_at")?;

    let rating = rating
        .map(|value| {
            u8::try_from(value)
                .map_err(|_| RepositoryError::Decode(format!("rating out of range: {value}")))
        })
        .transpose()?;

    Ok(ActionFeedback {
        action_id: ActionId(action_id),
        user_id: UserId(user_id),
        rating,
        comment,
        time_to_decision_ms,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl ActionFeedbackRepository for SqlActionFeedbackRepository {
    async fn insert(&self, feedback: ActionFeedback) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO action_feedback (action_id, user_id, rating, comment,
                                          time_to_decision_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&feedback.action_id.0)
        .bind(&feedback.user_id.0)
        .bind(feedback.rating.map(i64::from))
        .bind(&feedback.comment)
        .bind(feedback.time_to_decision_ms)
        .bind(encode_timestamp(feedback.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_for_action(
        &self,
        action_id: &ActionId,
    ) -> Result<Option<ActionFeedback>, RepositoryError> {
        let row = sqlx::query(
            "SELECT action_id, user_id, rating, comment, time_to_decision_ms, created_at
             FROM action_feedback WHERE action_id = ?",
        )
        .bind(&action_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_feedback).transpose()
    }
}
