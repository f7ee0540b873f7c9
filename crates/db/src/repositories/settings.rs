use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use actgate_core::domain::action::UserId;
use actgate_core::domain::settings::{TeamId, TeamPolicy, UserAgentSettings};

use super::{column, decode_timestamp, encode_timestamp, RepositoryError, SettingsRepository};
use crate::DbPool;

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_team_policy(row: &SqliteRow) -> Result<TeamPolicy, RepositoryError> {
    let team_id: String = column(row, "team_id")?;
    let allow_send_email: bool = column(row, "allow_send_email")?;
    let allow_send_sms: bool = column(row, "allow_send_sms")?;
    let allow_voice_calls: bool = column(row, "allow_voice_calls")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(TeamPolicy {
        team_id: TeamId(team_id),
        allow_send_email,
        allow_send_sms,
        allow_voice_calls,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn team_policy_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<TeamPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT p.team_id, p.allow_send_email, p.allow_send_sms, p.allow_voice_calls,
                    p.updated_at
             FROM team_membership m
             JOIN team_policy p ON p.team_id = m.team_id
             WHERE m.user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_team_policy).transpose()
    }

    async fn find_team_policy(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<TeamPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT team_id, allow_send_email, allow_send_sms, allow_voice_calls, updated_at
             FROM team_policy WHERE team_id = ?",
        )
        .bind(&team_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_team_policy).transpose()
    }

    async fn save_team_policy(&self, policy: TeamPolicy) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO team_policy (team_id, allow_send_email, allow_send_sms,
                                      allow_voice_calls, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(team_id) DO UPDATE SET
                 allow_send_email = excluded.allow_send_email,
                 allow_send_sms = excluded.allow_send_sms,
                 allow_voice_calls = excluded.allow_voice_calls,
                 updated_at = excluded.updated_at",
        )
        .bind(&policy.team_id.0)
        .bind(policy.allow_send_email)
        .bind(policy.allow_send_sms)
        .bind(policy.allow_voice_calls)
        .bind(encode_timestamp(policy.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn assign_member(
        &self,
        user_id: &UserId,
        team_id: &TeamId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO team_membership (user_id, team_id, joined_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 team_id = excluded.team_id,
                 joined_at = excluded.joined_at",
        )
        .bind(&user_id.0)
        .bind(&team_id.0)
        .bind(encode_timestamp(at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn user_settings(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserAgentSettings>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, auto_approve_low_risk_only, updated_at
             FROM user_agent_settings WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: String = column(&row, "user_id")?;
        let auto_approve_low_risk_only: Option<bool> = column(&row, "auto_approve_low_risk_only")?;
        let updated_at: String = column(&row, "updated_at")?;

        Ok(Some(UserAgentSettings {
            user_id: UserId(user_id),
            auto_approve_low_risk_only,
            updated_at: decode_timestamp("updated_at", &updated_at)?,
        }))
    }

    async fn save_user_settings(
        &self,
        settings: UserAgentSettings,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_agent_settings (user_id, auto_approve_low_risk_only, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 auto_approve_low_risk_only = excluded.auto_approve_low_risk_only,
                 updated_at = excluded.updated_at",
        )
        .bind(&settings.user_id.0)
        .bind(settings.auto_approve_low_risk_only)
        .bind(encode_timestamp(settings.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
