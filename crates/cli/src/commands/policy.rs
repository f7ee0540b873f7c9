use actgate_core::domain::action::UserId;
use actgate_core::domain::settings::{TeamId, TeamPolicy};
use actgate_db::repositories::{SettingsRepository, SqlSettingsRepository};
use chrono::Utc;
use serde_json::json;

use crate::commands::{with_database, CommandResult, EXIT_INPUT, EXIT_OPERATION};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PolicyFlags {
    pub allow_email: Option<bool>,
    pub allow_sms: Option<bool>,
    pub allow_voice: Option<bool>,
}

/// Creates the team policy if missing, then applies whichever flags were given.
/// A new team starts fully permissive.
pub fn run(team_id: &str, flags: PolicyFlags) -> CommandResult {
    let team_id = team_id.trim();
    if team_id.is_empty() {
        return CommandResult::failure("policy", "invalid_input", "team id must not be empty", EXIT_INPUT);
    }
    let team_id = TeamId(team_id.to_string());

    let result = with_database("policy", |_config, pool| async move {
        let settings = SqlSettingsRepository::new(pool);
        let mut policy = settings
            .find_team_policy(&team_id)
            .await
            .map_err(|error| ("policy_store", error.to_string(), EXIT_OPERATION))?
            .unwrap_or_else(|| TeamPolicy::permissive(team_id.clone()));

        if let Some(allow) = flags.allow_email {
            policy.allow_send_email = allow;
        }
        if let Some(allow) = flags.allow_sms {
            policy.allow_send_sms = allow;
        }
        if let Some(allow) = flags.allow_voice {
            policy.allow_voice_calls = allow;
        }
        policy.updated_at = Utc::now();

        settings
            .save_team_policy(policy.clone())
            .await
            .map_err(|error| ("policy_store", error.to_string(), EXIT_OPERATION))?;
        Ok(policy)
    });

    match result {
        Ok(policy) => CommandResult::success_with(
            "policy",
            format!("saved policy for team {}", policy.team_id.0),
            policy,
        ),
        Err(failure) => failure,
    }
}

/// Moves `user_id` into `team_id`. The team must already have a policy.
pub fn assign_member(user_id: &str, team_id: &str) -> CommandResult {
    let (user_id, team_id) = (user_id.trim(), team_id.trim());
    if user_id.is_empty() || team_id.is_empty() {
        return CommandResult::failure(
            "member",
            "invalid_input",
            "user id and team id must not be empty",
            EXIT_INPUT,
        );
    }
    let user_id = UserId(user_id.to_string());
    let team_id = TeamId(team_id.to_string());

    let result = with_database("member", |_config, pool| async move {
        let settings = SqlSettingsRepository::new(pool);
        let known = settings
            .find_team_policy(&team_id)
            .await
            .map_err(|error| ("policy_store", error.to_string(), EXIT_OPERATION))?;
        if known.is_none() {
            return Err((
                "unknown_team",
                format!("team {} has no policy; create it with `actgate policy` first", team_id.0),
                EXIT_INPUT,
            ));
        }

        settings
            .assign_member(&user_id, &team_id, Utc::now())
            .await
            .map_err(|error| ("policy_store", error.to_string(), EXIT_OPERATION))?;
        Ok((user_id, team_id))
    });

    match result {
        Ok((user_id, team_id)) => CommandResult::success_with(
            "member",
            format!("{user_id} now belongs to team {}", team_id.0),
            json!({ "user_id": user_id, "team_id": team_id }),
        ),
        Err(failure) => failure,
    }
}
