use actgate_core::auth::TokenSigner;
use actgate_core::domain::action::UserId;
use serde_json::json;

use crate::commands::{load_config, CommandResult, EXIT_INPUT};

/// Issues a bearer token for `user_id` with the configured secret.
pub fn run(user_id: &str) -> CommandResult {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return CommandResult::failure("token", "invalid_input", "user id must not be empty", EXIT_INPUT);
    }

    let config = match load_config("token") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let user_id = UserId(user_id.to_string());
    let token = TokenSigner::new(config.auth.token_secret.clone()).issue(&user_id);
    CommandResult::success_with(
        "token",
        format!("issued bearer token for {user_id}"),
        json!({ "user_id": user_id, "token": token }),
    )
}
