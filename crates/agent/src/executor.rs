use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use actgate_core::domain::action::{ActionType, UserId};
use actgate_core::errors::ActionError;

use crate::commands::ActionCommand;
use crate::services::{ServiceError, ServiceRegistry};

/// What the executor reports back. `details` carries the provider receipt
/// and is flattened into the serialized form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ExecutionOutcome {
    pub fn succeeded(message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self { success: true, message: Some(message.into()), error: None, details }
    }

    pub fn failed(error: &ActionError) -> Self {
        Self { success: false, message: None, error: Some(error.to_string()), details: Map::new() }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Closed dispatch from action type to one service call. Never panics and
/// never lets a provider error escape as anything but `ExecutionFailed`.
#[derive(Clone)]
pub struct ActionExecutor {
    services: ServiceRegistry,
}

impl ActionExecutor {
    pub fn new(services: ServiceRegistry) -> Self {
        Self { services }
    }

    pub async fn execute(
        &self,
        user_id: &UserId,
        action_type: &ActionType,
        payload: &Map<String, Value>,
    ) -> ExecutionOutcome {
        match self.try_execute(user_id, action_type, payload).await {
            Ok(outcome) => outcome,
            Err(error) => ExecutionOutcome::failed(&error),
        }
    }

    pub async fn try_execute(
        &self,
        user_id: &UserId,
        action_type: &ActionType,
        payload: &Map<String, Value>,
    ) -> Result<ExecutionOutcome, ActionError> {
        let command = ActionCommand::parse(action_type, payload)?;
        let services = &self.services;

        let outcome = match &command {
            ActionCommand::SendSms(request) => {
                let receipt = services.messaging.send_sms(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("Text message sent to {}", request.to),
                    details([("message_id", receipt.message_id.into())]),
                )
            }
            ActionCommand::SendEmail(request) => {
                let receipt =
                    services.messaging.send_email(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("Email sent to {}", request.to),
                    details([("message_id", receipt.message_id.into())]),
                )
            }
            ActionCommand::MakeVoiceCall(request) => {
                let receipt = services.voice.place_call(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("Call to {} started", request.to),
                    details([("call_id", receipt.call_id.into())]),
                )
            }
            ActionCommand::CreateCalendarEvent(request) => {
                let receipt =
                    services.calendar.create_event(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("\"{}\" added to your calendar", request.title),
                    details([("event_id", receipt.event_id.into())]),
                )
            }
            ActionCommand::CreateTask(request) => {
                let receipt =
                    services.life_data.create_task(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("Task \"{}\" created", request.title),
                    details([("task_id", receipt.record_id.into())]),
                )
            }
            ActionCommand::MarkHabitComplete(request) => {
                let receipt =
                    services.life_data.complete_habit(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    "Habit marked complete",
                    details([("completion_id", receipt.record_id.into())]),
                )
            }
            ActionCommand::UpdateGoalProgress(request) => {
                let receipt = services
                    .life_data
                    .update_goal_progress(user_id, request)
                    .await
                    .map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("Goal progress set to {}%", request.progress),
                    details([("progress_id", receipt.record_id.into())]),
                )
            }
            ActionCommand::CreateGoal(request) => {
                let receipt =
                    services.life_data.create_goal(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("Goal \"{}\" created", request.title),
                    details([("goal_id", receipt.record_id.into())]),
                )
            }
            ActionCommand::CreateHabit(request) => {
                let receipt =
                    services.life_data.create_habit(user_id, request).await.map_err(failed)?;
                ExecutionOutcome::succeeded(
                    format!("Habit \"{}\" created", request.name),
                    details([("habit_id", receipt.record_id.into())]),
                )
            }
        };

        tracing::info!(
            event_name = "action.executor.completed",
            user_id = %user_id,
            action_type = %action_type,
            "action executed"
        );
        Ok(outcome)
    }
}

fn failed(error: ServiceError) -> ActionError {
    tracing::warn!(
        event_name = "action.executor.service_failed",
        error = %error,
        "outbound service call failed"
    );
    ActionError::ExecutionFailed(error.to_string())
}

fn details<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries.into_iter().map(|(key, value)| (key.to_string(), value)).collect()
}
