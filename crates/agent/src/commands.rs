//! Typed rendering of a stored `(action_type, payload)` pair.
//!
//! The model's arguments are never trusted: every handler goes through
//! [`ActionCommand::parse`] first, which fails with a `ValidationFailed` that
//! names the offending field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use actgate_core::domain::action::ActionType;
use actgate_core::errors::ActionError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HabitCompletionRequest {
    pub habit_id: String,
    pub completed_on: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub title: String,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalProgressRequest {
    pub goal_id: String,
    pub progress: f64,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalRequest {
    pub title: String,
    pub target_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HabitRequest {
    pub name: String,
    pub frequency: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarEventRequest {
    pub title: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmsRequest {
    pub to: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceCallRequest {
    pub to: String,
    pub purpose: String,
    pub script: Option<String>,
}

/// One variant per known action type.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionCommand {
    MarkHabitComplete(HabitCompletionRequest),
    CreateTask(TaskRequest),
    UpdateGoalProgress(GoalProgressRequest),
    CreateGoal(GoalRequest),
    CreateHabit(HabitRequest),
    CreateCalendarEvent(CalendarEventRequest),
    SendEmail(EmailRequest),
    SendSms(SmsRequest),
    MakeVoiceCall(VoiceCallRequest),
}

impl ActionCommand {
    pub fn parse(action_type: &ActionType, payload: &Map<String, Value>) -> Result<Self, ActionError> {
        let args = Args(payload);
        let command = match action_type {
            ActionType::MarkHabitComplete => Self::MarkHabitComplete(HabitCompletionRequest {
                habit_id: args.required_string("habit_id")?,
                completed_on: args.optional_string("completed_on")?,
            }),
            ActionType::CreateTask => Self::CreateTask(TaskRequest {
                title: args.required_string("title")?,
                due_date: args.optional_string("due_date")?,
                notes: args.optional_string("notes")?,
            }),
            ActionType::UpdateGoalProgress => {
                let progress = args.required_number("progress")?;
                if !(0.0..=100.0).contains(&progress) {
                    return Err(ActionError::ValidationFailed(format!(
                        "field `progress` must be between 0 and 100, got {progress}"
                    )));
                }
                Self::UpdateGoalProgress(GoalProgressRequest {
                    goal_id: args.required_string("goal_id")?,
                    progress,
                    note: args.optional_string("note")?,
                })
            }
            ActionType::CreateGoal => Self::CreateGoal(GoalRequest {
                title: args.required_string("title")?,
                target_date: args.optional_string("target_date")?,
                description: args.optional_string("description")?,
            }),
            ActionType::CreateHabit => Self::CreateHabit(HabitRequest {
                name: args.required_string("name")?,
                frequency: args.optional_string("frequency")?,
            }),
            ActionType::CreateCalendarEvent => Self::CreateCalendarEvent(CalendarEventRequest {
                title: args.required_string("title")?,
                start_time: args.required_string("start_time")?,
                end_time: args.optional_string("end_time")?,
                location: args.optional_string("location")?,
                attendees: args.string_list("attendees")?,
            }),
            ActionType::SendEmail => {
                let to = args.required_string("to")?;
                if !to.contains('@') {
                    return Err(ActionError::ValidationFailed(format!(
                        "field `to` must be an email address, got `{to}`"
                    )));
                }
                Self::SendEmail(EmailRequest {
                    to,
                    subject: args.required_string("subject")?,
                    body: args.required_string("body")?,
                })
            }
            ActionType::SendSms => Self::SendSms(SmsRequest {
                to: args.phone_number("to")?,
                message: args.required_string("message")?,
            }),
            ActionType::MakeVoiceCall => Self::MakeVoiceCall(VoiceCallRequest {
                to: args.phone_number("to")?,
                purpose: args.required_string("purpose")?,
                script: args.optional_string("script")?,
            }),
            ActionType::Other(name) => {
                return Err(ActionError::ValidationFailed(format!(
                    "unsupported action type `{name}`"
                )))
            }
        };

        Ok(command)
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::MarkHabitComplete(_) => ActionType::MarkHabitComplete,
            Self::CreateTask(_) => ActionType::CreateTask,
            Self::UpdateGoalProgress(_) => ActionType::UpdateGoalProgress,
            Self::CreateGoal(_) => ActionType::CreateGoal,
            Self::CreateHabit(_) => ActionType::CreateHabit,
            Self::CreateCalendarEvent(_) => ActionType::CreateCalendarEvent,
            Self::SendEmail(_) => ActionType::SendEmail,
            Self::SendSms(_) => ActionType::SendSms,
            Self::MakeVoiceCall(_) => ActionType::MakeVoiceCall,
        }
    }

    /// One-line summary shown to the user before they confirm.
    pub fn describe(&self) -> String {
        match self {
            Self::MarkHabitComplete(request) => {
                format!("Mark habit `{}` as complete", request.habit_id)
            }
            Self::CreateTask(request) => format!("Create task \"{}\"", request.title),
            Self::UpdateGoalProgress(request) => {
                format!("Set progress on goal `{}` to {}%", request.goal_id, request.progress)
            }
            Self::CreateGoal(request) => format!("Create goal \"{}\"", request.title),
            Self::CreateHabit(request) => format!("Create habit \"{}\"", request.name),
            Self::CreateCalendarEvent(request) => {
                format!("Add \"{}\" to your calendar at {}", request.title, request.start_time)
            }
            Self::SendEmail(request) => {
                format!("Send an email to {} with subject \"{}\"", request.to, request.subject)
            }
            Self::SendSms(request) => {
                format!("Send a text message to {}: \"{}\"", request.to, request.message)
            }
            Self::MakeVoiceCall(request) => {
                format!("Place a phone call to {} about {}", request.to, request.purpose)
            }
        }
    }
}

/// Summary for an action whose payload may not parse.
pub fn describe_action(action_type: &ActionType, payload: &Map<String, Value>) -> String {
    ActionCommand::parse(action_type, payload)
        .map(|command| command.describe())
        .unwrap_or_else(|_| format!("Run `{action_type}`"))
}

struct Args<'a>(&'a Map<String, Value>);

impl Args<'_> {
    fn required_string(&self, field: &str) -> Result<String, ActionError> {
        self.optional_string(field)?.ok_or_else(|| missing(field))
    }

    fn optional_string(&self, field: &str) -> Result<Option<String>, ActionError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.trim().to_string())),
            Some(Value::Number(value)) => Ok(Some(value.to_string())),
            Some(_) => Err(wrong_type(field, "a string")),
        }
    }

    fn required_number(&self, field: &str) -> Result<f64, ActionError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Err(missing(field)),
            Some(Value::Number(value)) => value.as_f64().ok_or_else(|| wrong_type(field, "a number")),
            Some(Value::String(value)) => {
                value.trim().parse::<f64>().map_err(|_| wrong_type(field, "a number"))
            }
            Some(_) => Err(wrong_type(field, "a number")),
        }
    }

    fn string_list(&self, field: &str) -> Result<Vec<String>, ActionError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(value)) => Ok(value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(value) => Ok(value.trim().to_string()),
                    _ => Err(wrong_type(field, "a list of strings")),
                })
                .collect(),
            Some(_) => Err(wrong_type(field, "a list of strings")),
        }
    }

    fn phone_number(&self, field: &str) -> Result<String, ActionError> {
        let value = self.required_string(field)?;
        let digits = value.chars().filter(char::is_ascii_digit).count();
        let allowed = value.chars().all(|ch| ch.is_ascii_digit() || "+-() .".contains(ch));
        if digits < 7 || !allowed {
            return Err(ActionError::ValidationFailed(format!(
                "field `{field}` must be a phone number, got `{value}`"
            )));
        }
        Ok(value)
    }
}

fn missing(field: &str) -> ActionError {
    ActionError::ValidationFailed(format!("missing required field `{field}`"))
}

fn wrong_type(field: &str, expected: &str) -> ActionError {
    ActionError::ValidationFailed(format!("field `{field}` must be {expected}"))
}
