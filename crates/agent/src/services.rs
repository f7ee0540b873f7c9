//! Outbound side effects. Each capability sits behind its own trait so the
//! executor can be wired to real providers in the server and to
//! [`RecordingServices`] everywhere else.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use actgate_core::domain::action::UserId;

use crate::commands::{
    CalendarEventRequest, EmailRequest, GoalProgressRequest, GoalRequest, HabitCompletionRequest,
    HabitRequest, SmsRequest, TaskRequest, VoiceCallRequest,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{capability} rejected the request: {message}")]
    Rejected { capability: &'static str, message: String },
    #[error("{capability} is unavailable: {message}")]
    Unavailable { capability: &'static str, message: String },
    #[error("{capability} timed out")]
    Timeout { capability: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReceipt {
    pub call_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReceipt {
    pub event_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub record_id: String,
}

#[async_trait]
pub trait MessagingService: Send + Sync {
    async fn send_sms(&self, user_id: &UserId, request: &SmsRequest)
        -> Result<MessageReceipt, ServiceError>;

    async fn send_email(
        &self,
        user_id: &UserId,
        request: &EmailRequest,
    ) -> Result<MessageReceipt, ServiceError>;
}

#[async_trait]
pub trait VoiceService: Send + Sync {
    async fn place_call(
        &self,
        user_id: &UserId,
        request: &VoiceCallRequest,
    ) -> Result<CallReceipt, ServiceError>;
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn create_event(
        &self,
        user_id: &UserId,
        request: &CalendarEventRequest,
    ) -> Result<EventReceipt, ServiceError>;
}

/// Tasks, habits and goals.
#[async_trait]
pub trait LifeDataService: Send + Sync {
    async fn create_task(
        &self,
        user_id: &UserId,
        request: &TaskRequest,
    ) -> Result<RecordReceipt, ServiceError>;

    async fn complete_habit(
        &self,
        user_id: &UserId,
        request: &HabitCompletionRequest,
    ) -> Result<RecordReceipt, ServiceError>;

    async fn update_goal_progress(
        &self,
        user_id: &UserId,
        request: &GoalProgressRequest,
    ) -> Result<RecordReceipt, ServiceError>;

    async fn create_goal(
        &self,
        user_id: &UserId,
        request: &GoalRequest,
    ) -> Result<RecordReceipt, ServiceError>;

    async fn create_habit(
        &self,
        user_id: &UserId,
        request: &HabitRequest,
    ) -> Result<RecordReceipt, ServiceError>;
}

#[derive(Clone)]
pub struct ServiceRegistry {
    pub messaging: Arc<dyn MessagingService>,
    pub voice: Arc<dyn VoiceService>,
    pub calendar: Arc<dyn CalendarService>,
    pub life_data: Arc<dyn LifeDataService>,
}

impl ServiceRegistry {
    /// One provider for every capability.
    pub fn uniform<S>(service: Arc<S>) -> Self
    where
        S: MessagingService + VoiceService + CalendarService + LifeDataService + 'static,
    {
        Self {
            messaging: service.clone(),
            voice: service.clone(),
            calendar: service.clone(),
            life_data: service,
        }
    }

    pub fn recording() -> (Self, Arc<RecordingServices>) {
        let services = Arc::new(RecordingServices::default());
        (Self::uniform(services.clone()), services)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub capability: &'static str,
    pub user_id: UserId,
    pub payload: Value,
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<RecordedCall>,
    failing: HashSet<&'static str>,
}

/// Dry-run provider: records every call instead of reaching the outside
/// world. Capabilities can be switched to fail.
#[derive(Default)]
pub struct RecordingServices {
    state: Mutex<RecordingState>,
}

impl RecordingServices {
    pub fn fail(&self, capability: &'static str) {
        self.state().failing.insert(capability);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn calls_for(&self, capability: &str) -> Vec<RecordedCall> {
        self.state().calls.iter().filter(|call| call.capability == capability).cloned().collect()
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record<T: Serialize>(
        &self,
        capability: &'static str,
        user_id: &UserId,
        request: &T,
    ) -> Result<String, ServiceError> {
        let payload = serde_json::to_value(request).unwrap_or(Value::Null);
        let mut state = self.state();
        if state.failing.contains(capability) {
            return Err(ServiceError::Unavailable {
                capability,
                message: "provider switched off".to_string(),
            });
        }

        state.calls.push(RecordedCall { capability, user_id: user_id.clone(), payload });
        let reference = format!("{capability}-{}", state.calls.len());
        tracing::debug!(
            event_name = "action.service.dry_run",
            capability,
            user_id = %user_id,
            reference = %reference,
            "recorded outbound call"
        );
        Ok(reference)
    }
}

#[async_trait]
impl MessagingService for RecordingServices {
    async fn send_sms(
        &self,
        user_id: &UserId,
        request: &SmsRequest,
    ) -> Result<MessageReceipt, ServiceError> {
        let message_id = self.record("sms", user_id, request)?;
        Ok(MessageReceipt { message_id })
    }

    async fn send_email(
        &self,
        user_id: &UserId,
        request: &EmailRequest,
    ) -> Result<MessageReceipt, ServiceError> {
        let message_id = self.record("email", user_id, request)?;
        Ok(MessageReceipt { message_id })
    }
}

#[async_trait]
impl VoiceService for RecordingServices {
    async fn place_call(
        &self,
        user_id: &UserId,
        request: &VoiceCallRequest,
    ) -> Result<CallReceipt, ServiceError> {
        let call_id = self.record("voice_call", user_id, request)?;
        Ok(CallReceipt { call_id })
    }
}

#[async_trait]
impl CalendarService for RecordingServices {
    async fn create_event(
        &self,
        user_id: &UserId,
        request: &CalendarEventRequest,
    ) -> Result<EventReceipt, ServiceError> {
        let event_id = self.record("calendar_event", user_id, request)?;
        Ok(EventReceipt { event_id })
    }
}

#[async_trait]
impl LifeDataService for RecordingServices {
    async fn create_task(
        &self,
        user_id: &UserId,
        request: &TaskRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        let record_id = self.record("task", user_id, request)?;
        Ok(RecordReceipt { record_id })
    }

    async fn complete_habit(
        &self,
        user_id: &UserId,
        request: &HabitCompletionRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        let record_id = self.record("habit_completion", user_id, request)?;
        Ok(RecordReceipt { record_id })
    }

    async fn update_goal_progress(
        &self,
        user_id: &UserId,
        request: &GoalProgressRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        let record_id = self.record("goal_progress", user_id, request)?;
        Ok(RecordReceipt { record_id })
    }

    async fn create_goal(
        &self,
        user_id: &UserId,
        request: &GoalRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        let record_id = self.record("goal", user_id, request)?;
        Ok(RecordReceipt { record_id })
    }

    async fn create_habit(
        &self,
        user_id: &UserId,
        request: &HabitRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        let record_id = self.record("habit", user_id, request)?;
        Ok(RecordReceipt { record_id })
    }
}
