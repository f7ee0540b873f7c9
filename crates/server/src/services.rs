//! HTTP bridge to the side-effect providers.
//!
//! Every capability is one `POST {base_url}/{capability}` carrying the typed
//! request plus the owning user. The provider answers with
//! `{ "success": bool, "id"?: string, "error"?: string }`.

use std::time::Duration;

use actgate_agent::commands::{
    CalendarEventRequest, EmailRequest, GoalProgressRequest, GoalRequest, HabitCompletionRequest,
    HabitRequest, SmsRequest, TaskRequest, VoiceCallRequest,
};
use actgate_agent::services::{
    CallReceipt, CalendarService, EventReceipt, LifeDataService, MessageReceipt,
    MessagingService, RecordReceipt, ServiceError, VoiceService,
};
use actgate_core::domain::action::UserId;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub struct HttpServiceGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    user_id: &'a str,
    #[serde(flatten)]
    request: &'a T,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderAck {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpServiceGateway {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs.max(1))).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        capability: &'static str,
        user_id: &UserId,
        request: &T,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/{capability}", self.base_url);
        let mut builder =
            self.client.post(&url).json(&Envelope { user_id: &user_id.0, request });
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| transport_error(capability, error))?;
        let status = response.status();
        let ack = response.json::<ProviderAck>().await.unwrap_or_default();

        if status.is_server_error() {
            return Err(ServiceError::Unavailable {
                capability,
                message: ack.error.unwrap_or_else(|| format!("provider returned {status}")),
            });
        }
        if !status.is_success() || ack.success == Some(false) {
            return Err(ServiceError::Rejected {
                capability,
                message: ack.error.unwrap_or_else(|| format!("provider returned {status}")),
            });
        }

        tracing::debug!(
            event_name = "action.service.delivered",
            capability,
            user_id = %user_id,
            "provider accepted request"
        );
        Ok(ack.id.unwrap_or_default())
    }
}

fn transport_error(capability: &'static str, error: reqwest::Error) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout { capability }
    } else {
        ServiceError::Unavailable { capability, message: error.to_string() }
    }
}

#[async_trait]
impl MessagingService for HttpServiceGateway {
    async fn send_sms(
        &self,
        user_id: &UserId,
        request: &SmsRequest,
    ) -> Result<MessageReceipt, ServiceError> {
        Ok(MessageReceipt { message_id: self.post("sms", user_id, request).await? })
    }

    async fn send_email(
        &self,
        user_id: &UserId,
        request: &EmailRequest,
    ) -> Result<MessageReceipt, ServiceError> {
        Ok(MessageReceipt { message_id: self.post("email", user_id, request).await? })
    }
}

#[async_trait]
impl VoiceService for HttpServiceGateway {
    async fn place_call(
        &self,
        user_id: &UserId,
        request: &VoiceCallRequest,
    ) -> Result<CallReceipt, ServiceError> {
        Ok(CallReceipt { call_id: self.post("voice_call", user_id, request).await? })
    }
}

#[async_trait]
impl CalendarService for HttpServiceGateway {
    async fn create_event(
        &self,
        user_id: &UserId,
        request: &CalendarEventRequest,
    ) -> Result<EventReceipt, ServiceError> {
        Ok(EventReceipt { event_id: self.post("calendar_event", user_id, request).await? })
    }
}

#[async_trait]
impl LifeDataService for HttpServiceGateway {
    async fn create_task(
        &self,
        user_id: &UserId,
        request: &TaskRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        Ok(RecordReceipt { record_id: self.post("task", user_id, request).await? })
    }

    async fn complete_habit(
        &self,
        user_id: &UserId,
        request: &HabitCompletionRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        Ok(RecordReceipt { record_id: self.post("habit_completion", user_id, request).await? })
    }

    async fn update_goal_progress(
        &self,
        user_id: &UserId,
        request: &GoalProgressRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        Ok(RecordReceipt { record_id: self.post("goal_progress", user_id, request).await? })
    }

    async fn create_goal(
        &self,
        user_id: &UserId,
        request: &GoalRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        Ok(RecordReceipt { record_id: self.post("goal", user_id, request).await? })
    }

    async fn create_habit(
        &self,
        user_id: &UserId,
        request: &HabitRequest,
    ) -> Result<RecordReceipt, ServiceError> {
        Ok(RecordReceipt { record_id: self.post("habit", user_id, request).await? })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actgate_agent::commands::{EmailRequest, SmsRequest};
    use actgate_agent::services::{MessagingService, ServiceError};
    use actgate_core::domain::action::UserId;
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::HttpServiceGateway;

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn provider(seen: Seen) -> String {
        async fn sms(
            State(seen): State<Seen>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            let auth = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            seen.lock().expect("lock").push((auth, body));
            (StatusCode::OK, Json(json!({"success": true, "id": "SM-001"})))
        }

        async fn email() -> (StatusCode, Json<Value>) {
            (StatusCode::BAD_GATEWAY, Json(json!({"success": false, "error": "smtp relay down"})))
        }

        let app = Router::new()
            .route("/sms", post(sms))
            .route("/email", post(email))
            .with_state(seen);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn posts_typed_payload_with_user_and_key() {
        let seen = Seen::default();
        let base_url = provider(seen.clone()).await;
        let gateway =
            HttpServiceGateway::new(&format!("{base_url}/"), Some("provider-key".to_string().into()), 5)
                .expect("client");

        let receipt = gateway
            .send_sms(
                &UserId("user-1".to_string()),
                &SmsRequest { to: "+15550100".to_string(), message: "hello".to_string() },
            )
            .await
            .expect("delivered");
        assert_eq!(receipt.message_id, "SM-001");

        let seen = seen.lock().expect("lock").clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer provider-key"));
        assert_eq!(seen[0].1, json!({"user_id": "user-1", "to": "+15550100", "message": "hello"}));
    }

    #[tokio::test]
    async fn provider_failures_map_to_service_errors() {
        let base_url = provider(Seen::default()).await;
        let gateway = HttpServiceGateway::new(&base_url, None, 5).expect("client");

        let error = gateway
            .send_email(
                &UserId("user-1".to_string()),
                &EmailRequest {
                    to: "a@example.com".to_string(),
                    subject: "s".to_string(),
                    body: "b".to_string(),
                },
            )
            .await
            .expect_err("provider down");
        assert_eq!(
            error,
            ServiceError::Unavailable { capability: "email", message: "smtp relay down".to_string() }
        );
    }

    #[tokio::test]
    async fn unreachable_provider_is_unavailable() {
        let gateway = HttpServiceGateway::new("http://127.0.0.1:9", None, 1).expect("client");
        let error = gateway
            .send_sms(
                &UserId("user-1".to_string()),
                &SmsRequest { to: "+15550100".to_string(), message: "hello".to_string() },
            )
            .await
            .expect_err("nothing listening");
        assert!(matches!(
            error,
            ServiceError::Unavailable { capability: "sms", .. } | ServiceError::Timeout { capability: "sms" }
        ));
    }
}
