//! Action pipeline HTTP API.
//!
//! JSON Endpoints (all require `Authorization: Bearer <token>`):
//! - `POST /api/v1/actions/propose`        submit a tool call for classification
//! - `POST /api/v1/actions/{id}/confirm`   confirm a pending action, with optional feedback
//! - `POST /api/v1/actions/{id}/cancel`    cancel a pending action
//! - `GET  /api/v1/actions/pending`        caller's open actions
//! - `GET  /api/v1/actions/history`        caller's recent history (`?limit=`)
//! - `GET  /api/v1/actions/stream`         server-sent change events for the caller
//!
//! Pipeline rejections are answered with `200` and `{ "success": false, ... }`.
//! Only authentication, malformed input and infrastructure failures use
//! error status codes.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use actgate_agent::llm::ToolCall;
use actgate_agent::{AgentRuntime, ExecutionOutcome, ProposalOutcome};
use actgate_core::auth::{TokenError, TokenSigner};
use actgate_core::domain::action::{
    ActionId, ActionRequest, ActionType, PendingAction, PendingActionStatus, RiskLevel,
    TriggerContext, UserId,
};
use actgate_core::domain::history::{ActionHistoryRecord, FeedbackInput};
use actgate_core::errors::{ActionError, ApplicationError, DomainError, InterfaceError};
use actgate_core::realtime::ChangeNotifier;
use async_stream::stream;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
    notifier: ChangeNotifier,
    signer: Arc<TokenSigner>,
}

impl ApiState {
    pub fn new(runtime: Arc<AgentRuntime>, notifier: ChangeNotifier, signer: Arc<TokenSigner>) -> Self {
        Self { runtime, notifier, signer }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ProposeRequest {
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub tool_call: Option<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ProposeResponse {
    pub success: bool,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    pub status: PendingActionStatus,
    pub result: ExecutionOutcome,
    pub time_to_decision_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub status: PendingActionStatus,
}

#[derive(Debug, Serialize)]
pub struct PendingListResponse {
    pub success: bool,
    pub actions: Vec<PendingAction>,
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub success: bool,
    pub records: Vec<ActionHistoryRecord>,
}

/// Rejection of one action, returned as data.
#[derive(Debug, PartialEq, Serialize)]
pub struct ActionFailure {
    pub success: bool,
    pub error: String,
    pub error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PendingActionStatus>,
}

impl From<&ActionError> for ActionFailure {
    fn from(error: &ActionError) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            error_code: error.error_code(),
            status: error.status_hint(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(TokenError),
    Interface(InterfaceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(error) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"success": false, "error": error.to_string(), "error_code": "unauthorized"})),
            )
                .into_response(),
            Self::Interface(error) => {
                let (status, code) = match &error {
                    InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
                    InterfaceError::ServiceUnavailable { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
                    }
                    InterfaceError::Internal { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                    }
                };
                (
                    status,
                    Json(json!({
                        "success": false,
                        "error": error.user_message(),
                        "detail": error.to_string(),
                        "error_code": code,
                        "correlation_id": error.correlation_id(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/actions/propose", post(propose))
        .route("/api/v1/actions/pending", get(list_pending))
        .route("/api/v1/actions/history", get(list_history))
        .route("/api/v1/actions/stream", get(stream_changes))
        .route("/api/v1/actions/{id}/confirm", post(confirm))
        .route("/api/v1/actions/{id}/cancel", post(cancel))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn propose(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = correlation_id();
    let user_id = match authenticate(&state, &headers) {
        Ok(user_id) => user_id,
        Err(error) => return error.into_response(),
    };
    let result: Result<ProposeResponse, ApplicationError> = async {
        let request: ProposeRequest = parse_body(&body)?;
        let trigger_context = trigger_context(request.context.as_deref())?;
        let outcome = match request.tool_call {
            Some(raw) => {
                let call = ToolCall::from_value(raw)
                    .map_err(|error| ActionError::ValidationFailed(error.to_string()))?;
                state
                    .runtime
                    .handle_tool_call(&user_id, request.session_id, call, trigger_context)
                    .await?
            }
            None => {
                let action_type = request.action_type.ok_or_else(|| {
                    DomainError::InvariantViolation(
                        "either `action_type` or `tool_call` is required".to_string(),
                    )
                })?;
                let mut action = ActionRequest::new(ActionType::parse(&action_type), request.payload);
                if let Some(score) = request.confidence_score {
                    if !(0.0..=1.0).contains(&score) {
                        return Err(ActionError::ValidationFailed(format!(
                            "confidence score must be between 0 and 1, got {score}"
                        ))
                        .into());
                    }
                    action = action.with_confidence(score);
                }
                state.runtime.propose(&user_id, request.session_id, action, trigger_context).await?
            }
        };
        Ok(ProposeResponse::from(outcome))
    }
    .await;

    respond(result, &correlation_id)
}

pub async fn confirm(
    State(state): State<ApiState>,
    Path(action_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id();
    let user_id = match authenticate(&state, &headers) {
        Ok(user_id) => user_id,
        Err(error) => return error.into_response(),
    };
    let result: Result<ConfirmResponse, ApplicationError> = async {
        let request: ConfirmRequest = parse_body(&body)?;
        let feedback = FeedbackInput { rating: request.rating, comment: request.comment };
        let receipt = state.runtime.confirm(&ActionId(action_id), &user_id, feedback).await?;
        Ok(ConfirmResponse {
            success: true,
            message: receipt
                .outcome
                .message
                .clone()
                .unwrap_or_else(|| "Action executed".to_string()),
            status: receipt.action.status,
            result: receipt.outcome,
            time_to_decision_ms: receipt.time_to_decision_ms,
        })
    }
    .await;

    respond(result, &correlation_id)
}

pub async fn cancel(
    State(state): State<ApiState>,
    Path(action_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id();
    let user_id = match authenticate(&state, &headers) {
        Ok(user_id) => user_id,
        Err(error) => return error.into_response(),
    };
    let result: Result<CancelResponse, ApplicationError> = async {
        let request: CancelRequest = parse_body(&body)?;
        let cancelled =
            state.runtime.cancel(&ActionId(action_id), &user_id, request.reason.as_deref()).await?;
        Ok(CancelResponse { success: true, status: cancelled.status })
    }
    .await;

    respond(result, &correlation_id)
}

pub async fn list_pending(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let correlation_id = correlation_id();
    let user_id = match authenticate(&state, &headers) {
        Ok(user_id) => user_id,
        Err(error) => return error.into_response(),
    };
    let result = state
        .runtime
        .list_pending(&user_id)
        .await
        .map(|actions| PendingListResponse { success: true, actions });

    respond(result, &correlation_id)
}

pub async fn list_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Response {
    let correlation_id = correlation_id();
    let user_id = match authenticate(&state, &headers) {
        Ok(user_id) => user_id,
        Err(error) => return error.into_response(),
    };
    let result = state
        .runtime
        .recent_history(&user_id, query.limit)
        .await
        .map(|records| HistoryListResponse { success: true, records });

    respond(result, &correlation_id)
}

pub async fn stream_changes(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user_id = authenticate(&state, &headers)?;
    let mut receiver = state.notifier.subscribe(user_id.clone());
    info!(
        event_name = "system.realtime.subscribed",
        user_id = %user_id,
        subscribers = state.notifier.subscriber_count(),
        "change stream opened"
    );

    let stream = stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => match Event::default().event(event.kind.name()).json_data(&event) {
                    Ok(frame) => yield Ok(frame),
                    Err(error) => {
                        warn!(
                            event_name = "system.realtime.encode_failed",
                            error = %error,
                            "change event could not be encoded"
                        );
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    let notice = json!({"skipped": skipped});
                    yield Ok(Event::default().event("lagged").data(notice.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive")))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl From<ProposalOutcome> for ProposeResponse {
    fn from(outcome: ProposalOutcome) -> Self {
        match outcome {
            ProposalOutcome::AwaitingConfirmation { action, prompt } => Self {
                success: true,
                requires_confirmation: true,
                action_id: Some(action.id.0),
                message: prompt,
                risk_level: Some(action.risk_level),
                expires_at: Some(action.expires_at),
                result: None,
                error: None,
            },
            ProposalOutcome::Executed { outcome, history } => Self {
                success: outcome.success,
                requires_confirmation: false,
                action_id: None,
                message: outcome
                    .message
                    .clone()
                    .or_else(|| outcome.error.clone())
                    .unwrap_or_default(),
                risk_level: history.risk_level,
                expires_at: None,
                error: outcome.error.clone(),
                result: Some(outcome),
            },
        }
    }
}

fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    state.signer.verify_header(header).map_err(|error| {
        warn!(
            event_name = "system.auth.rejected",
            reason = %error,
            "request rejected by bearer authentication"
        );
        ApiError::Unauthorized(error)
    })
}

fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApplicationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|error| {
        ApplicationError::Domain(DomainError::InvariantViolation(format!(
            "request body is not valid JSON: {error}"
        )))
    })
}

fn trigger_context(raw: Option<&str>) -> Result<TriggerContext, ApplicationError> {
    match raw.map(TriggerContext::parse) {
        None => Ok(TriggerContext::Chat),
        Some(Some(TriggerContext::Confirmation)) | Some(None) => {
            Err(DomainError::InvariantViolation(format!(
                "unsupported context `{}` (expected chat|live_voice)",
                raw.unwrap_or_default()
            ))
            .into())
        }
        Some(Some(context)) => Ok(context),
    }
}

fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn respond<T: Serialize>(result: Result<T, ApplicationError>, correlation_id: &str) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(ApplicationError::Action(error)) => {
            (StatusCode::OK, Json(ActionFailure::from(&error))).into_response()
        }
        Err(error) => {
            warn!(
                event_name = "system.api.request_failed",
                correlation_id,
                error = %error,
                "request failed"
            );
            ApiError::Interface(error.into_interface(correlation_id)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actgate_agent::services::{RecordingServices, ServiceRegistry};
    use actgate_agent::{ActionExecutor, AgentRuntime, PipelineStores};
    use actgate_core::auth::TokenSigner;
    use actgate_core::clock::ManualClock;
    use actgate_core::confirmation::AutoApproveMode;
    use actgate_core::domain::action::UserId;
    use actgate_core::domain::settings::{TeamId, TeamPolicy};
    use actgate_core::realtime::ChangeNotifier;
    use actgate_db::repositories::SettingsRepository;
    use axum::{
        body::{Body, Bytes},
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, Request, StatusCode},
        response::Response,
    };
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{
        cancel, confirm, list_history, list_pending, propose, router, stream_changes, ApiError,
        ApiState, HistoryQuery,
    };

    const SECRET: &str = "an-api-test-secret-that-is-long-enough";

    struct Harness {
        state: ApiState,
        stores: PipelineStores,
        recorder: Arc<RecordingServices>,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let stores = PipelineStores::in_memory();
        let (registry, recorder) = ServiceRegistry::recording();
        let notifier = ChangeNotifier::default();
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).single().expect("valid date"),
        );
        let runtime = AgentRuntime::new(
            stores.clone(),
            ActionExecutor::new(registry),
            notifier.clone(),
            Arc::new(clock.clone()),
            AutoApproveMode::Literal,
        );
        let signer = TokenSigner::new(SECRET.to_string().into());
        let state = ApiState::new(Arc::new(runtime), notifier, Arc::new(signer));
        Harness { state, stores, recorder, clock }
    }

    fn auth(user: &str) -> HeaderMap {
        let token = TokenSigner::new(SECRET.to_string().into()).issue(&UserId(user.to_string()));
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn sms_body() -> Bytes {
        Bytes::from(
            json!({
                "action_type": "send_sms",
                "payload": {"to": "+15550100", "message": "Running late"},
                "confidence_score": 0.88
            })
            .to_string(),
        )
    }

    async fn stage_sms(h: &Harness) -> String {
        let response = propose(State(h.state.clone()), auth("user-1"), sms_body()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["requires_confirmation"], json!(true));
        body["action_id"].as_str().expect("action id").to_string()
    }

    #[tokio::test]
    async fn propose_stages_high_risk_and_confirm_executes() {
        let h = harness();
        let action_id = stage_sms(&h).await;
        assert!(h.recorder.calls().is_empty());

        let response = confirm(
            State(h.state.clone()),
            Path(action_id.clone()),
            auth("user-1"),
            Bytes::from(r#"{"rating": 4}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["status"], json!("executed"));
        assert_eq!(body["result"]["message_id"], json!("sms-1"));

        let again =
            confirm(State(h.state.clone()), Path(action_id), auth("user-1"), Bytes::new()).await;
        assert_eq!(again.status(), StatusCode::OK);
        let body = body_json(again).await;
        assert_eq!(
            body,
            json!({
                "success": false,
                "error": "already executed",
                "error_code": "already_resolved",
                "status": "executed"
            })
        );
        assert_eq!(h.recorder.calls_for("sms").len(), 1);
    }

    #[tokio::test]
    async fn low_risk_tool_call_runs_immediately() {
        let h = harness();
        let body = Bytes::from(
            json!({
                "tool_call": {"function": {"name": "mark_habit_complete", "arguments": "{\"habit_id\":\"h-1\"}"}},
                "context": "live_voice"
            })
            .to_string(),
        );

        let body = body_json(propose(State(h.state.clone()), auth("user-1"), body).await).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["requires_confirmation"], json!(false));
        assert_eq!(body["risk_level"], json!("low"));

        let history = body_json(
            list_history(State(h.state.clone()), Query(HistoryQuery { limit: None }), auth("user-1"))
                .await,
        )
        .await;
        assert_eq!(history["records"].as_array().map(Vec::len), Some(1));
        assert_eq!(history["records"][0]["trigger_context"], json!("live_voice"));
    }

    #[tokio::test]
    async fn policy_denial_is_data_not_a_transport_error() {
        let h = harness();
        let team = TeamId("team-ops".to_string());
        let mut policy = TeamPolicy::permissive(team.clone());
        policy.allow_send_sms = false;
        h.stores.settings.save_team_policy(policy).await.expect("policy");
        h.stores
            .settings
            .assign_member(&UserId("user-1".to_string()), &team, Utc::now())
            .await
            .expect("member");

        let response = propose(State(h.state.clone()), auth("user-1"), sms_body()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_code"], json!("policy_denied"));

        let pending = body_json(list_pending(State(h.state.clone()), auth("user-1")).await).await;
        assert_eq!(pending["actions"], json!([]));
    }

    #[tokio::test]
    async fn expired_confirm_reports_expired_status() {
        let h = harness();
        let action_id = stage_sms(&h).await;
        h.clock.advance(Duration::minutes(31));

        let body = body_json(
            confirm(State(h.state.clone()), Path(action_id), auth("user-1"), Bytes::new()).await,
        )
        .await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_code"], json!("expired"));
        assert_eq!(body["status"], json!("expired"));
        assert!(h.recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn other_users_cannot_touch_an_action() {
        let h = harness();
        let action_id = stage_sms(&h).await;

        let body = body_json(
            cancel(State(h.state.clone()), Path(action_id.clone()), auth("user-2"), Bytes::new())
                .await,
        )
        .await;
        assert_eq!(body["error_code"], json!("not_found"));

        let body = body_json(
            cancel(
                State(h.state.clone()),
                Path(action_id),
                auth("user-1"),
                Bytes::from(r#"{"reason":"wrong person"}"#),
            )
            .await,
        )
        .await;
        assert_eq!(body, json!({"success": true, "status": "cancelled"}));
    }

    #[tokio::test]
    async fn malformed_input_is_a_bad_request() {
        let h = harness();
        let response =
            propose(State(h.state.clone()), auth("user-1"), Bytes::from("{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = propose(
            State(h.state.clone()),
            auth("user-1"),
            Bytes::from(r#"{"payload": {}}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], json!("bad_request"));
        assert!(body["correlation_id"].as_str().is_some());

        let response = confirm(
            State(h.state.clone()),
            Path("whatever".to_string()),
            auth("user-1"),
            Bytes::from(r#"{"rating": 11}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn router_requires_a_valid_bearer_token() {
        let h = harness();
        let app = router(h.state.clone());

        let missing = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/actions/pending").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let forged = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/actions/pending")
                    .header("authorization", "Bearer user-1.deadbeef")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

        let token = TokenSigner::new(SECRET.to_string().into()).issue(&UserId("user-1".to_string()));
        let ok = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/actions/pending")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn router_routes_confirm_by_path() {
        let h = harness();
        let action_id = stage_sms(&h).await;
        let token = TokenSigner::new(SECRET.to_string().into()).issue(&UserId("user-1".to_string()));

        let response = router(h.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/actions/{action_id}/confirm"))
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], json!("executed"));
    }

    #[tokio::test]
    async fn change_stream_requires_authentication() {
        let h = harness();
        let rejected = stream_changes(State(h.state.clone()), HeaderMap::new()).await;
        assert!(matches!(rejected, Err(ApiError::Unauthorized(_))));

        let before = h.state.notifier.subscriber_count();
        let accepted = stream_changes(State(h.state.clone()), auth("user-1")).await;
        assert!(accepted.is_ok());
        assert_eq!(h.state.notifier.subscriber_count(), before + 1);
    }
}
