use actgate_core::realtime::ChangeNotifier;
use actgate_db::DbPool;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    notifier: ChangeNotifier,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub pending_store: HealthCheck,
    pub realtime: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, notifier: ChangeNotifier) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, notifier })
}

/// Readiness is decided by the database alone. Realtime is informational:
/// zero subscribers is a normal state.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let pending_store = pending_store_check(&state.db_pool).await;
    let ready = database.status == "ready" && pending_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        pending_store,
        realtime: HealthCheck {
            status: "ready",
            detail: format!("{} change stream subscriber(s)", state.notifier.subscriber_count()),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn pending_store_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM pending_action WHERE status = 'pending'",
    )
    .fetch_one(pool)
    .await
    {
        Ok(open) => HealthCheck { status: "ready", detail: format!("{open} open action(s)") },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("pending_action is not readable: {error}"),
        },
    }
}
