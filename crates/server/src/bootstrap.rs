use std::sync::Arc;

use actgate_agent::services::ServiceRegistry;
use actgate_agent::{ActionExecutor, AgentRuntime, ExpirySweeper, PipelineStores};
use actgate_core::auth::TokenSigner;
use actgate_core::clock::{Clock, SystemClock};
use actgate_core::config::{AppConfig, ConfigError};
use actgate_core::realtime::ChangeNotifier;
use actgate_db::repositories::{
    SqlActionFeedbackRepository, SqlActionHistoryRepository, SqlPendingActionRepository,
    SqlSettingsRepository,
};
use actgate_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::ApiState;
use crate::services::HttpServiceGateway;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub notifier: ChangeNotifier,
    pub signer: Arc<TokenSigner>,
    /// Present only when `agent.sweep_interval_secs` is non-zero.
    pub sweeper: Option<ExpirySweeper>,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState::new(self.runtime.clone(), self.notifier.clone(), self.signer.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("service client construction failed: {0}")]
    Services(#[source] reqwest::Error),
}

#[cfg(test)]
pub async fn bootstrap(
    options: actgate_core::config::LoadOptions,
) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let stores = PipelineStores {
        pending: Arc::new(SqlPendingActionRepository::new(db_pool.clone())),
        history: Arc::new(SqlActionHistoryRepository::new(db_pool.clone())),
        feedback: Arc::new(SqlActionFeedbackRepository::new(db_pool.clone())),
        settings: Arc::new(SqlSettingsRepository::new(db_pool.clone())),
    };

    let services = match config.services.base_url.as_deref() {
        Some(base_url) => {
            let gateway = HttpServiceGateway::new(
                base_url,
                config.services.api_key.clone(),
                config.services.timeout_secs,
            )
            .map_err(BootstrapError::Services)?;
            info!(
                event_name = "system.bootstrap.services_configured",
                base_url,
                "side-effect providers configured"
            );
            ServiceRegistry::uniform(Arc::new(gateway))
        }
        None => {
            warn!(
                event_name = "system.bootstrap.services_dry_run",
                "services.base_url is not set; side effects are recorded in memory only"
            );
            ServiceRegistry::recording().0
        }
    };

    let notifier = ChangeNotifier::new(config.realtime.channel_capacity);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runtime = AgentRuntime::new(
        stores.clone(),
        ActionExecutor::new(services),
        notifier.clone(),
        clock.clone(),
        config.agent.auto_approve_mode,
    );

    let sweeper = (config.agent.sweep_interval_secs > 0).then(|| {
        ExpirySweeper::new(
            stores.pending.clone(),
            notifier.clone(),
            clock,
            config.agent.retention_days,
        )
    });

    let signer = Arc::new(TokenSigner::new(config.auth.token_secret.clone()));

    info!(
        event_name = "system.bootstrap.ready",
        auto_approve_mode = ?config.agent.auto_approve_mode,
        sweeper_enabled = sweeper.is_some(),
        "action pipeline assembled"
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime), notifier, signer, sweeper })
}

#[cfg(test)]
mod tests {
    use actgate_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use actgate_core::confirmation::AutoApproveMode;
    use actgate_core::domain::action::{ActionRequest, ActionType, TriggerContext, UserId};
    use actgate_agent::ProposalOutcome;
    use serde_json::{json, Map, Value};

    use crate::bootstrap::{bootstrap, bootstrap_with_config};

    fn options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                token_secret: Some("bootstrap-test-secret-with-enough-length".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_a_short_token_secret() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                token_secret: Some("short".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("auth.token_secret"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_stages_against_sqlite() {
        let mut config = AppConfig::load(options("sqlite::memory:")).expect("config");
        config.database.max_connections = 1;
        let app = bootstrap_with_config(config).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('pending_action', 'action_history', 'action_feedback')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count tables");
        assert_eq!(table_count, 3);
        assert!(app.sweeper.is_none());
        assert_eq!(app.runtime.auto_approve_mode(), AutoApproveMode::Literal);

        let user = UserId("user-1".to_string());
        let outcome = app
            .runtime
            .propose(
                &user,
                None,
                ActionRequest::new(
                    ActionType::SendEmail,
                    payload(json!({"to": "a@example.com", "subject": "Hi", "body": "Hello"})),
                ),
                TriggerContext::Chat,
            )
            .await
            .expect("propose");
        let ProposalOutcome::AwaitingConfirmation { action, .. } = outcome else {
            panic!("email should wait for confirmation");
        };

        let pending = app.runtime.list_pending(&user).await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, action.id);
    }
}
