use std::env;
use std::sync::{Mutex, OnceLock};

use actgate_cli::commands::policy::{self, PolicyFlags};
use actgate_cli::commands::{config, doctor, migrate, sweep, token};
use actgate_core::auth::TokenSigner;
use actgate_core::domain::action::UserId;
use serde_json::Value;

const SECRET: &str = "cli-integration-secret-of-sufficient-length";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("ACTGATE_AUTH_TOKEN_SECRET", SECRET), ("ACTGATE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["data"]["schema_version"].is_i64());
    });
}

#[test]
fn migrate_returns_config_failure_without_secret() {
    with_env(&[("ACTGATE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn token_is_accepted_by_a_signer_with_the_same_secret() {
    with_env(&[("ACTGATE_AUTH_TOKEN_SECRET", SECRET)], || {
        let result = token::run("user-42");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let issued = payload["data"]["token"].as_str().expect("token in output");
        let signer = TokenSigner::new(SECRET.to_string().into());
        assert_eq!(signer.verify(issued), Ok(UserId("user-42".to_string())));
        assert!(!result.output.contains(SECRET), "secret must never be printed");
    });
}

#[test]
fn token_rejects_blank_user_id() {
    with_env(&[("ACTGATE_AUTH_TOKEN_SECRET", SECRET)], || {
        let result = token::run("   ");
        assert_eq!(result.exit_code, 7);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn policy_then_member_round_trip_through_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("actgate.db").display());

    with_env(&[("ACTGATE_AUTH_TOKEN_SECRET", SECRET), ("ACTGATE_DATABASE_URL", &url)], || {
        let unknown = policy::assign_member("user-1", "team-ops");
        assert_eq!(unknown.exit_code, 7);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "unknown_team");

        let created = policy::run(
            "team-ops",
            PolicyFlags { allow_sms: Some(false), ..PolicyFlags::default() },
        );
        assert_eq!(created.exit_code, 0);
        let payload = parse_payload(&created.output);
        assert_eq!(payload["data"]["allow_send_sms"], false);
        assert_eq!(payload["data"]["allow_send_email"], true);

        let updated = policy::run(
            "team-ops",
            PolicyFlags { allow_voice: Some(false), ..PolicyFlags::default() },
        );
        let payload = parse_payload(&updated.output);
        assert_eq!(payload["data"]["allow_send_sms"], false, "earlier flags are kept");
        assert_eq!(payload["data"]["allow_voice_calls"], false);

        let assigned = policy::assign_member("user-1", "team-ops");
        assert_eq!(assigned.exit_code, 0);
        assert_eq!(parse_payload(&assigned.output)["data"]["team_id"], "team-ops");
    });
}

#[test]
fn sweep_reports_counts_on_an_empty_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("actgate.db").display());

    with_env(&[("ACTGATE_AUTH_TOKEN_SECRET", SECRET), ("ACTGATE_DATABASE_URL", &url)], || {
        let result = sweep::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["expired"], 0);
        assert_eq!(payload["data"]["purged"], 0);
    });
}

#[test]
fn doctor_reports_config_failure_and_skips_database_checks() {
    with_env(&[], || {
        let report: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks");
        assert_eq!(checks[0]["name"], "config_validation");
        assert!(checks.iter().skip(1).all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn doctor_flags_an_unmigrated_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("fresh.db").display());

    with_env(&[("ACTGATE_AUTH_TOKEN_SECRET", SECRET), ("ACTGATE_DATABASE_URL", &url)], || {
        let report: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        let schema = report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .find(|check| check["name"] == "schema_version")
            .cloned()
            .expect("schema check");
        assert_eq!(schema["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);
        let report: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(report["overall_status"], "pass");
    });
}

#[test]
fn config_output_redacts_secrets() {
    with_env(
        &[
            ("ACTGATE_AUTH_TOKEN_SECRET", SECRET),
            ("ACTGATE_SERVICES_API_KEY", "provider-key-value"),
            ("ACTGATE_SERVICES_BASE_URL", "http://localhost:9000"),
        ],
        || {
            let output = config::run();
            assert!(!output.contains(SECRET));
            assert!(!output.contains("provider-key-value"));
            assert!(output.contains(
                "- auth.token_secret = <redacted> (source: env (ACTGATE_AUTH_TOKEN_SECRET))"
            ));
            assert!(output.contains("- services.base_url = http://localhost:9000"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ACTGATE_DATABASE_URL",
        "ACTGATE_DATABASE_MAX_CONNECTIONS",
        "ACTGATE_DATABASE_TIMEOUT_SECS",
        "ACTGATE_SERVER_BIND_ADDRESS",
        "ACTGATE_SERVER_PORT",
        "ACTGATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ACTGATE_AUTH_TOKEN_SECRET",
        "ACTGATE_AGENT_AUTO_APPROVE_MODE",
        "ACTGATE_AGENT_SWEEP_INTERVAL_SECS",
        "ACTGATE_AGENT_RETENTION_DAYS",
        "ACTGATE_REALTIME_CHANNEL_CAPACITY",
        "ACTGATE_SERVICES_BASE_URL",
        "ACTGATE_SERVICES_API_KEY",
        "ACTGATE_SERVICES_TIMEOUT_SECS",
        "ACTGATE_LOGGING_LEVEL",
        "ACTGATE_LOGGING_FORMAT",
        "ACTGATE_LOG_LEVEL",
        "ACTGATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
