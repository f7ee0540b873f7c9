use actgate_core::config::{AppConfig, LoadOptions};
use actgate_db::{connect_with_settings, migrations, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DATABASE_CHECKS: [&str; 2] = ["database_connectivity", "schema_version"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_services(&config));
            checks.push(check_sweeper(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in DATABASE_CHECKS {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Dry-run services are legal but nothing leaves the process.
fn check_services(config: &AppConfig) -> DoctorCheck {
    match config.services.base_url.as_deref() {
        Some(base_url) => DoctorCheck {
            name: "service_gateway",
            status: CheckStatus::Pass,
            details: format!(
                "side effects are delivered to `{base_url}` (api key {})",
                if config.services.api_key.is_some() { "set" } else { "unset" }
            ),
        },
        None => DoctorCheck {
            name: "service_gateway",
            status: CheckStatus::Warn,
            details: "services.base_url is unset; side effects run in dry-run mode".to_string(),
        },
    }
}

fn check_sweeper(config: &AppConfig) -> DoctorCheck {
    let details = if config.agent.sweep_interval_secs == 0 {
        "disabled; overdue actions expire lazily on read".to_string()
    } else {
        format!(
            "every {}s, retaining resolved rows for {} day(s)",
            config.agent.sweep_interval_secs, config.agent.retention_days
        )
    };
    DoctorCheck { name: "expiry_sweeper", status: CheckStatus::Pass, details }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "schema_version",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let checks = vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            check_schema(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

/// Read-only: doctor never applies migrations.
async fn check_schema(pool: &DbPool) -> DoctorCheck {
    match migrations::current_version(pool).await {
        Ok(Some(version)) => DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Pass,
            details: format!("schema at migration {version}"),
        },
        Ok(None) => DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Fail,
            details: "no migrations applied; run `actgate migrate`".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Fail,
            details: format!("failed to read migration state: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
