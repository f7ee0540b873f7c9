use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use actgate_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

const REDACTED: &str = "<redacted>";
const UNSET: &str = "<unset>";

/// Effective configuration with per-field source attribution. Secrets are
/// never printed.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let token_secret =
        if config.auth.token_secret.expose_secret().is_empty() { UNSET } else { REDACTED };
    let api_key = if config.services.api_key.is_some() { REDACTED } else { UNSET };

    let fields: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("auth.token_secret", token_secret.to_string()),
        ("agent.auto_approve_mode", format!("{:?}", config.agent.auto_approve_mode)),
        ("agent.sweep_interval_secs", config.agent.sweep_interval_secs.to_string()),
        ("agent.retention_days", config.agent.retention_days.to_string()),
        ("realtime.channel_capacity", config.realtime.channel_capacity.to_string()),
        ("services.base_url", config.services.base_url.clone().unwrap_or_else(|| UNSET.to_string())),
        ("services.api_key", api_key.to_string()),
        ("services.timeout_secs", config.services.timeout_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value) in fields {
        let source = field_source(
            key_path,
            &env_key(key_path),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

/// `agent.sweep_interval_secs` -> `ACTGATE_AGENT_SWEEP_INTERVAL_SECS`.
fn env_key(key_path: &str) -> String {
    format!("ACTGATE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    ["actgate.toml", "config/actgate.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    toml::from_str::<Value>(&raw).ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, env_key};

    #[test]
    fn env_keys_follow_the_section_naming() {
        assert_eq!(env_key("database.url"), "ACTGATE_DATABASE_URL");
        assert_eq!(env_key("agent.auto_approve_mode"), "ACTGATE_AGENT_AUTO_APPROVE_MODE");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: Value =
            toml::from_str("[services]\nbase_url = \"http://localhost:9000\"\n").expect("toml");
        assert!(contains_path(&doc, "services.base_url"));
        assert!(!contains_path(&doc, "services.api_key"));
    }
}
