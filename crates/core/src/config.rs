use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confirmation::AutoApproveMode;

pub const MIN_TOKEN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub agent: AgentConfig,
    pub realtime: RealtimeConfig,
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub token_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub auto_approve_mode: AutoApproveMode,
    /// Zero disables the background sweeper; expiry stays lazy.
    pub sweep_interval_secs: u64,
    /// Resolved pending rows older than this are deleted by the sweeper.
    pub retention_days: u32,
}

#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    pub channel_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct ServicesConfig {
    /// Without a base URL every downstream call is recorded instead of sent.
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub port: Option<u16>,
    pub token_secret: Option<String>,
    pub auto_approve_mode: Option<AutoApproveMode>,
    pub services_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://actgate.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig { token_secret: String::new().into() },
            agent: AgentConfig {
                auto_approve_mode: AutoApproveMode::default(),
                sweep_interval_secs: 0,
                retention_days: 30,
            },
            realtime: RealtimeConfig { channel_capacity: 256 },
            services: ServicesConfig { base_url: None, api_key: None, timeout_secs: 10 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("actgate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(token_secret) = auth.token_secret {
                self.auth.token_secret = secret_value(token_secret);
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(auto_approve_mode) = agent.auto_approve_mode {
                self.agent.auto_approve_mode = auto_approve_mode;
            }
            if let Some(sweep_interval_secs) = agent.sweep_interval_secs {
                self.agent.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(retention_days) = agent.retention_days {
                self.agent.retention_days = retention_days;
            }
        }

        if let Some(realtime) = patch.realtime {
            if let Some(channel_capacity) = realtime.channel_capacity {
                self.realtime.channel_capacity = channel_capacity;
            }
        }

        if let Some(services) = patch.services {
            if let Some(base_url) = services.base_url {
                self.services.base_url = Some(base_url);
            }
            if let Some(api_key) = services.api_key {
                self.services.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = services.timeout_secs {
                self.services.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ACTGATE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ACTGATE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ACTGATE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ACTGATE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ACTGATE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ACTGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ACTGATE_SERVER_PORT") {
            self.server.port = parse_u16("ACTGATE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ACTGATE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ACTGATE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ACTGATE_AUTH_TOKEN_SECRET") {
            self.auth.token_secret = secret_value(value);
        }

        if let Some(value) = read_env("ACTGATE_AGENT_AUTO_APPROVE_MODE") {
            self.agent.auto_approve_mode = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "ACTGATE_AGENT_AUTO_APPROVE_MODE".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("ACTGATE_AGENT_SWEEP_INTERVAL_SECS") {
            self.agent.sweep_interval_secs =
                parse_u64("ACTGATE_AGENT_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("ACTGATE_AGENT_RETENTION_DAYS") {
            self.agent.retention_days = parse_u32("ACTGATE_AGENT_RETENTION_DAYS", &value)?;
        }

        if let Some(value) = read_env("ACTGATE_REALTIME_CHANNEL_CAPACITY") {
            self.realtime.channel_capacity =
                parse_usize("ACTGATE_REALTIME_CHANNEL_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("ACTGATE_SERVICES_BASE_URL") {
            self.services.base_url = Some(value);
        }
        if let Some(value) = read_env("ACTGATE_SERVICES_API_KEY") {
            self.services.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ACTGATE_SERVICES_TIMEOUT_SECS") {
            self.services.timeout_secs = parse_u64("ACTGATE_SERVICES_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("ACTGATE_LOGGING_LEVEL").or_else(|| read_env("ACTGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ACTGATE_LOGGING_FORMAT").or_else(|| read_env("ACTGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(token_secret) = overrides.token_secret {
            self.auth.token_secret = secret_value(token_secret);
        }
        if let Some(auto_approve_mode) = overrides.auto_approve_mode {
            self.agent.auto_approve_mode = auto_approve_mode;
        }
        if let Some(base_url) = overrides.services_base_url {
            self.services.base_url = Some(base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_agent(&self.agent)?;
        validate_realtime(&self.realtime)?;
        validate_services(&self.services)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("actgate.toml"), PathBuf::from("config/actgate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let secret = auth.token_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.token_secret is required. Set ACTGATE_AUTH_TOKEN_SECRET or [auth].token_secret"
                .to_string(),
        ));
    }
    if secret.len() < MIN_TOKEN_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "auth.token_secret must be at least {MIN_TOKEN_SECRET_LEN} characters"
        )));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.sweep_interval_secs > 0 && agent.retention_days == 0 {
        return Err(ConfigError::Validation(
            "agent.retention_days must be greater than zero when the sweeper is enabled"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_realtime(realtime: &RealtimeConfig) -> Result<(), ConfigError> {
    if realtime.channel_capacity == 0 || realtime.channel_capacity > 65_536 {
        return Err(ConfigError::Validation(
            "realtime.channel_capacity must be in range 1..=65536".to_string(),
        ));
    }

    Ok(())
}

fn validate_services(services: &ServicesConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &services.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "services.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if services.timeout_secs == 0 || services.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "services.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    agent: Option<AgentPatch>,
    realtime: Option<RealtimePatch>,
    services: Option<ServicesPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    token_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    auto_approve_mode: Option<AutoApproveMode>,
    sweep_interval_secs: Option<u64>,
    retention_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RealtimePatch {
    channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicesPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
