use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub advisory: AdvisoryConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Advisory service credentials and tuning. A missing api key is not an
/// error: the engine runs with the advisory boundary in degraded mode.
#[derive(Clone, Debug)]
pub struct AdvisoryConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl AdvisoryConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_ref()
            .map(|key| !key.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub channels: Vec<String>,
    pub slack_webhook_url: Option<SecretString>,
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

pub const KNOWN_CHANNELS: &[&str] = &["slack", "in_app"];

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub advisory_api_key: Option<String>,
    pub advisory_model: Option<String>,
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
                url: "sqlite://tiller.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            advisory: AdvisoryConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            notify: NotifyConfig { channels: vec!["in_app".to_string()], slack_webhook_url: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tiller.toml"));
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

        if let Some(advisory) = patch.advisory {
            if let Some(api_key_value) = advisory.api_key {
                self.advisory.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = advisory.base_url {
                self.advisory.base_url = base_url;
            }
            if let Some(model) = advisory.model {
                self.advisory.model = model;
            }
            if let Some(timeout_secs) = advisory.timeout_secs {
                self.advisory.timeout_secs = timeout_secs;
            }
        }

        if let Some(notify) = patch.notify {
            if let Some(channels) = notify.channels {
                self.notify.channels = channels;
            }
            if let Some(webhook_value) = notify.slack_webhook_url {
                self.notify.slack_webhook_url = Some(secret_value(webhook_value));
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
        if let Some(value) = read_env("TILLER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TILLER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TILLER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TILLER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TILLER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TILLER_ADVISORY_API_KEY") {
            self.advisory.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TILLER_ADVISORY_BASE_URL") {
            self.advisory.base_url = value;
        }
        if let Some(value) = read_env("TILLER_ADVISORY_MODEL") {
            self.advisory.model = value;
        }
        if let Some(value) = read_env("TILLER_ADVISORY_TIMEOUT_SECS") {
            self.advisory.timeout_secs = parse_u64("TILLER_ADVISORY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TILLER_NOTIFY_CHANNELS") {
            self.notify.channels =
                value.split(',').map(|channel| channel.trim().to_string()).collect();
        }
        if let Some(value) = read_env("TILLER_NOTIFY_SLACK_WEBHOOK_URL") {
            self.notify.slack_webhook_url = Some(secret_value(value));
        }

        let log_level = read_env("TILLER_LOGGING_LEVEL").or_else(|| read_env("TILLER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TILLER_LOGGING_FORMAT").or_else(|| read_env("TILLER_LOG_FORMAT"));
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
        if let Some(api_key) = overrides.advisory_api_key {
            self.advisory.api_key = Some(secret_value(api_key));
        }
        if let Some(model) = overrides.advisory_model {
            self.advisory.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_advisory(&self.advisory)?;
        validate_notify(&self.notify)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tiller.toml"), PathBuf::from("config/tiller.toml")]
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

fn validate_advisory(advisory: &AdvisoryConfig) -> Result<(), ConfigError> {
    if advisory.timeout_secs == 0 || advisory.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "advisory.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !advisory.base_url.starts_with("http://") && !advisory.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "advisory.base_url must start with http:// or https://".to_string(),
        ));
    }

    if advisory.model.trim().is_empty() {
        return Err(ConfigError::Validation("advisory.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_notify(notify: &NotifyConfig) -> Result<(), ConfigError> {
    if notify.channels.is_empty() {
        return Err(ConfigError::Validation(
            "notify.channels must name at least one delivery channel".to_string(),
        ));
    }

    for channel in &notify.channels {
        if !KNOWN_CHANNELS.contains(&channel.as_str()) {
            return Err(ConfigError::Validation(format!(
                "notify.channels contains unknown channel `{channel}` (expected one of slack|in_app)"
            )));
        }
    }

    if notify.channels.iter().any(|channel| channel == "slack") {
        let missing = notify
            .slack_webhook_url
            .as_ref()
            .map(|url| url.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "notify.slack_webhook_url is required when the slack channel is enabled"
                    .to_string(),
            ));
        }
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    advisory: Option<AdvisoryPatch>,
    notify: Option<NotifyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AdvisoryPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotifyPatch {
    channels: Option<Vec<String>>,
    slack_webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
