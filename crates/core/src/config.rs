//! Layered configuration: built-in defaults, then `replyguard.toml`, then
//! `REPLYGUARD_*` environment variables, then programmatic overrides.
//!
//! Every layer is expressed as a [`ConfigPatch`] so there is exactly one merge path.

use std::env;
use std::fmt::Display;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::thresholds::DecisionThresholds;

const ENV_PREFIX: &str = "REPLYGUARD_";
const DEFAULT_FILE_LOCATIONS: [&str; 2] = ["replyguard.toml", "config/replyguard.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub sentiment: SentimentConfig,
    pub dispatch: DispatchConfig,
    pub server: ServerConfig,
    pub thresholds: DecisionThresholds,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Classifier backend. `api_key` is required for hosted providers, `base_url` for ollama.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Remote sentiment scorer. Disabled means the override never fires.
#[derive(Clone, Debug)]
pub struct SentimentConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

/// Outbound mail relay. Replies are POSTed as JSON to `webhook_url`.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub webhook_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }

    fn is_hosted(self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::OpenAi, Self::Anthropic, Self::Ollama]
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("expected openai|anthropic|ollama, got `{value}`"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("expected compact|pretty|json, got `{value}`")),
        }
    }
}

/// Highest-precedence layer, set by callers such as tests and the CLI.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub sentiment_enabled: Option<bool>,
    pub dispatch_webhook_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` is referenced in the config file but not set in the environment")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` opened in the config file without a closing `}}`")]
    UnterminatedInterpolation,
    #[error("environment variable `{key}` has an unusable value `{value}`: {reason}")]
    InvalidEnvOverride { key: String, value: String, reason: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://replyguard.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            sentiment: SentimentConfig {
                enabled: false,
                endpoint: None,
                api_key: None,
                timeout_secs: 10,
            },
            dispatch: DispatchConfig { webhook_url: None, api_key: None, timeout_secs: 15 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            thresholds: DecisionThresholds::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.merge(read_patch(&path)?),
            None if options.require_file => {
                let expected = options
                    .config_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_LOCATIONS[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.merge(ConfigPatch::from_env()?);
        config.merge(options.overrides.into());
        config.validate()?;

        Ok(config)
    }

    fn merge(&mut self, patch: ConfigPatch) {
        let ConfigPatch { database, llm, sentiment, dispatch, server, thresholds, logging } = patch;
        if let Some(database) = database {
            database.apply(&mut self.database);
        }
        if let Some(llm) = llm {
            llm.apply(&mut self.llm);
        }
        if let Some(sentiment) = sentiment {
            sentiment.apply(&mut self.sentiment);
        }
        if let Some(dispatch) = dispatch {
            dispatch.apply(&mut self.dispatch);
        }
        if let Some(server) = server {
            server.apply(&mut self.server);
        }
        if let Some(thresholds) = thresholds {
            thresholds.apply(&mut self.thresholds);
        }
        if let Some(logging) = logging {
            logging.apply(&mut self.logging);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_database()?;
        self.validate_llm()?;
        self.validate_integrations()?;
        self.validate_server()?;
        self.validate_thresholds()?;

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(invalid("logging.level must be one of trace|debug|info|warn|error"));
        }

        Ok(())
    }

    fn validate_database(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        let is_sqlite = ["sqlite://", "sqlite::"].iter().any(|scheme| url.starts_with(scheme))
            || url == ":memory:";
        if !is_sqlite {
            return Err(invalid(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections must be at least 1"));
        }
        within("database.timeout_secs", self.database.timeout_secs, 1..=300)
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        within("llm.timeout_secs", llm.timeout_secs, 1..=300)?;

        if llm.provider.is_hosted() && blank_secret(llm.api_key.as_ref()) {
            return Err(invalid(format!(
                "llm.api_key must be set when llm.provider is {}",
                llm.provider.as_str()
            )));
        }
        if !llm.provider.is_hosted() && blank(llm.base_url.as_deref()) {
            return Err(invalid("llm.base_url must be set when llm.provider is ollama"));
        }

        Ok(())
    }

    fn validate_integrations(&self) -> Result<(), ConfigError> {
        within("sentiment.timeout_secs", self.sentiment.timeout_secs, 1..=120)?;
        within("dispatch.timeout_secs", self.dispatch.timeout_secs, 1..=120)?;

        if self.sentiment.enabled {
            if blank(self.sentiment.endpoint.as_deref()) {
                return Err(invalid("sentiment.enabled requires sentiment.endpoint"));
            }
            http_url("sentiment.endpoint", self.sentiment.endpoint.as_deref())?;
        }
        http_url("dispatch.webhook_url", self.dispatch.webhook_url.as_deref())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must not be 0"));
        }
        if self.server.graceful_shutdown_secs == 0 {
            return Err(invalid("server.graceful_shutdown_secs must be at least 1"));
        }
        Ok(())
    }

    fn validate_thresholds(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("escalation_confidence", t.escalation_confidence),
            ("general_rule_fallback_confidence", t.general_rule_fallback_confidence),
            ("sentiment_urgent_negative", t.sentiment_urgent_negative),
            ("sentiment_urgent_confidence", t.sentiment_urgent_confidence),
            ("sentiment_high_negative", t.sentiment_high_negative),
            ("sentiment_high_confidence", t.sentiment_high_confidence),
            ("low_confidence_high_priority", t.low_confidence_high_priority),
        ] {
            within(&format!("thresholds.{name}"), u64::from(value), 0..=100)?;
        }

        if t.low_confidence_high_priority > t.escalation_confidence {
            return Err(invalid(
                "thresholds.low_confidence_high_priority must not exceed thresholds.escalation_confidence",
            ));
        }
        Ok(())
    }
}

/// The file `AppConfig::load` would read: the explicit path if it exists, else the first default location found.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => DEFAULT_FILE_LOCATIONS.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let expanded = expand_env_references(&raw)?;
    toml::from_str(&expanded)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of the environment variable `NAME`.
fn expand_env_references(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after_open[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        output.push_str(&value);
        rest = &after_open[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn within(key: &str, value: u64, range: RangeInclusive<u64>) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{key} must be in range {}..={}", range.start(), range.end())))
    }
}

fn http_url(key: &str, value: Option<&str>) -> Result<(), ConfigError> {
    match value {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            Err(invalid(format!("{key} must start with http:// or https://")))
        }
        _ => Ok(()),
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

fn blank_secret(value: Option<&SecretString>) -> bool {
    value.map_or(true, |secret| secret.expose_secret().trim().is_empty())
}

/// Reads `REPLYGUARD_{name}`; blank values count as unset.
fn env_string(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}")).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env_string(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|error| ConfigError::InvalidEnvOverride {
                key: format!("{ENV_PREFIX}{name}"),
                value: value.clone(),
                reason: error.to_string(),
            })
        })
        .transpose()
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn set_secret(slot: &mut Option<SecretString>, value: Option<String>) {
    if let Some(value) = value {
        *slot = Some(SecretString::from(value));
    }
}

/// One configuration layer. Absent keys leave the lower layer's value untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    sentiment: Option<SentimentPatch>,
    dispatch: Option<DispatchPatch>,
    server: Option<ServerPatch>,
    thresholds: Option<ThresholdsPatch>,
    logging: Option<LoggingPatch>,
}

impl ConfigPatch {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: Some(DatabasePatch {
                url: env_string("DATABASE_URL"),
                max_connections: env_parsed("DATABASE_MAX_CONNECTIONS")?,
                timeout_secs: env_parsed("DATABASE_TIMEOUT_SECS")?,
            }),
            llm: Some(LlmPatch {
                provider: env_parsed("LLM_PROVIDER")?,
                api_key: env_string("LLM_API_KEY"),
                base_url: env_string("LLM_BASE_URL"),
                model: env_string("LLM_MODEL"),
                timeout_secs: env_parsed("LLM_TIMEOUT_SECS")?,
                max_retries: env_parsed("LLM_MAX_RETRIES")?,
            }),
            sentiment: Some(SentimentPatch {
                enabled: env_parsed("SENTIMENT_ENABLED")?,
                endpoint: env_string("SENTIMENT_ENDPOINT"),
                api_key: env_string("SENTIMENT_API_KEY"),
                timeout_secs: env_parsed("SENTIMENT_TIMEOUT_SECS")?,
            }),
            dispatch: Some(DispatchPatch {
                webhook_url: env_string("DISPATCH_WEBHOOK_URL"),
                api_key: env_string("DISPATCH_API_KEY"),
                timeout_secs: env_parsed("DISPATCH_TIMEOUT_SECS")?,
            }),
            server: Some(ServerPatch {
                bind_address: env_string("SERVER_BIND_ADDRESS"),
                port: env_parsed("SERVER_PORT")?,
                graceful_shutdown_secs: env_parsed("SERVER_GRACEFUL_SHUTDOWN_SECS")?,
            }),
            thresholds: Some(ThresholdsPatch {
                escalation_confidence: env_parsed("THRESHOLDS_ESCALATION_CONFIDENCE")?,
                general_rule_fallback_confidence: env_parsed(
                    "THRESHOLDS_GENERAL_RULE_FALLBACK_CONFIDENCE",
                )?,
                ..ThresholdsPatch::default()
            }),
            logging: Some(LoggingPatch {
                level: env_string("LOGGING_LEVEL").or_else(|| env_string("LOG_LEVEL")),
                format: match env_parsed::<LogFormat>("LOGGING_FORMAT")? {
                    Some(format) => Some(format),
                    None => env_parsed("LOG_FORMAT")?,
                },
            }),
        })
    }
}

impl From<ConfigOverrides> for ConfigPatch {
    fn from(overrides: ConfigOverrides) -> Self {
        Self {
            database: Some(DatabasePatch { url: overrides.database_url, ..DatabasePatch::default() }),
            llm: Some(LlmPatch {
                provider: overrides.llm_provider,
                model: overrides.llm_model,
                api_key: overrides.llm_api_key,
                ..LlmPatch::default()
            }),
            sentiment: Some(SentimentPatch {
                enabled: overrides.sentiment_enabled,
                ..SentimentPatch::default()
            }),
            dispatch: Some(DispatchPatch {
                webhook_url: overrides.dispatch_webhook_url,
                ..DispatchPatch::default()
            }),
            server: Some(ServerPatch { port: overrides.server_port, ..ServerPatch::default() }),
            thresholds: None,
            logging: Some(LoggingPatch { level: overrides.log_level, format: None }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

impl DatabasePatch {
    fn apply(self, target: &mut DatabaseConfig) {
        set(&mut target.url, self.url);
        set(&mut target.max_connections, self.max_connections);
        set(&mut target.timeout_secs, self.timeout_secs);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

impl LlmPatch {
    fn apply(self, target: &mut LlmConfig) {
        set(&mut target.provider, self.provider);
        set_secret(&mut target.api_key, self.api_key);
        set_some(&mut target.base_url, self.base_url);
        set(&mut target.model, self.model);
        set(&mut target.timeout_secs, self.timeout_secs);
        set(&mut target.max_retries, self.max_retries);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SentimentPatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

impl SentimentPatch {
    fn apply(self, target: &mut SentimentConfig) {
        set(&mut target.enabled, self.enabled);
        set_some(&mut target.endpoint, self.endpoint);
        set_secret(&mut target.api_key, self.api_key);
        set(&mut target.timeout_secs, self.timeout_secs);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispatchPatch {
    webhook_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

impl DispatchPatch {
    fn apply(self, target: &mut DispatchConfig) {
        set_some(&mut target.webhook_url, self.webhook_url);
        set_secret(&mut target.api_key, self.api_key);
        set(&mut target.timeout_secs, self.timeout_secs);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

impl ServerPatch {
    fn apply(self, target: &mut ServerConfig) {
        set(&mut target.bind_address, self.bind_address);
        set(&mut target.port, self.port);
        set(&mut target.graceful_shutdown_secs, self.graceful_shutdown_secs);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdsPatch {
    escalation_confidence: Option<u8>,
    general_rule_fallback_confidence: Option<u8>,
    sentiment_urgent_negative: Option<u8>,
    sentiment_urgent_confidence: Option<u8>,
    sentiment_high_negative: Option<u8>,
    sentiment_high_confidence: Option<u8>,
    low_confidence_high_priority: Option<u8>,
}

impl ThresholdsPatch {
    fn apply(self, target: &mut DecisionThresholds) {
        set(&mut target.escalation_confidence, self.escalation_confidence);
        set(&mut target.general_rule_fallback_confidence, self.general_rule_fallback_confidence);
        set(&mut target.sentiment_urgent_negative, self.sentiment_urgent_negative);
        set(&mut target.sentiment_urgent_confidence, self.sentiment_urgent_confidence);
        set(&mut target.sentiment_high_negative, self.sentiment_high_negative);
        set(&mut target.sentiment_high_confidence, self.sentiment_high_confidence);
        set(&mut target.low_confidence_high_priority, self.low_confidence_high_priority);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl LoggingPatch {
    fn apply(self, target: &mut LoggingConfig) {
        set(&mut target.level, self.level);
        set(&mut target.format, self.format);
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;

    use super::{
        expand_env_references, AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    /// Loads config with `vars` set and, when given, `toml` written to a temp file.
    /// Every `REPLYGUARD_*` variable is cleared first so tests stay independent.
    fn load_with(
        vars: &[(&str, &str)],
        toml: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<AppConfig, ConfigError> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let stale: Vec<String> =
            env::vars().map(|(key, _)| key).filter(|key| key.starts_with("REPLYGUARD_")).collect();
        for key in &stale {
            env::remove_var(key);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = toml.map(|contents| {
            let path = dir.path().join("replyguard.toml");
            fs::write(&path, contents).expect("write config");
            path
        });
        let result = AppConfig::load(LoadOptions { config_path, overrides, ..LoadOptions::default() });

        for (key, _) in vars {
            env::remove_var(key);
        }
        result
    }

    #[test]
    fn defaults_are_valid_and_carry_decision_constants() {
        let config = AppConfig::default();
        config.validate().expect("defaults validate");

        assert_eq!(config.thresholds.escalation_confidence, 60);
        assert_eq!(config.thresholds.general_rule_fallback_confidence, 70);
        assert!(!config.sentiment.enabled);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
    }

    #[test]
    fn env_references_expand_inside_the_file() {
        let config = load_with(
            &[("REPLYGUARD_TEST_LLM_KEY", "sk-from-env")],
            Some("[llm]\nprovider = \"openai\"\napi_key = \"${REPLYGUARD_TEST_LLM_KEY}\"\nmodel = \"gpt-4o-mini\"\n"),
            ConfigOverrides::default(),
        )
        .expect("config loads");

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string()).as_deref(), Some("sk-from-env"));
    }

    #[test]
    fn env_reference_expansion_reports_bad_input() {
        assert_eq!(expand_env_references("plain = 1").expect("no references"), "plain = 1");
        assert!(matches!(
            expand_env_references("key = \"${UNTERMINATED\""),
            Err(ConfigError::UnterminatedInterpolation)
        ));

        let error = load_with(
            &[],
            Some("[dispatch]\nwebhook_url = \"${REPLYGUARD_TEST_ABSENT}\"\n"),
            ConfigOverrides::default(),
        )
        .expect_err("missing variable must fail");
        assert!(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "REPLYGUARD_TEST_ABSENT")
        );
    }

    #[test]
    fn layers_apply_in_order_default_file_env_override() {
        let config = load_with(
            &[("REPLYGUARD_DATABASE_URL", "sqlite://from-env.db"), ("REPLYGUARD_SERVER_PORT", "9191")],
            Some("[database]\nurl = \"sqlite://from-file.db\"\n\n[server]\nport = 7070\nbind_address = \"0.0.0.0\"\n\n[logging]\nlevel = \"warn\"\n"),
            ConfigOverrides {
                database_url: Some("sqlite://from-override.db".to_string()),
                log_level: Some("debug".to_string()),
                ..ConfigOverrides::default()
            },
        )
        .expect("config loads");

        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.graceful_shutdown_secs, 15);
    }

    #[test]
    fn logging_accepts_short_env_aliases() {
        let config = load_with(
            &[("REPLYGUARD_LOG_LEVEL", "warn"), ("REPLYGUARD_LOG_FORMAT", "pretty")],
            None,
            ConfigOverrides::default(),
        )
        .expect("config loads");

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn unparsable_env_value_names_the_variable() {
        let error = load_with(&[("REPLYGUARD_SERVER_PORT", "eighty")], None, ConfigOverrides::default())
            .expect_err("non-numeric port must fail");

        match error {
            ConfigError::InvalidEnvOverride { key, value, .. } => {
                assert_eq!(key, "REPLYGUARD_SERVER_PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn thresholds_section_overrides_only_named_constants() {
        let config = load_with(
            &[],
            Some("[thresholds]\nescalation_confidence = 65\ngeneral_rule_fallback_confidence = 75\n"),
            ConfigOverrides::default(),
        )
        .expect("config loads");

        assert_eq!(config.thresholds.escalation_confidence, 65);
        assert_eq!(config.thresholds.general_rule_fallback_confidence, 75);
        assert_eq!(config.thresholds.sentiment_urgent_negative, 75);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let error = load_with(&[], Some("[thresholds]\nescalation_confidence = 140\n"), ConfigOverrides::default())
            .expect_err("threshold above 100 must fail");

        assert!(
            matches!(error, ConfigError::Validation(ref message) if message.contains("thresholds.escalation_confidence"))
        );
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let error = load_with(&[], Some("[dispatch]\nwebhook = \"https://typo.example\"\n"), ConfigOverrides::default())
            .expect_err("typo must fail");

        assert!(matches!(error, ConfigError::ParseFile { .. }));
    }

    #[test]
    fn enabled_sentiment_requires_endpoint() {
        let error = load_with(&[("REPLYGUARD_SENTIMENT_ENABLED", "true")], None, ConfigOverrides::default())
            .expect_err("missing endpoint must fail");

        assert!(matches!(error, ConfigError::Validation(ref message) if message.contains("sentiment.endpoint")));
    }

    #[test]
    fn hosted_llm_requires_api_key() {
        let error = load_with(
            &[],
            None,
            ConfigOverrides { llm_provider: Some(LlmProvider::Anthropic), ..ConfigOverrides::default() },
        )
        .expect_err("anthropic without api key must fail");

        assert!(matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")));
    }

    #[test]
    fn required_file_must_exist() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist/replyguard.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("missing file must fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let config = load_with(
            &[
                ("REPLYGUARD_LLM_API_KEY", "sk-secret-value"),
                ("REPLYGUARD_DISPATCH_API_KEY", "relay-secret-value"),
            ],
            None,
            ConfigOverrides::default(),
        )
        .expect("config loads");
        let debug = format!("{config:?}");

        assert!(!debug.contains("sk-secret-value"));
        assert!(!debug.contains("relay-secret-value"));
    }
}
