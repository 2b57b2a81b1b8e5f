use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use replyguard_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One reported setting: dotted key, its env override, and the rendered value.
struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let sources = Sources::detect(options);
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields(&config).iter().map(|field| {
        format!("- {} = {} (source: {})", field.key, field.value, sources.describe(field))
    }));
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let thresholds = &config.thresholds;
    vec![
        Field::new("database.url", "REPLYGUARD_DATABASE_URL", &config.database.url),
        Field::new(
            "database.max_connections",
            "REPLYGUARD_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "REPLYGUARD_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", "REPLYGUARD_LLM_PROVIDER", config.llm.provider.as_str()),
        Field::new("llm.model", "REPLYGUARD_LLM_MODEL", &config.llm.model),
        Field::new("llm.base_url", "REPLYGUARD_LLM_BASE_URL", optional(config.llm.base_url.as_deref())),
        Field::new("llm.api_key", "REPLYGUARD_LLM_API_KEY", redact(config.llm.api_key.as_ref())),
        Field::new(
            "sentiment.enabled",
            "REPLYGUARD_SENTIMENT_ENABLED",
            config.sentiment.enabled.to_string(),
        ),
        Field::new(
            "sentiment.endpoint",
            "REPLYGUARD_SENTIMENT_ENDPOINT",
            optional(config.sentiment.endpoint.as_deref()),
        ),
        Field::new(
            "sentiment.api_key",
            "REPLYGUARD_SENTIMENT_API_KEY",
            redact(config.sentiment.api_key.as_ref()),
        ),
        Field::new(
            "dispatch.webhook_url",
            "REPLYGUARD_DISPATCH_WEBHOOK_URL",
            optional(config.dispatch.webhook_url.as_deref()),
        ),
        Field::new(
            "dispatch.api_key",
            "REPLYGUARD_DISPATCH_API_KEY",
            redact(config.dispatch.api_key.as_ref()),
        ),
        Field::new("server.bind_address", "REPLYGUARD_SERVER_BIND_ADDRESS", &config.server.bind_address),
        Field::new("server.port", "REPLYGUARD_SERVER_PORT", config.server.port.to_string()),
        Field::new(
            "thresholds.escalation_confidence",
            "REPLYGUARD_THRESHOLDS_ESCALATION_CONFIDENCE",
            thresholds.escalation_confidence.to_string(),
        ),
        Field::new(
            "thresholds.general_rule_fallback_confidence",
            "REPLYGUARD_THRESHOLDS_GENERAL_RULE_FALLBACK_CONFIDENCE",
            thresholds.general_rule_fallback_confidence.to_string(),
        ),
        Field::new("logging.level", "REPLYGUARD_LOGGING_LEVEL", &config.logging.level),
        Field::new(
            "logging.format",
            "REPLYGUARD_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

struct Sources {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl Sources {
    fn detect(options: &LoadOptions) -> Self {
        let path = resolve_config_path(options.config_path.as_deref());
        let doc = path.as_deref().and_then(load_config_file_doc);
        Self { path, doc }
    }

    fn describe(&self, field: &Field) -> String {
        if env::var_os(field.env_key).is_some() {
            return format!("env ({})", field.env_key);
        }

        if self.doc.as_ref().is_some_and(|doc| contains_path(doc, field.key)) {
            let file_path = self
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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

fn optional(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

/// Shows at most a four-character prefix of a secret, and only when it is long enough to stay opaque.
fn redact(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let exposed = secret.expose_secret().trim();
    if exposed.is_empty() {
        return "<empty>".to_string();
    }
    if exposed.len() >= 12 && exposed.is_char_boundary(4) {
        return format!("{}***", &exposed[..4]);
    }
    "<redacted>".to_string()
}
