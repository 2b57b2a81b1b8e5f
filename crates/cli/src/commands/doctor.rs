use replyguard_core::config::{AppConfig, LlmProvider, LoadOptions};
use replyguard_db::{connect, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    pub fn passed(&self) -> bool {
        self.overall_status != CheckStatus::Fail
    }
}

pub fn render(report: &DoctorReport, json_output: bool) -> String {
    if json_output {
        return serde_json::to_string_pretty(report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(report)
}

pub fn build_report(options: &LoadOptions) -> DoctorReport {
    let checks = match AppConfig::load(options.clone()) {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            check_llm(&config),
            check_dispatch(&config),
            check_database(&config),
        ],
        Err(error) => {
            let mut checks = vec![DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            }];
            for name in ["llm_readiness", "dispatch_readiness", "database_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
            checks
        }
    };

    summarize(checks)
}

fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status != CheckStatus::Pass);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    let target = match config.llm.provider {
        LlmProvider::Ollama => config.llm.base_url.clone().unwrap_or_default(),
        LlmProvider::OpenAi | LlmProvider::Anthropic => "hosted api (key configured)".to_string(),
    };
    DoctorCheck {
        name: "llm_readiness",
        status: CheckStatus::Pass,
        details: format!("{} model `{}` via {target}", config.llm.provider.as_str(), config.llm.model),
    }
}

fn check_dispatch(config: &AppConfig) -> DoctorCheck {
    match &config.dispatch.webhook_url {
        Some(url) => DoctorCheck {
            name: "dispatch_readiness",
            status: CheckStatus::Pass,
            details: format!("replies are posted to {url}"),
        },
        None => DoctorCheck {
            name: "dispatch_readiness",
            status: CheckStatus::Warn,
            details: "dispatch.webhook_url is not set; every automated reply will escalate"
                .to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_readiness",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return DoctorCheck {
                    name: "database_readiness",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                };
            }
        };

        let migration_status = migrations::status(&pool).await;
        pool.close().await;

        match migration_status {
            Ok(status) if status.is_current() => DoctorCheck {
                name: "database_readiness",
                status: CheckStatus::Pass,
                details: format!(
                    "connected using `{}`; {} migrations applied",
                    config.database.url,
                    status.applied.len()
                ),
            },
            Ok(status) => DoctorCheck {
                name: "database_readiness",
                status: CheckStatus::Warn,
                details: format!(
                    "connected, but {} migrations are pending; run `replyguard migrate`",
                    status.pending.len()
                ),
            },
            Err(error) => DoctorCheck {
                name: "database_readiness",
                status: CheckStatus::Fail,
                details: format!("could not read migration state: {error}"),
            },
        }
    })
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
