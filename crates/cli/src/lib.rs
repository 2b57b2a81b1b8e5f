pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use replyguard_core::config::LoadOptions;

use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "replyguard",
    version,
    about = "Replyguard operator CLI",
    long_about = "Prepare and inspect a Replyguard deployment: migrations, tenant seeding, config inspection, and readiness checks.",
    after_help = "Examples:\n  replyguard doctor --json\n  replyguard --config deploy/replyguard.toml migrate --status\n  replyguard seed --tenant acme --company-name \"Acme Coffee\""
)]
pub struct Cli {
    /// Config file to read instead of `replyguard.toml` or `config/replyguard.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations, or report their state with --status")]
    Migrate {
        #[arg(long, help = "Only report applied and pending migrations")]
        status: bool,
    },
    #[command(about = "Insert default settings and one automation rule per routable intent for a tenant")]
    Seed {
        #[arg(long, help = "Tenant identifier to seed")]
        tenant: String,
        #[arg(long, help = "Company name used in replies when the tenant has no settings yet")]
        company_name: Option<String>,
    },
    #[command(about = "Print effective configuration with source attribution and redacted secrets")]
    Config,
    #[command(about = "Check config, llm and dispatch readiness, and database state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Command {
    fn execute(self, options: &LoadOptions) -> CommandResult {
        match self {
            Self::Migrate { status: false } => commands::migrate::run(options),
            Self::Migrate { status: true } => commands::migrate::status(options),
            Self::Seed { tenant, company_name } => {
                commands::seed::run(options, &tenant, company_name.as_deref())
            }
            Self::Config => CommandResult { exit_code: 0, output: commands::config::run(options) },
            Self::Doctor { json } => {
                let report = commands::doctor::build_report(options);
                CommandResult {
                    exit_code: if report.passed() { 0 } else { 1 },
                    output: commands::doctor::render(&report, json),
                }
            }
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    let result = cli.command.execute(&options);
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
