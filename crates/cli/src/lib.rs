pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tiller",
    about = "Tiller operator CLI",
    long_about = "Operate the tiller agent engine: migrations, demo fixtures, scheduled \
                  executor ticks, config inspection, and readiness checks.",
    after_help = "Examples:\n  tiller migrate\n  tiller tick --org org-demo\n  tiller doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo fixtures for one organization")]
    Seed,
    #[command(
        about = "Run one executor pass for an organization (the scheduled batch entry point)"
    )]
    Tick {
        #[arg(long, help = "Organization id to run the pass for")]
        org: String,
    },
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config,
    #[command(about = "Validate config, database connectivity, and advisory readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Tick { org } => commands::tick::run(&org),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
