//! # board-aging
//!
//! Command-line aging runner. Repeats board lifecycle rounds for a configured
//! number of hours, logs every case and round, and exits non-zero when any
//! round failed or the harness itself broke.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

mod app;
mod commands;
mod logging;

use board_aging::Verdict;
use commands::{RunArgs, cmd_cases, cmd_run};

/// Aging and regression runner for EEG board SDKs.
#[derive(Parser)]
#[command(name = "board-aging", version, about)]
struct Cli {
    /// Enable verbose logging (set RUST_LOG for fine-grained control)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run lifecycle rounds until the aging duration has passed
    Run(RunArgs),
    /// List the available cases
    Cases,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Cases => {
            cmd_cases();
            ExitCode::SUCCESS
        }
        Command::Run(args) => match cmd_run(args, cli.verbose).await {
            Ok(Verdict::Pass) => ExitCode::SUCCESS,
            Ok(Verdict::Fail) => ExitCode::from(1),
            Err(e) => {
                eprintln!("{} {}", "Error:".red(), e);
                ExitCode::from(2)
            }
        },
    }
}
