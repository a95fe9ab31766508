use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Args;
use colored::Colorize;

use board_aging::{
    AgingConfig, AgingLoop, BoardConfig, BoardId, CaseKind, HarnessError, JsonLinesReport,
    RoundExecutor, SyntheticBackend, Verdict,
};

use crate::app::{print_banner, print_pretty_json, print_summary, report_json};
use crate::logging::{self, PanicLogHook};

/// Exit status after a second Ctrl+C (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to board-aging.toml config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Board address (Bluetooth MAC)
    #[arg(long)]
    pub address: Option<String>,

    /// Board SDK identifier
    #[arg(long, allow_negative_numbers = true)]
    pub board_id: Option<i32>,

    /// Aging duration in hours (fractions allowed)
    #[arg(long)]
    pub hours: Option<f64>,

    /// prepare_session timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Secondary board address, enables the two-board cases
    #[arg(long)]
    pub secondary_address: Option<String>,

    /// Secondary board SDK identifier (defaults to the primary's)
    #[arg(long, allow_negative_numbers = true, requires = "secondary_address")]
    pub secondary_board_id: Option<i32>,

    /// Case to run each round; repeat to build the list (see `cases`)
    #[arg(long = "case", value_name = "NAME")]
    pub cases: Vec<CaseKind>,

    /// Write a JSON-lines run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Directory for log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Print the run summary as JSON instead of the colored table
    #[arg(long)]
    pub json: bool,
}

/// Apply command-line flags on top of the loaded config.
pub fn apply_args(config: &mut AgingConfig, args: &RunArgs) {
    if let Some(address) = &args.address {
        config.board.address.clone_from(address);
    }
    if let Some(id) = args.board_id {
        config.board.board_id = BoardId(id);
    }
    if let Some(hours) = args.hours {
        config.aging_hours = hours;
    }
    if let Some(timeout) = args.timeout {
        config.board.timeout_secs = timeout;
    }
    if let Some(address) = &args.secondary_address {
        let board_id = args
            .secondary_board_id
            .map_or(config.board.board_id, BoardId);
        let mut secondary = BoardConfig::new(board_id, address.clone());
        secondary.timeout_secs = config.board.timeout_secs;
        config.secondary = Some(secondary);
    }
    if !args.cases.is_empty() {
        config.cases.clone_from(&args.cases);
    }
    if let Some(dir) = &args.log_dir {
        config.log_dir.clone_from(dir);
    }
}

/// Only the in-process synthetic board ships with this build.
fn check_backend_support(config: &AgingConfig) -> Result<(), HarnessError> {
    let boards = std::iter::once(&config.board).chain(config.secondary.as_ref());
    for board in boards {
        if board.board_id != BoardId::SYNTHETIC {
            return Err(HarnessError::ConfigError {
                reason: format!(
                    "board id {} needs a hardware backend; this build drives the synthetic board ({}) only",
                    board.board_id,
                    BoardId::SYNTHETIC
                ),
            });
        }
    }
    Ok(())
}

/// What a Ctrl+C means at this point of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// First request: stop before the next round.
    FinishRound,
    /// Repeated request: leave now.
    ForceQuit,
}

fn on_interrupt(cancel: &AtomicBool) -> Interrupt {
    if cancel.swap(true, Ordering::SeqCst) {
        Interrupt::ForceQuit
    } else {
        Interrupt::FinishRound
    }
}

/// Load config, run the aging loop on a blocking thread, and print the
/// summary. Ctrl+C stops the run before its next round; a second Ctrl+C
/// exits immediately.
pub async fn cmd_run(args: RunArgs, verbose: bool) -> Result<Verdict, Box<dyn std::error::Error>> {
    let mut config = AgingConfig::discover(args.config.as_deref())?;
    apply_args(&mut config, &args);
    config.validate()?;
    check_backend_support(&config)?;
    let duration = config.aging_duration()?;

    let log_path = logging::init(&config.log_dir, verbose)?;
    let _panic_hook = PanicLogHook::install();
    if !args.json {
        print_banner(&config, duration, &log_path);
    }

    let executor = RoundExecutor::from_config(Arc::new(SyntheticBackend::default()), config);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut aging = AgingLoop::new(executor, duration).with_cancel_flag(Arc::clone(&cancel));
    if let Some(path) = &args.report {
        aging = aging.with_sink(JsonLinesReport::create(path)?);
        tracing::info!(path = %path.display(), "Writing JSON-lines report");
    }

    let signal_flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(&signal_flag) {
                Interrupt::FinishRound => {
                    tracing::warn!("Interrupted, stopping after the current round");
                    eprintln!(
                        "\n{} finishing the current round, then stopping (again to force quit)",
                        "Ctrl+C:".yellow()
                    );
                }
                Interrupt::ForceQuit => {
                    tracing::error!("Interrupted again, exiting without finishing the round");
                    eprintln!("\n{} forced exit", "Ctrl+C:".red());
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        }
    });

    let report = tokio::task::spawn_blocking(move || aging.run()).await??;

    if args.json {
        print_pretty_json(&report_json(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(report.summary.verdict())
}
