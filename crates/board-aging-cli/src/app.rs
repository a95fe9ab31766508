use std::path::Path;
use std::time::Duration;

use colored::Colorize;

use board_aging::{AgingConfig, AgingReport, Verdict};

pub fn print_banner(config: &AgingConfig, duration: Duration, log_path: &Path) {
    println!(
        "{} Board Aging Runner",
        "╔══════════════════════════════════╗\n║".bright_blue()
    );
    println!("{}", "╚══════════════════════════════════╝".bright_blue());
    println!(
        "Board {} at {}  |  {:.4} h ({:.1} s)",
        config.board.board_id.to_string().cyan(),
        display_address(&config.board.address).cyan(),
        config.aging_hours,
        duration.as_secs_f64()
    );
    if let Some(secondary) = &config.secondary {
        println!(
            "Secondary board {} at {}",
            secondary.board_id.to_string().cyan(),
            display_address(&secondary.address).cyan()
        );
    }
    let cases: Vec<&str> = config.cases.iter().map(|c| c.name()).collect();
    println!("Cases: {}", cases.join(", ").dimmed());
    println!("Log file: {}\n", log_path.display().to_string().dimmed());
}

fn display_address(address: &str) -> &str {
    if address.is_empty() { "<none>" } else { address }
}

pub fn format_verdict(verdict: Verdict) -> String {
    match verdict {
        Verdict::Pass => "PASS".green().bold().to_string(),
        Verdict::Fail => "FAIL".red().bold().to_string(),
    }
}

/// Print a JSON value with pretty formatting.
pub fn print_pretty_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("{} {}", "Failed to format JSON output:".yellow(), err);
            println!("{value}");
        }
    }
}

/// Machine-readable run summary for `run --json`.
pub fn report_json(report: &AgingReport) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(report)?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "verdict".into(),
            serde_json::to_value(report.summary.verdict())?,
        );
    }
    Ok(value)
}

pub fn print_summary(report: &AgingReport) {
    let summary = &report.summary;
    println!("\n{}", "Aging Summary:".bright_blue());
    println!(
        "  Duration:  {:.4} h configured, {:.1} s elapsed",
        summary.aging_duration().as_secs_f64() / 3600.0,
        report.elapsed.as_secs_f64()
    );
    println!(
        "  Rounds:    {} ({} failed)",
        summary.rounds(),
        summary.failed_rounds()
    );
    println!(
        "  Cases:     {} run, {} passed, {} failed, {} errored, {} skipped",
        summary.total_cases(),
        summary.total_passed().to_string().green(),
        summary.total_failures().to_string().red(),
        summary.total_errors().to_string().red(),
        summary.total_skipped().to_string().yellow()
    );
    if report.cancelled {
        println!("  {}", "Cancelled before the configured duration.".yellow());
    }
    println!("  Verdict:   {}", format_verdict(summary.verdict()));
}
