//! Age the synthetic board for a few seconds, streaming the JSON-lines report
//! to stdout.
//!
//! ```bash
//! cargo run -p board-aging --example synthetic_run
//! ```

use std::sync::Arc;
use std::time::Duration;

use board_aging::{
    AgingConfig, AgingLoop, JsonLinesReport, RoundExecutor, SyntheticBackend, TimingConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("board_aging=info")
        .with_writer(std::io::stderr)
        .init();

    let mut config = AgingConfig::default();
    config.timing = TimingConfig {
        stream_settle_ms: 200,
        stop_settle_ms: 100,
        release_settle_ms: 100,
    };
    config.expectations.sampling_rate = Some(250);

    let executor = RoundExecutor::from_config(Arc::new(SyntheticBackend::default()), config);
    let report = AgingLoop::new(executor, Duration::from_secs(3))
        .with_sink(JsonLinesReport::new(std::io::stdout()))
        .run()?;

    eprintln!(
        "{} rounds, {} cases, verdict {}",
        report.summary.rounds(),
        report.summary.total_cases(),
        report.summary.verdict()
    );
    Ok(())
}
