//! # Aging Loop
//!
//! Repeats rounds until the configured wall-clock duration has passed, then
//! emits a run summary.
//!
//! ```text
//! Idle ──▶ RunningRound ──▶ Reporting ──┬──▶ RunningRound   (time left)
//!   │                                    └──▶ Done           (time up / cancelled)
//!   └──▶ Done                                                (zero duration)
//! ```
//!
//! Time is checked only between rounds, so a round that starts before the
//! deadline always runs to completion. With a zero duration no round runs at
//! all. A cancellation flag is honoured at the same point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::HarnessResult;
use crate::report::{AgingReport, AgingRunSummary, ReportSink, Verdict};
use crate::runner::{RoundExecutor, RoundReport};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgingState {
    Idle,
    RunningRound,
    Reporting,
    Done,
}

/// Drives rounds until the aging duration runs out.
pub struct AgingLoop {
    executor: RoundExecutor,
    duration: Duration,
    cancel: Arc<AtomicBool>,
    sink: Option<Box<dyn ReportSink>>,
    state: AgingState,
}

impl AgingLoop {
    pub fn new(executor: RoundExecutor, duration: Duration) -> Self {
        Self {
            executor,
            duration,
            cancel: Arc::new(AtomicBool::new(false)),
            sink: None,
            state: AgingState::Idle,
        }
    }

    /// Stream rounds and the final summary to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Share an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the run before the next round when set.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn state(&self) -> AgingState {
        self.state
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run to completion.
    ///
    /// Only a report sink failure ends the run with an error; board
    /// failures are recorded in the rounds.
    pub fn run(&mut self) -> HarnessResult<AgingReport> {
        let started = Instant::now();
        // A duration too large for Instant means "never stop on time".
        let deadline = started.checked_add(self.duration);

        let mut summary = AgingRunSummary::new(self.duration);
        let mut rounds = Vec::new();
        let mut round: u32 = 0;
        let mut cancelled = false;

        tracing::info!(
            duration_secs = self.duration.as_secs_f64(),
            cases = self.executor.cases().len(),
            "Aging run started"
        );
        self.state = AgingState::Idle;

        loop {
            match self.state {
                AgingState::Idle | AgingState::Reporting => {
                    if self.cancel.load(Ordering::SeqCst) {
                        tracing::warn!(completed_rounds = round, "Aging run cancelled");
                        cancelled = true;
                        self.state = AgingState::Done;
                    } else if deadline.is_none_or(|end| Instant::now() < end) {
                        self.state = AgingState::RunningRound;
                    } else {
                        self.state = AgingState::Done;
                    }
                }
                AgingState::RunningRound => {
                    round += 1;
                    tracing::info!(round, "Round started");
                    let report = self.executor.run_round(round);
                    self.state = AgingState::Reporting;
                    log_round(&report);
                    summary.merge(&report.summary);
                    self.record(&report)?;
                    rounds.push(report.summary);
                }
                AgingState::Done => break,
            }
        }

        let report = AgingReport {
            summary,
            rounds,
            elapsed: started.elapsed(),
            cancelled,
        };
        log_final(&report);

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.finish(&report) {
                tracing::error!(error = %e, "Failed to write final run summary");
                return Err(e);
            }
        }
        Ok(report)
    }

    fn record(&mut self, report: &RoundReport) -> HarnessResult<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        if let Err(e) = sink.record_round(report) {
            tracing::error!(
                round = report.summary.round(),
                error = %e,
                "Failed to record round, aborting run"
            );
            self.state = AgingState::Done;
            return Err(e);
        }
        Ok(())
    }
}

fn log_round(report: &RoundReport) {
    let summary = &report.summary;
    let elapsed = format!("{:.3}", summary.elapsed().as_secs_f64());
    match summary.verdict() {
        Verdict::Pass => tracing::info!(
            round = summary.round(),
            cases = summary.cases_run(),
            skipped = summary.skipped(),
            elapsed_secs = %elapsed,
            "Round {} completed: PASS",
            summary.round()
        ),
        Verdict::Fail => tracing::error!(
            round = summary.round(),
            cases = summary.cases_run(),
            failures = summary.failures(),
            errors = summary.errors(),
            skipped = summary.skipped(),
            elapsed_secs = %elapsed,
            "Round {} completed: FAIL",
            summary.round()
        ),
    }
}

fn log_final(report: &AgingReport) {
    let summary = &report.summary;
    tracing::info!(
        aging_hours = summary.aging_duration().as_secs_f64() / 3600.0,
        rounds = summary.rounds(),
        failed_rounds = summary.failed_rounds(),
        total_cases = summary.total_cases(),
        total_failures = summary.total_failures(),
        total_errors = summary.total_errors(),
        total_skipped = summary.total_skipped(),
        elapsed_secs = report.elapsed.as_secs_f64(),
        cancelled = report.cancelled,
        verdict = %summary.verdict(),
        "Aging run finished"
    );
}
