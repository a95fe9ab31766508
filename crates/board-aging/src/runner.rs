//! # Round Executor
//!
//! Runs the configured case list once, in order, and turns the results into
//! a [`RoundReport`]. A failing or errored case never stops the round.

use std::sync::Arc;
use std::time::Instant;

use crate::board::BoardBackend;
use crate::cases::{CaseKind, LifecycleDriver};
use crate::config::AgingConfig;
use crate::report::{Outcome, RoundSummary, TestCaseResult};

/// Case results of one round plus their summary.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub summary: RoundSummary,
    pub results: Vec<TestCaseResult>,
}

/// Executes one round of lifecycle cases.
pub struct RoundExecutor {
    driver: LifecycleDriver,
    cases: Vec<CaseKind>,
}

impl RoundExecutor {
    pub fn new(driver: LifecycleDriver, cases: Vec<CaseKind>) -> Self {
        Self { driver, cases }
    }

    /// Executor running `config.cases` against boards from `backend`.
    pub fn from_config(backend: Arc<dyn BoardBackend>, config: AgingConfig) -> Self {
        let cases = config.cases.clone();
        Self::new(LifecycleDriver::new(backend, config), cases)
    }

    #[must_use]
    pub fn cases(&self) -> &[CaseKind] {
        &self.cases
    }

    /// Run every case once. `round` is the 1-based round number.
    pub fn run_round(&self, round: u32) -> RoundReport {
        let started = Instant::now();
        let span = tracing::info_span!("round", round);
        let _enter = span.enter();

        let results: Vec<TestCaseResult> = self
            .cases
            .iter()
            .map(|&kind| {
                let result = self.driver.execute(kind);
                log_result(&result);
                result
            })
            .collect();

        RoundReport {
            summary: RoundSummary::from_results(round, &results, started.elapsed()),
            results,
        }
    }
}

fn log_result(result: &TestCaseResult) {
    let elapsed_ms = u64::try_from(result.elapsed().as_millis()).unwrap_or(u64::MAX);
    let message = result.message().unwrap_or_default();
    match result.outcome() {
        Outcome::Passed => tracing::info!(case = result.name(), elapsed_ms, "Case passed"),
        Outcome::Skipped => {
            tracing::info!(case = result.name(), reason = message, "Case skipped");
        }
        Outcome::Failed => {
            tracing::error!(case = result.name(), elapsed_ms, message, "Case failed");
        }
        Outcome::Errored => {
            tracing::error!(case = result.name(), elapsed_ms, message, "Case errored");
        }
    }
}
