//! # Run Reports
//!
//! Result records produced by the harness, from a single case up to a whole
//! aging run. All of them are plain values: built once, never mutated by
//! their consumers.
//!
//! A run report can be streamed to disk as it happens through a
//! [`ReportSink`]; [`JsonLinesReport`] writes one JSON object per round and a
//! final summary line.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cases::CaseKind;
use crate::error::{HarnessError, HarnessResult};
use crate::runner::RoundReport;

// ─── Case level ─────────────────────────────────────────────────────────

/// How a single case ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// An expectation did not hold or the board raised a device error.
    Failed,
    /// The case broke in a way the board contract does not declare.
    Errored,
    /// The case could not run with the current setup.
    Skipped,
}

/// Outcome of one case in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    case: CaseKind,
    outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(with = "duration_secs")]
    elapsed: Duration,
}

impl TestCaseResult {
    pub fn passed(case: CaseKind, elapsed: Duration) -> Self {
        Self {
            case,
            outcome: Outcome::Passed,
            message: None,
            elapsed,
        }
    }

    pub fn failed(case: CaseKind, message: impl Into<String>, elapsed: Duration) -> Self {
        Self::with_message(case, Outcome::Failed, message, elapsed)
    }

    pub fn errored(case: CaseKind, message: impl Into<String>, elapsed: Duration) -> Self {
        Self::with_message(case, Outcome::Errored, message, elapsed)
    }

    pub fn skipped(case: CaseKind, reason: impl Into<String>, elapsed: Duration) -> Self {
        Self::with_message(case, Outcome::Skipped, reason, elapsed)
    }

    fn with_message(
        case: CaseKind,
        outcome: Outcome,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            case,
            outcome,
            message: Some(message.into()),
            elapsed,
        }
    }

    #[must_use]
    pub fn case(&self) -> CaseKind {
        self.case
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.case.name()
    }

    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Failure or skip reason. `None` for passed cases.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

// ─── Round level ────────────────────────────────────────────────────────

/// Pass/fail verdict of a round or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Counts for one round.
///
/// `failures + errors + skipped <= cases_run` always holds, since all
/// counts are derived from the same result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    round: u32,
    cases_run: usize,
    failures: usize,
    errors: usize,
    skipped: usize,
    #[serde(with = "duration_secs")]
    elapsed: Duration,
}

impl RoundSummary {
    /// Derive a summary from the case results of round `round` (1-based).
    pub fn from_results(round: u32, results: &[TestCaseResult], elapsed: Duration) -> Self {
        let count = |outcome: Outcome| results.iter().filter(|r| r.outcome == outcome).count();
        Self {
            round,
            cases_run: results.len(),
            failures: count(Outcome::Failed),
            errors: count(Outcome::Errored),
            skipped: count(Outcome::Skipped),
            elapsed,
        }
    }

    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub fn cases_run(&self) -> usize {
        self.cases_run
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.cases_run
            .saturating_sub(self.failures + self.errors + self.skipped)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// `Pass` iff no case failed or errored. Skips do not fail a round.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.failures == 0 && self.errors == 0 {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

// ─── Run level ──────────────────────────────────────────────────────────

/// Totals across all rounds of an aging run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingRunSummary {
    #[serde(with = "duration_secs")]
    aging_duration: Duration,
    rounds: u32,
    failed_rounds: u32,
    total_cases: usize,
    total_failures: usize,
    total_errors: usize,
    total_skipped: usize,
}

impl AgingRunSummary {
    /// Empty summary for a run configured to last `aging_duration`.
    pub fn new(aging_duration: Duration) -> Self {
        Self {
            aging_duration,
            rounds: 0,
            failed_rounds: 0,
            total_cases: 0,
            total_failures: 0,
            total_errors: 0,
            total_skipped: 0,
        }
    }

    /// Recompute totals from a round log.
    pub fn from_rounds(aging_duration: Duration, rounds: &[RoundSummary]) -> Self {
        rounds.iter().fold(Self::new(aging_duration), |mut acc, round| {
            acc.merge(round);
            acc
        })
    }

    /// Add one round's counts.
    pub fn merge(&mut self, round: &RoundSummary) {
        self.rounds += 1;
        if round.verdict() == Verdict::Fail {
            self.failed_rounds += 1;
        }
        self.total_cases += round.cases_run;
        self.total_failures += round.failures;
        self.total_errors += round.errors;
        self.total_skipped += round.skipped;
    }

    #[must_use]
    pub fn aging_duration(&self) -> Duration {
        self.aging_duration
    }

    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    #[must_use]
    pub fn failed_rounds(&self) -> u32 {
        self.failed_rounds
    }

    #[must_use]
    pub fn total_cases(&self) -> usize {
        self.total_cases
    }

    #[must_use]
    pub fn total_failures(&self) -> usize {
        self.total_failures
    }

    #[must_use]
    pub fn total_errors(&self) -> usize {
        self.total_errors
    }

    #[must_use]
    pub fn total_skipped(&self) -> usize {
        self.total_skipped
    }

    #[must_use]
    pub fn total_passed(&self) -> usize {
        self.total_cases
            .saturating_sub(self.total_failures + self.total_errors + self.total_skipped)
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.failed_rounds == 0 {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

/// Everything an aging run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub summary: AgingRunSummary,
    pub rounds: Vec<RoundSummary>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// The run stopped on request before its duration elapsed.
    pub cancelled: bool,
}

// ─── Sinks ──────────────────────────────────────────────────────────────

/// Receives round results as the run progresses.
pub trait ReportSink: Send {
    /// Called once per finished round, in order.
    fn record_round(&mut self, round: &RoundReport) -> HarnessResult<()>;

    /// Called once after the last round.
    fn finish(&mut self, report: &AgingReport) -> HarnessResult<()>;
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReportLine<'a> {
    Round {
        #[serde(flatten)]
        summary: &'a RoundSummary,
        verdict: Verdict,
        results: &'a [TestCaseResult],
    },
    Final {
        #[serde(flatten)]
        summary: &'a AgingRunSummary,
        verdict: Verdict,
        #[serde(with = "duration_secs")]
        elapsed: Duration,
        cancelled: bool,
    },
}

/// Writes one JSON object per line: a `"round"` line per round, then one
/// `"final"` line.
pub struct JsonLinesReport<W: Write> {
    writer: W,
}

impl JsonLinesReport<BufWriter<File>> {
    /// Create (or truncate) a report file, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path).map_err(|e| HarnessError::ReportError {
            reason: format!("Failed to create report file '{}': {}", path.display(), e),
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesReport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &ReportLine<'_>) -> HarnessResult<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        // Flushed per line so an interrupted run keeps everything recorded so far.
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> ReportSink for JsonLinesReport<W> {
    fn record_round(&mut self, round: &RoundReport) -> HarnessResult<()> {
        self.write_line(&ReportLine::Round {
            summary: &round.summary,
            verdict: round.summary.verdict(),
            results: &round.results,
        })
    }

    fn finish(&mut self, report: &AgingReport) -> HarnessResult<()> {
        self.write_line(&ReportLine::Final {
            summary: &report.summary,
            verdict: report.summary.verdict(),
            elapsed: report.elapsed,
            cancelled: report.cancelled,
        })
    }
}

/// (De)serialize a [`Duration`] as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sample_results() -> Vec<TestCaseResult> {
        vec![
            TestCaseResult::passed(CaseKind::PrepareSession, ms(5)),
            TestCaseResult::failed(CaseKind::StartStream, "rows", ms(5)),
            TestCaseResult::errored(CaseKind::GetSamplingRate, "panicked", ms(5)),
            TestCaseResult::skipped(CaseKind::ConcurrentPrepare, "no secondary", ms(0)),
            TestCaseResult::passed(CaseKind::ReleaseSession, ms(5)),
        ]
    }

    #[test]
    fn test_round_summary_counts() {
        let summary = RoundSummary::from_results(3, &sample_results(), ms(20));
        assert_eq!(summary.round(), 3);
        assert_eq!(summary.cases_run(), 5);
        assert_eq!(summary.failures(), 1);
        assert_eq!(summary.errors(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.passed(), 2);
        assert_eq!(summary.verdict(), Verdict::Fail);
    }

    #[test]
    fn test_skips_do_not_fail_a_round() {
        let results = vec![
            TestCaseResult::passed(CaseKind::PrepareSession, ms(1)),
            TestCaseResult::skipped(CaseKind::ConcurrentRelease, "no secondary", ms(0)),
        ];
        let summary = RoundSummary::from_results(1, &results, ms(1));
        assert_eq!(summary.verdict(), Verdict::Pass);
    }

    #[test]
    fn test_run_summary_merge_matches_from_rounds() {
        let failing = RoundSummary::from_results(1, &sample_results(), ms(20));
        let clean = RoundSummary::from_results(
            2,
            &[TestCaseResult::passed(CaseKind::PrepareSession, ms(1))],
            ms(1),
        );
        let rounds = vec![failing, clean];

        let mut running = AgingRunSummary::new(ms(36));
        for round in &rounds {
            running.merge(round);
        }
        assert_eq!(running, AgingRunSummary::from_rounds(ms(36), &rounds));
        assert_eq!(running.rounds(), 2);
        assert_eq!(running.failed_rounds(), 1);
        assert_eq!(running.total_cases(), 6);
        assert_eq!(running.total_passed(), 3);
        assert_eq!(running.verdict(), Verdict::Fail);
    }

    #[test]
    fn test_empty_run_passes() {
        let summary = AgingRunSummary::from_rounds(Duration::ZERO, &[]);
        assert_eq!(summary.rounds(), 0);
        assert_eq!(summary.total_cases(), 0);
        assert_eq!(summary.verdict(), Verdict::Pass);
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = TestCaseResult::failed(CaseKind::StopStream, "still streaming", ms(1500));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["case"], "stop_stream");
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["message"], "still streaming");
        assert_eq!(value["elapsed"], 1.5);

        let passed = serde_json::to_value(TestCaseResult::passed(CaseKind::StopStream, ms(1))).unwrap();
        assert!(passed.get("message").is_none());

        let back: TestCaseResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_json_lines_report() {
        let results = sample_results();
        let round = RoundReport {
            summary: RoundSummary::from_results(1, &results, ms(20)),
            results,
        };
        let report = AgingReport {
            summary: AgingRunSummary::from_rounds(ms(36), std::slice::from_ref(&round.summary)),
            rounds: vec![round.summary.clone()],
            elapsed: ms(40),
            cancelled: false,
        };

        let mut sink = JsonLinesReport::new(Vec::new());
        sink.record_round(&round).unwrap();
        sink.finish(&report).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "round");
        assert_eq!(lines[0]["round"], 1);
        assert_eq!(lines[0]["verdict"], "FAIL");
        assert_eq!(lines[0]["results"].as_array().unwrap().len(), 5);
        assert_eq!(lines[1]["kind"], "final");
        assert_eq!(lines[1]["rounds"], 1);
        assert_eq!(lines[1]["cancelled"], false);
    }

    #[test]
    fn test_passed_counts_clamp_on_inconsistent_input() {
        let round: RoundSummary = serde_json::from_value(serde_json::json!({
            "round": 1,
            "cases_run": 2,
            "failures": 3,
            "errors": 1,
            "skipped": 0,
            "elapsed": 0.5,
        }))
        .unwrap();
        assert_eq!(round.passed(), 0);

        let run: AgingRunSummary = serde_json::from_value(serde_json::json!({
            "aging_duration": 36.0,
            "rounds": 1,
            "failed_rounds": 1,
            "total_cases": 1,
            "total_failures": 0,
            "total_errors": 0,
            "total_skipped": 4,
        }))
        .unwrap();
        assert_eq!(run.total_passed(), 0);
    }
}
