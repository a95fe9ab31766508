mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use board_aging::{
    AgingConfig, AgingLoop, AgingReport, AgingRunSummary, AgingState, CaseKind, ExitCode,
    HarnessError, HarnessResult, JsonLinesReport, Outcome, ReportSink, RoundExecutor, RoundReport,
    TimingConfig, Verdict,
};

use support::scripted_board::{Fault, Op, ScriptedBackend};

fn fast_config() -> AgingConfig {
    let mut config = AgingConfig::default();
    config.timing = TimingConfig::immediate();
    config
}

fn aging_loop(backend: &ScriptedBackend, config: AgingConfig, duration: Duration) -> AgingLoop {
    AgingLoop::new(
        RoundExecutor::from_config(Arc::new(backend.clone()), config),
        duration,
    )
}

/// Sink that fails on a chosen round.
struct FailingSink {
    fail_on_round: u32,
}

impl ReportSink for FailingSink {
    fn record_round(&mut self, round: &RoundReport) -> HarnessResult<()> {
        if round.summary.round() == self.fail_on_round {
            return Err(HarnessError::ReportError {
                reason: "disk full".into(),
            });
        }
        Ok(())
    }

    fn finish(&mut self, _report: &AgingReport) -> HarnessResult<()> {
        Ok(())
    }
}

/// Sink that raises the cancel flag after a chosen round.
struct CancelAfter {
    rounds: u32,
    flag: Arc<AtomicBool>,
}

impl ReportSink for CancelAfter {
    fn record_round(&mut self, round: &RoundReport) -> HarnessResult<()> {
        if round.summary.round() >= self.rounds {
            self.flag.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn finish(&mut self, _report: &AgingReport) -> HarnessResult<()> {
        Ok(())
    }
}

#[test]
fn short_run_executes_exactly_one_round() {
    // 0.00001 h is 36 ms; a single round with two 40 ms settles outlasts it.
    let backend = ScriptedBackend::default();
    let mut config = fast_config();
    config.aging_hours = 0.00001;
    config.timing.stream_settle_ms = 40;
    let duration = config.aging_duration().unwrap();

    let mut aging = aging_loop(&backend, config, duration);
    let report = aging.run().unwrap();

    assert_eq!(report.summary.rounds(), 1);
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.rounds[0].cases_run(), 6);
    assert_eq!(report.summary.total_cases(), 6);
    assert_eq!(report.summary.verdict(), Verdict::Pass);
    assert!(report.elapsed >= duration);
    assert_eq!(aging.state(), AgingState::Done);
}

#[test]
fn zero_hours_runs_nothing() {
    let backend = ScriptedBackend::default();
    let mut config = fast_config();
    config.aging_hours = 0.0;
    let duration = config.aging_duration().unwrap();

    let report = aging_loop(&backend, config, duration).run().unwrap();
    assert_eq!(report.summary.rounds(), 0);
    assert_eq!(report.summary.total_cases(), 0);
    assert_eq!(backend.handles_created(), 0);
}

#[test]
fn errored_case_does_not_stop_the_round() {
    let backend =
        ScriptedBackend::with_fault(Op::GetSamplingRate, Fault::Panic("rate query died"));
    let report = aging_loop(&backend, fast_config(), Duration::from_millis(10))
        .run()
        .unwrap();

    assert!(report.summary.rounds() >= 1);
    for round in &report.rounds {
        assert_eq!(round.cases_run(), 6);
        assert_eq!(round.errors(), 1);
        assert_eq!(round.failures(), 0);
        assert_eq!(round.passed(), 5);
        assert_eq!(round.verdict(), Verdict::Fail);
    }
    assert_eq!(report.summary.verdict(), Verdict::Fail);
    assert_eq!(backend.open_sessions(), 0);
}

#[test]
fn panicking_cleanup_never_ends_the_run() {
    let backend = ScriptedBackend::with_fault(Op::StopStream, Fault::Panic("stop exploded"));
    let report = aging_loop(&backend, fast_config(), Duration::from_millis(20))
        .run()
        .unwrap();

    assert!(report.summary.rounds() >= 1);
    assert_eq!(report.summary.rounds() as usize, report.rounds.len());
    for (i, round) in report.rounds.iter().enumerate() {
        assert_eq!(round.round() as usize, i + 1);
        assert_eq!(round.cases_run(), 6);
        assert!(round.errors() >= 1);
    }
    assert_eq!(report.summary.verdict(), Verdict::Fail);
    assert_eq!(backend.open_sessions(), 0);
}

#[test]
fn rate_mismatch_fails_every_round_but_keeps_running() {
    let backend = ScriptedBackend::with_sampling_rate(200);
    let mut config = fast_config();
    config.expectations.sampling_rate = Some(250);

    let report = aging_loop(&backend, config, Duration::from_millis(30))
        .run()
        .unwrap();

    assert!(report.summary.rounds() >= 1);
    assert_eq!(report.summary.failed_rounds(), report.summary.rounds());
    for round in &report.rounds {
        assert_eq!(round.failures(), 1);
        assert_eq!(round.cases_run(), 6);
    }
}

#[test]
fn counts_are_consistent_across_rounds() {
    let backend = ScriptedBackend::with_fault(Op::StopStream, Fault::Device(ExitCode::General));
    let mut config = fast_config();
    config.cases.push(CaseKind::ConcurrentPrepare);

    let report = aging_loop(&backend, config, Duration::from_millis(30))
        .run()
        .unwrap();

    for round in &report.rounds {
        assert!(round.failures() + round.errors() + round.skipped() <= round.cases_run());
        assert_eq!(round.skipped(), 1);
    }
    let recomputed = AgingRunSummary::from_rounds(report.summary.aging_duration(), &report.rounds);
    assert_eq!(recomputed, report.summary);
    assert_eq!(
        report.summary.total_cases(),
        report.rounds.iter().map(|r| r.cases_run()).sum::<usize>()
    );
}

#[test]
fn sink_failure_aborts_the_run() {
    let backend = ScriptedBackend::default();
    let mut aging = aging_loop(&backend, fast_config(), Duration::from_secs(3600))
        .with_sink(FailingSink { fail_on_round: 2 });

    let err = aging.run().unwrap_err();
    assert!(matches!(err, HarnessError::ReportError { .. }));
    assert_eq!(aging.state(), AgingState::Done);
    // Two rounds of six cases ran; nothing after the failure.
    assert_eq!(backend.handles_created(), 12);
}

#[test]
fn cancellation_stops_before_the_next_round() {
    let backend = ScriptedBackend::default();
    let flag = Arc::new(AtomicBool::new(false));
    let mut aging = aging_loop(&backend, fast_config(), Duration::from_secs(3600))
        .with_cancel_flag(Arc::clone(&flag))
        .with_sink(CancelAfter {
            rounds: 3,
            flag: Arc::clone(&flag),
        });

    let report = aging.run().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.summary.rounds(), 3);
    assert_eq!(backend.open_sessions(), 0);
}

#[test]
fn json_lines_report_file_records_every_round() {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "board-aging-report-tests-{}-{}",
        std::process::id(),
        now
    ));
    let path = dir.join("nested").join("report.jsonl");

    let backend =
        ScriptedBackend::with_fault(Op::GetSamplingRate, Fault::Device(ExitCode::General));
    let sink = JsonLinesReport::create(&path).unwrap();
    let report = aging_loop(&backend, fast_config(), Duration::from_millis(20))
        .with_sink(sink)
        .run()
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let rounds = report.summary.rounds() as usize;
    assert!(rounds >= 1);
    assert_eq!(lines.len(), rounds + 1);
    assert!(lines[..rounds].iter().all(|l| l["kind"] == "round"));
    let failed_case = lines[0]["results"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["outcome"] == "failed")
        .unwrap();
    assert_eq!(failed_case["case"], "get_sampling_rate");
    assert_eq!(lines[rounds]["kind"], "final");
    assert_eq!(lines[rounds]["cancelled"], false);
    assert_eq!(lines[rounds]["verdict"], "FAIL");

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn skipped_outcome_does_not_fail_a_round() {
    let backend = ScriptedBackend::default();
    let mut config = fast_config();
    config.cases = vec![
        CaseKind::PrepareSession,
        CaseKind::ConcurrentRelease,
    ];
    let executor = RoundExecutor::from_config(Arc::new(backend), config);
    let round = executor.run_round(1);
    assert_eq!(round.results[1].outcome(), Outcome::Skipped);
    assert_eq!(round.summary.verdict(), Verdict::Pass);
}

