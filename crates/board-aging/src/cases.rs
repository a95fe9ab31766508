//! # Lifecycle Cases
//!
//! Each [`CaseKind`] drives one short session lifecycle against a fresh
//! board handle and checks what the board reports. [`LifecycleDriver`] runs a
//! case and classifies it into a [`TestCaseResult`]:
//!
//! | Case body ends with | Outcome |
//! |---------------------|---------|
//! | `Ok(())` | `Passed` |
//! | a violated expectation | `Failed` |
//! | a declared device error | `Failed` |
//! | any other board error | `Errored` |
//! | a panic | `Errored` |
//! | secondary-board case without a secondary board | `Skipped` |
//!
//! Nothing escapes a case: the round continues with the next one whatever
//! happens here.
//!
//! Every handle is held by a [`SessionGuard`], which stops the stream and
//! releases the session when the case ends, on every exit path.

use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{BoardBackend, BoardShim, InputParams};
use crate::config::{AgingConfig, BoardConfig, PostStopPolicy};
use crate::error::{BoardError, BoardResult, ExitCode};
use crate::report::TestCaseResult;

/// Address used by the invalid-address case.
const INVALID_ADDRESS: &str = "invalid_mac_address";

/// Timeout used by the timeout case; short enough to trip on a real device.
const SHORT_TIMEOUT_SECS: u64 = 1;

// ─── Case catalogue ─────────────────────────────────────────────────────

/// One lifecycle test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    PrepareSession,
    StartStream,
    GetSamplingRate,
    GetBoardData,
    StopStream,
    ReleaseSession,
    InvalidAddress,
    TimeoutScenario,
    DataFormat,
    DataWithoutStream,
    OperationOrder,
    ConcurrentPrepare,
    ConcurrentRelease,
    ConcurrentStartStream,
    ConcurrentStopStream,
    ConcurrentSamplingRate,
}

impl CaseKind {
    /// The default suite, in execution order.
    pub const CORE: [CaseKind; 6] = [
        CaseKind::PrepareSession,
        CaseKind::StartStream,
        CaseKind::GetSamplingRate,
        CaseKind::GetBoardData,
        CaseKind::StopStream,
        CaseKind::ReleaseSession,
    ];

    /// Every known case.
    pub const ALL: [CaseKind; 16] = [
        CaseKind::PrepareSession,
        CaseKind::StartStream,
        CaseKind::GetSamplingRate,
        CaseKind::GetBoardData,
        CaseKind::StopStream,
        CaseKind::ReleaseSession,
        CaseKind::InvalidAddress,
        CaseKind::TimeoutScenario,
        CaseKind::DataFormat,
        CaseKind::DataWithoutStream,
        CaseKind::OperationOrder,
        CaseKind::ConcurrentPrepare,
        CaseKind::ConcurrentRelease,
        CaseKind::ConcurrentStartStream,
        CaseKind::ConcurrentStopStream,
        CaseKind::ConcurrentSamplingRate,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CaseKind::PrepareSession => "prepare_session",
            CaseKind::StartStream => "start_stream",
            CaseKind::GetSamplingRate => "get_sampling_rate",
            CaseKind::GetBoardData => "get_board_data",
            CaseKind::StopStream => "stop_stream",
            CaseKind::ReleaseSession => "release_session",
            CaseKind::InvalidAddress => "invalid_address",
            CaseKind::TimeoutScenario => "timeout_scenario",
            CaseKind::DataFormat => "data_format",
            CaseKind::DataWithoutStream => "data_without_stream",
            CaseKind::OperationOrder => "operation_order",
            CaseKind::ConcurrentPrepare => "concurrent_prepare",
            CaseKind::ConcurrentRelease => "concurrent_release",
            CaseKind::ConcurrentStartStream => "concurrent_start_stream",
            CaseKind::ConcurrentStopStream => "concurrent_stop_stream",
            CaseKind::ConcurrentSamplingRate => "concurrent_sampling_rate",
        }
    }

    /// One-line description for listings.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            CaseKind::PrepareSession => "prepare; board is prepared and reports enough EEG channels",
            CaseKind::StartStream => "start a stream; streaming flag set and data has the declared rows",
            CaseKind::GetSamplingRate => "sampling rate is positive and matches the expected rate",
            CaseKind::GetBoardData => "after settling, data has the declared row count",
            CaseKind::StopStream => "stop a stream; post-stop data follows the configured policy",
            CaseKind::ReleaseSession => "release; board no longer reports prepared",
            CaseKind::InvalidAddress => "malformed address fails with BOARD_NOT_CREATED_ERROR",
            CaseKind::TimeoutScenario => "1s connect timeout fails with BOARD_NOT_READY_ERROR",
            CaseKind::DataFormat => "data is a rectangular matrix with the declared rows",
            CaseKind::DataWithoutStream => "reading data without a stream fails with INVALID_ARGUMENTS_ERROR",
            CaseKind::OperationOrder => "starting a stream before prepare fails with BOARD_NOT_CREATED_ERROR",
            CaseKind::ConcurrentPrepare => "prepare primary and secondary boards side by side",
            CaseKind::ConcurrentRelease => "prepare and release both boards",
            CaseKind::ConcurrentStartStream => "stream from both boards at once",
            CaseKind::ConcurrentStopStream => "stop streams on both boards",
            CaseKind::ConcurrentSamplingRate => "sampling rate check on both boards",
        }
    }

    /// Cases that need a secondary board; skipped without one.
    #[must_use]
    pub fn needs_secondary(self) -> bool {
        matches!(
            self,
            CaseKind::ConcurrentPrepare
                | CaseKind::ConcurrentRelease
                | CaseKind::ConcurrentStartStream
                | CaseKind::ConcurrentStopStream
                | CaseKind::ConcurrentSamplingRate
        )
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for CaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown case '{s}'"))
    }
}

// ─── Failure classification ─────────────────────────────────────────────

/// Why a case body stopped early.
#[derive(Error, Debug)]
pub enum CaseFailure {
    /// An expected post-condition did not hold.
    #[error("{0}")]
    Assertion(String),

    /// A board call failed.
    #[error(transparent)]
    Board(#[from] BoardError),
}

type CaseResult = Result<(), CaseFailure>;

fn ensure(condition: bool, message: impl FnOnce() -> String) -> CaseResult {
    if condition {
        Ok(())
    } else {
        Err(CaseFailure::Assertion(message()))
    }
}

/// Pass only if `result` is the declared device error `expected`.
///
/// A different device error keeps its own message (and classifies as
/// `Failed`); success is an assertion failure.
fn expect_exit_code<T>(result: BoardResult<T>, expected: ExitCode, operation: &str) -> CaseResult {
    match result {
        Err(err) if err.code() == Some(expected) => {
            tracing::debug!(operation, %expected, "Board raised the expected error");
            Ok(())
        }
        Err(err) => Err(CaseFailure::Board(err)),
        Ok(_) => Err(CaseFailure::Assertion(format!(
            "{operation} was expected to fail with {expected}, but succeeded"
        ))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─── Session guard ──────────────────────────────────────────────────────

/// Scoped owner of a board handle.
///
/// On drop: stops the stream if it is running, then releases the session if
/// it is prepared. Cleanup errors are logged, never raised.
pub struct SessionGuard {
    board: Box<dyn BoardShim>,
    label: &'static str,
}

impl SessionGuard {
    pub fn new(board: Box<dyn BoardShim>, label: &'static str) -> Self {
        Self { board, label }
    }
}

impl Deref for SessionGuard {
    type Target = dyn BoardShim;

    fn deref(&self) -> &Self::Target {
        self.board.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.board.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let label = self.label;
        if self.board.is_streaming() {
            cleanup_step(label, "stop_stream", || self.board.stop_stream());
        }
        if self.board.is_prepared() {
            cleanup_step(label, "release_session", || self.board.release_session());
        }
    }
}

/// Run one cleanup call. A panic here may fire while the case body is
/// already unwinding, so it must not leave the destructor.
fn cleanup_step(label: &'static str, step: &'static str, call: impl FnOnce() -> BoardResult<()>) {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(board = label, error = %e, "Cleanup: {step} failed");
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(board = label, panic = %message, "Cleanup: {step} panicked");
        }
    }
}

// ─── Driver ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Which {
    Primary,
    Secondary,
}

impl Which {
    fn label(self) -> &'static str {
        match self {
            Which::Primary => "primary",
            Which::Secondary => "secondary",
        }
    }
}

/// Runs single lifecycle cases against boards created by a backend.
pub struct LifecycleDriver {
    backend: Arc<dyn BoardBackend>,
    config: AgingConfig,
}

impl LifecycleDriver {
    pub fn new(backend: Arc<dyn BoardBackend>, config: AgingConfig) -> Self {
        Self { backend, config }
    }

    #[must_use]
    pub fn config(&self) -> &AgingConfig {
        &self.config
    }

    /// Run one case and classify its outcome. Never panics, never fails.
    pub fn execute(&self, kind: CaseKind) -> TestCaseResult {
        let started = Instant::now();

        if kind.needs_secondary() && self.config.secondary.is_none() {
            return TestCaseResult::skipped(kind, "no secondary board configured", started.elapsed());
        }

        tracing::debug!(case = kind.name(), "Running case");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(kind)));
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(())) => TestCaseResult::passed(kind, elapsed),
            Ok(Err(CaseFailure::Assertion(message))) => TestCaseResult::failed(kind, message, elapsed),
            Ok(Err(CaseFailure::Board(err))) if err.is_device_error() => {
                tracing::error!(case = kind.name(), error = %err, "Device error");
                TestCaseResult::failed(kind, err.to_string(), elapsed)
            }
            Ok(Err(CaseFailure::Board(err))) => {
                tracing::error!(case = kind.name(), error = %err, "Unexpected board error");
                TestCaseResult::errored(kind, err.to_string(), elapsed)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(case = kind.name(), panic = %message, "Case panicked");
                TestCaseResult::errored(kind, format!("panicked: {message}"), elapsed)
            }
        }
    }

    fn run(&self, kind: CaseKind) -> CaseResult {
        match kind {
            CaseKind::PrepareSession => self.prepare_session(),
            CaseKind::StartStream => self.start_stream(),
            CaseKind::GetSamplingRate => self.get_sampling_rate(),
            CaseKind::GetBoardData => self.get_board_data(),
            CaseKind::StopStream => self.stop_stream(),
            CaseKind::ReleaseSession => self.release_session(),
            CaseKind::InvalidAddress => self.invalid_address(),
            CaseKind::TimeoutScenario => self.timeout_scenario(),
            CaseKind::DataFormat => self.data_format(),
            CaseKind::DataWithoutStream => self.data_without_stream(),
            CaseKind::OperationOrder => self.operation_order(),
            CaseKind::ConcurrentPrepare => self.concurrent_prepare(),
            CaseKind::ConcurrentRelease => self.concurrent_release(),
            CaseKind::ConcurrentStartStream => self.concurrent_start_stream(),
            CaseKind::ConcurrentStopStream => self.concurrent_stop_stream(),
            CaseKind::ConcurrentSamplingRate => self.concurrent_sampling_rate(),
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────

    fn board_config(&self, which: Which) -> Result<&BoardConfig, CaseFailure> {
        match which {
            Which::Primary => Ok(&self.config.board),
            Which::Secondary => self
                .config
                .secondary
                .as_ref()
                .ok_or_else(|| CaseFailure::Assertion("no secondary board configured".into())),
        }
    }

    fn open_with(&self, which: Which, params: &InputParams) -> Result<SessionGuard, CaseFailure> {
        let board_id = self.board_config(which)?.board_id;
        let board = self.backend.create(board_id, params)?;
        Ok(SessionGuard::new(board, which.label()))
    }

    fn open(&self, which: Which) -> Result<SessionGuard, CaseFailure> {
        let params = self.board_config(which)?.input_params();
        self.open_with(which, &params)
    }

    fn min_channels(&self, which: Which) -> usize {
        let expectations = &self.config.expectations;
        match which {
            Which::Primary => expectations.min_eeg_channels,
            Which::Secondary => expectations.secondary_min_eeg_channels,
        }
    }

    fn expected_rate(&self, which: Which) -> Option<u32> {
        let expectations = &self.config.expectations;
        match which {
            Which::Primary => expectations.sampling_rate,
            Which::Secondary => expectations.secondary_sampling_rate,
        }
    }

    fn check_prepared(&self, board: &SessionGuard, which: Which) -> CaseResult {
        let channels = board.get_eeg_channels()?;
        let min = self.min_channels(which);
        ensure(channels.len() >= min, || {
            format!(
                "{} board reports {} EEG channels, expected at least {min}",
                which.label(),
                channels.len()
            )
        })?;
        ensure(board.is_prepared(), || {
            format!("{} board does not report prepared after prepare_session", which.label())
        })
    }

    fn check_rows(&self, board: &mut SessionGuard, which: Which) -> CaseResult {
        let data = board.get_board_data()?;
        let declared = board.get_num_rows()?;
        ensure(data.num_rows() == declared, || {
            format!(
                "{} board returned {} data rows, board declares {declared}",
                which.label(),
                data.num_rows()
            )
        })
    }

    fn check_sampling_rate(&self, board: &SessionGuard, which: Which) -> CaseResult {
        let rate = board.get_sampling_rate()?;
        ensure(rate > 0, || {
            format!("{} board reports a sampling rate of 0 Hz", which.label())
        })?;
        if let Some(expected) = self.expected_rate(which) {
            ensure(rate == expected, || {
                format!(
                    "sampling rate mismatch on {} board: expected {expected} Hz, board reports {rate} Hz",
                    which.label()
                )
            })?;
        }
        tracing::info!(board = which.label(), sampling_rate = rate, "Sampling rate read");
        Ok(())
    }

    fn check_post_stop(&self, board: &mut SessionGuard, which: Which) -> CaseResult {
        match self.config.expectations.post_stop {
            PostStopPolicy::DrainedEmpty => {
                let drained = board.get_board_data()?;
                tracing::debug!(
                    board = which.label(),
                    samples = drained.num_samples(),
                    "Drained buffered samples after stop"
                );
                let after = board.get_board_data()?;
                ensure(after.num_samples() == 0, || {
                    format!(
                        "{} board still produced {} samples after stop_stream",
                        which.label(),
                        after.num_samples()
                    )
                })
            }
            PostStopPolicy::RowMismatch => {
                let data = board.get_board_data()?;
                let declared = board.get_num_rows()?;
                ensure(data.num_rows() != declared, || {
                    format!(
                        "{} board returned the full {declared} rows after stop_stream",
                        which.label()
                    )
                })
            }
            PostStopPolicy::Unchecked => Ok(()),
        }
    }

    fn settle(&self, what: &'static str, duration: std::time::Duration) {
        if !duration.is_zero() {
            tracing::trace!(what, ms = duration.as_millis(), "Settling");
            std::thread::sleep(duration);
        }
    }

    // ─── Core cases ─────────────────────────────────────────────────

    fn prepare_session(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        self.check_prepared(&board, Which::Primary)?;
        tracing::info!("prepare_session: session prepared, EEG channel count verified");
        Ok(())
    }

    fn start_stream(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        board.start_stream()?;
        ensure(board.is_streaming(), || {
            "board does not report streaming after start_stream".into()
        })?;
        self.settle("stream", self.config.timing.stream_settle());
        self.check_rows(&mut board, Which::Primary)?;
        board.stop_stream()?;
        ensure(!board.is_streaming(), || {
            "board still reports streaming after stop_stream".into()
        })?;
        tracing::info!("start_stream: stream started, data verified");
        Ok(())
    }

    fn get_sampling_rate(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        self.check_sampling_rate(&board, Which::Primary)
    }

    fn get_board_data(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        board.start_stream()?;
        self.settle("stream", self.config.timing.stream_settle());
        self.check_rows(&mut board, Which::Primary)?;
        tracing::info!("get_board_data: board data verified");
        Ok(())
    }

    fn stop_stream(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        board.start_stream()?;
        board.stop_stream()?;
        ensure(!board.is_streaming(), || {
            "board still reports streaming after stop_stream".into()
        })?;
        self.settle("stop", self.config.timing.stop_settle());
        self.check_post_stop(&mut board, Which::Primary)?;
        tracing::info!("stop_stream: stream stopped");
        Ok(())
    }

    fn release_session(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        self.settle("release", self.config.timing.release_settle());
        board.release_session()?;
        ensure(!board.is_prepared(), || {
            "board still reports prepared after release_session".into()
        })?;
        tracing::info!("release_session: session released");
        Ok(())
    }

    // ─── Negative cases ─────────────────────────────────────────────

    fn invalid_address(&self) -> CaseResult {
        let timeout_secs = self.config.board.timeout_secs;
        let mut board =
            self.open_with(Which::Primary, &InputParams::new(INVALID_ADDRESS, timeout_secs))?;
        expect_exit_code(
            board.prepare_session(),
            ExitCode::BoardNotCreated,
            "prepare_session with an invalid address",
        )
    }

    fn timeout_scenario(&self) -> CaseResult {
        let address = self.config.board.address.clone();
        let mut board =
            self.open_with(Which::Primary, &InputParams::new(address, SHORT_TIMEOUT_SECS))?;
        expect_exit_code(
            board.prepare_session(),
            ExitCode::BoardNotReady,
            "prepare_session with a 1s timeout",
        )
    }

    fn data_format(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        board.start_stream()?;
        self.settle("stream", self.config.timing.stream_settle());
        let data = board.get_board_data()?;
        ensure(data.is_rectangular(), || {
            "board data rows have different sample counts".into()
        })?;
        let declared = board.get_num_rows()?;
        ensure(data.num_rows() == declared, || {
            format!(
                "board data has {} rows, board declares {declared}",
                data.num_rows()
            )
        })
    }

    fn data_without_stream(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        board.prepare_session()?;
        expect_exit_code(
            board.get_board_data(),
            ExitCode::InvalidArguments,
            "get_board_data without a stream",
        )
    }

    fn operation_order(&self) -> CaseResult {
        let mut board = self.open(Which::Primary)?;
        expect_exit_code(
            board.start_stream(),
            ExitCode::BoardNotCreated,
            "start_stream before prepare_session",
        )
    }

    // ─── Two-board cases ────────────────────────────────────────────

    fn concurrent_prepare(&self) -> CaseResult {
        let mut primary = self.open(Which::Primary)?;
        let mut secondary = self.open(Which::Secondary)?;
        primary.prepare_session()?;
        secondary.prepare_session()?;
        self.check_prepared(&primary, Which::Primary)?;
        self.check_prepared(&secondary, Which::Secondary)
    }

    fn concurrent_release(&self) -> CaseResult {
        let mut primary = self.open(Which::Primary)?;
        let mut secondary = self.open(Which::Secondary)?;
        primary.prepare_session()?;
        primary.release_session()?;
        secondary.prepare_session()?;
        secondary.release_session()?;
        ensure(!primary.is_prepared(), || {
            "primary board still reports prepared after release_session".into()
        })?;
        ensure(!secondary.is_prepared(), || {
            "secondary board still reports prepared after release_session".into()
        })
    }

    fn concurrent_start_stream(&self) -> CaseResult {
        let mut primary = self.open(Which::Primary)?;
        let mut secondary = self.open(Which::Secondary)?;
        primary.prepare_session()?;
        primary.start_stream()?;
        secondary.prepare_session()?;
        secondary.start_stream()?;
        self.settle("stream", self.config.timing.stream_settle());
        self.check_rows(&mut primary, Which::Primary)?;
        self.check_rows(&mut secondary, Which::Secondary)
    }

    fn concurrent_stop_stream(&self) -> CaseResult {
        let mut primary = self.open(Which::Primary)?;
        let mut secondary = self.open(Which::Secondary)?;
        primary.prepare_session()?;
        primary.start_stream()?;
        primary.stop_stream()?;
        secondary.prepare_session()?;
        secondary.start_stream()?;
        secondary.stop_stream()?;
        self.settle("stop", self.config.timing.stop_settle());
        self.check_post_stop(&mut primary, Which::Primary)?;
        self.check_post_stop(&mut secondary, Which::Secondary)
    }

    fn concurrent_sampling_rate(&self) -> CaseResult {
        let mut primary = self.open(Which::Primary)?;
        primary.prepare_session()?;
        self.check_sampling_rate(&primary, Which::Primary)?;
        let mut secondary = self.open(Which::Secondary)?;
        secondary.prepare_session()?;
        self.check_sampling_rate(&secondary, Which::Secondary)
    }
}
