//! # Synthetic Board Backend
//!
//! An in-process [`BoardBackend`] that behaves like a board SDK's synthetic
//! board: it needs no hardware, streams generated signals at the declared
//! sampling rate, and reports the same exit codes the SDK would for misuse.
//!
//! | Situation | Result |
//! |-----------|--------|
//! | `prepare_session` with a malformed address | `BoardNotCreated` |
//! | `prepare_session` when connecting takes longer than the timeout | `BoardNotReady` |
//! | `prepare_session` while another handle holds the same board + address | `AnotherBoardIsCreated` |
//! | any session call before `prepare_session` | `BoardNotCreated` |
//! | `get_board_data` before any `start_stream` | `InvalidArguments` |
//! | `start_stream` twice | `StreamAlreadyRun` |
//! | `stop_stream` while not streaming | `StreamThreadIsNotRunning` |
//!
//! Dropping a prepared handle does **not** release its session, exactly like
//! dropping an SDK handle without calling `release_session`. The
//! [`SessionLedger`] makes such leaks observable.

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::board::{BoardBackend, BoardData, BoardId, BoardShim, InputParams};
use crate::error::{BoardError, BoardResult, ExitCode};

/// Samples the ring buffer keeps before dropping the oldest ones.
const MAX_BUFFERED_SAMPLES: u64 = 450_000;

/// Default synthetic sampling rate in Hz.
const DEFAULT_SAMPLING_RATE: u32 = 250;

/// Default total number of rows per sample.
const DEFAULT_NUM_ROWS: usize = 32;

/// Static description of what a synthetic board reports.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardDescription {
    /// Declared sampling rate in Hz.
    pub sampling_rate: u32,

    /// Row indices carrying EEG.
    pub eeg_channels: Vec<usize>,

    /// Total rows in every [`BoardData`] matrix. Row 0 is the package
    /// counter, the last row is a timestamp in seconds.
    pub num_rows: usize,

    /// How long connecting takes. Exceeding the caller's timeout makes
    /// `prepare_session` fail with `BoardNotReady`.
    pub connect_latency: Duration,
}

impl Default for BoardDescription {
    fn default() -> Self {
        Self {
            sampling_rate: DEFAULT_SAMPLING_RATE,
            eeg_channels: (1..=16).collect(),
            num_rows: DEFAULT_NUM_ROWS,
            connect_latency: Duration::ZERO,
        }
    }
}

// ─── Session ledger ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LedgerState {
    open: HashSet<(BoardId, String)>,
    prepared_total: u64,
    released_total: u64,
}

/// Shared record of sessions opened through one [`SyntheticBackend`].
#[derive(Debug, Clone, Default)]
pub struct SessionLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl SessionLedger {
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Sessions currently prepared and not yet released.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.lock().open.len()
    }

    /// Sessions successfully prepared since the backend was created.
    #[must_use]
    pub fn prepared_total(&self) -> u64 {
        self.lock().prepared_total
    }

    /// Sessions released since the backend was created.
    #[must_use]
    pub fn released_total(&self) -> u64 {
        self.lock().released_total
    }

    fn acquire(&self, key: (BoardId, String)) -> BoardResult<()> {
        let mut state = self.lock();
        if state.open.contains(&key) {
            return Err(BoardError::device(
                ExitCode::AnotherBoardIsCreated,
                format!(
                    "Board {} at '{}' is already prepared by another handle",
                    key.0, key.1
                ),
            ));
        }
        state.open.insert(key);
        state.prepared_total += 1;
        Ok(())
    }

    fn release(&self, key: &(BoardId, String)) {
        let mut state = self.lock();
        if state.open.remove(key) {
            state.released_total += 1;
        }
    }
}

// ─── Backend ────────────────────────────────────────────────────────────

/// Backend creating [`SyntheticBoard`] handles for any board id.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    description: BoardDescription,
    ledger: SessionLedger,
}

impl SyntheticBackend {
    pub fn new(description: BoardDescription) -> Self {
        Self {
            description,
            ledger: SessionLedger::default(),
        }
    }

    /// Handle to the ledger shared by every board this backend creates.
    #[must_use]
    pub fn ledger(&self) -> SessionLedger {
        self.ledger.clone()
    }

    #[must_use]
    pub fn description(&self) -> &BoardDescription {
        &self.description
    }
}

impl BoardBackend for SyntheticBackend {
    fn create(&self, board_id: BoardId, params: &InputParams) -> BoardResult<Box<dyn BoardShim>> {
        tracing::debug!(%board_id, address = %params.address, "Creating synthetic board handle");
        Ok(Box::new(SyntheticBoard {
            board_id,
            params: params.clone(),
            description: self.description.clone(),
            ledger: self.ledger.clone(),
            prepared: false,
            stream: StreamState::Idle,
        }))
    }
}

// ─── Board handle ───────────────────────────────────────────────────────

#[derive(Debug)]
enum StreamState {
    /// Prepared, no stream started since prepare.
    Idle,
    Running { started: Instant, emitted: u64 },
    /// Stream stopped; `pending` samples are still buffered.
    Stopped {
        started: Instant,
        emitted: u64,
        pending: u64,
    },
}

/// One synthetic board session handle.
#[derive(Debug)]
pub struct SyntheticBoard {
    board_id: BoardId,
    params: InputParams,
    description: BoardDescription,
    ledger: SessionLedger,
    prepared: bool,
    stream: StreamState,
}

impl SyntheticBoard {
    fn ledger_key(&self) -> (BoardId, String) {
        (self.board_id, self.params.address.clone())
    }

    fn ensure_prepared(&self, operation: &str) -> BoardResult<()> {
        if self.prepared {
            Ok(())
        } else {
            Err(BoardError::device(
                ExitCode::BoardNotCreated,
                format!("{operation}: session is not prepared"),
            ))
        }
    }

    fn due_samples(&self, started: Instant) -> u64 {
        let elapsed = started.elapsed().as_secs_f64();
        // Truncation is intended: only whole samples are due.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let due = (elapsed * f64::from(self.description.sampling_rate)) as u64;
        due
    }

    /// Generate `count` samples starting at sample index `first`.
    #[allow(clippy::cast_precision_loss)]
    fn generate(&self, first: u64, count: u64) -> BoardData {
        let rows = self.description.num_rows;
        let rate = f64::from(self.description.sampling_rate);
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let mut data = vec![Vec::with_capacity(count); rows];

        for offset in 0..count {
            let index = first + offset as u64;
            let t = index as f64 / rate;
            for (row, values) in data.iter_mut().enumerate() {
                let value = if row == 0 {
                    (index % 256) as f64
                } else if row + 1 == rows {
                    t
                } else if self.description.eeg_channels.contains(&row) {
                    let freq = 5.0 + row as f64;
                    20.0 * (TAU * freq * t).sin()
                } else {
                    0.0
                };
                values.push(value);
            }
        }

        BoardData::new(data)
    }
}

fn is_mac_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

impl BoardShim for SyntheticBoard {
    fn board_id(&self) -> BoardId {
        self.board_id
    }

    fn prepare_session(&mut self) -> BoardResult<()> {
        if self.prepared {
            return Ok(());
        }

        let address = &self.params.address;
        if !address.is_empty() && !is_mac_address(address) {
            return Err(BoardError::device(
                ExitCode::BoardNotCreated,
                format!("Invalid device address '{address}'"),
            ));
        }

        let timeout = Duration::from_secs(self.params.timeout_secs);
        if self.description.connect_latency > timeout {
            // The SDK blocks for the whole timeout before giving up.
            std::thread::sleep(timeout);
            return Err(BoardError::device(
                ExitCode::BoardNotReady,
                format!(
                    "Board {} did not respond within {}s",
                    self.board_id, self.params.timeout_secs
                ),
            ));
        }
        std::thread::sleep(self.description.connect_latency);

        self.ledger.acquire(self.ledger_key())?;
        self.prepared = true;
        self.stream = StreamState::Idle;
        tracing::debug!(board_id = %self.board_id, "Synthetic session prepared");
        Ok(())
    }

    fn release_session(&mut self) -> BoardResult<()> {
        self.ensure_prepared("release_session")?;
        self.ledger.release(&self.ledger_key());
        self.prepared = false;
        self.stream = StreamState::Idle;
        tracing::debug!(board_id = %self.board_id, "Synthetic session released");
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn start_stream(&mut self) -> BoardResult<()> {
        self.ensure_prepared("start_stream")?;
        if matches!(self.stream, StreamState::Running { .. }) {
            return Err(BoardError::device(
                ExitCode::StreamAlreadyRun,
                "Stream is already running",
            ));
        }
        self.stream = StreamState::Running {
            started: Instant::now(),
            emitted: 0,
        };
        Ok(())
    }

    fn stop_stream(&mut self) -> BoardResult<()> {
        self.ensure_prepared("stop_stream")?;
        let StreamState::Running { started, emitted } = self.stream else {
            return Err(BoardError::device(
                ExitCode::StreamThreadIsNotRunning,
                "Stream is not running",
            ));
        };
        let pending = self
            .due_samples(started)
            .saturating_sub(emitted)
            .min(MAX_BUFFERED_SAMPLES);
        self.stream = StreamState::Stopped {
            started,
            emitted,
            pending,
        };
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        matches!(self.stream, StreamState::Running { .. })
    }

    fn get_board_data(&mut self) -> BoardResult<BoardData> {
        self.ensure_prepared("get_board_data")?;
        match self.stream {
            StreamState::Idle => Err(BoardError::device(
                ExitCode::InvalidArguments,
                "Stream is not started or no preset",
            )),
            StreamState::Running { started, emitted } => {
                let due = self.due_samples(started);
                let fresh = due.saturating_sub(emitted);
                let kept = fresh.min(MAX_BUFFERED_SAMPLES);
                let data = self.generate(due - kept, kept);
                self.stream = StreamState::Running {
                    started,
                    emitted: due,
                };
                Ok(data)
            }
            StreamState::Stopped {
                started,
                emitted,
                pending,
            } => {
                let data = self.generate(emitted, pending);
                self.stream = StreamState::Stopped {
                    started,
                    emitted: emitted + pending,
                    pending: 0,
                };
                Ok(data)
            }
        }
    }

    fn get_num_rows(&self) -> BoardResult<usize> {
        Ok(self.description.num_rows)
    }

    fn get_sampling_rate(&self) -> BoardResult<u32> {
        Ok(self.description.sampling_rate)
    }

    fn get_eeg_channels(&self) -> BoardResult<Vec<usize>> {
        Ok(self.description.eeg_channels.clone())
    }
}
