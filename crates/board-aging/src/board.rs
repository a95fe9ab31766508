//! # Board Abstraction
//!
//! The harness never talks to a vendor SDK directly. It drives a
//! [`BoardShim`]: one session handle for one physical or synthetic board,
//! created per test case by a [`BoardBackend`].
//!
//! A handle moves through
//! *unprepared → prepared → streaming → prepared → unprepared*
//! via explicit calls. The harness only issues commands and checks the state
//! the handle reports; the handle owns its own state.

use serde::{Deserialize, Serialize};

use crate::error::BoardResult;

/// Numeric board identifier, as understood by the board SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub i32);

impl BoardId {
    /// Software-only board generating synthetic signals.
    pub const SYNTHETIC: BoardId = BoardId(-1);
    /// Board streaming from a playback file.
    pub const PLAYBACK_FILE: BoardId = BoardId(-3);
    /// Board receiving data from another streaming process.
    pub const STREAMING: BoardId = BoardId(-2);

    /// Raw identifier.
    #[must_use]
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl From<i32> for BoardId {
    fn from(value: i32) -> Self {
        BoardId(value)
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection parameters handed to the backend when a handle is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParams {
    /// Device address (Bluetooth MAC for wireless boards). Empty for
    /// boards that need none.
    #[serde(default)]
    pub address: String,

    /// How long a blocking `prepare_session` may wait for the board, in seconds.
    pub timeout_secs: u64,
}

impl InputParams {
    pub fn new(address: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            address: address.into(),
            timeout_secs,
        }
    }
}

/// Sample matrix returned by [`BoardShim::get_board_data`].
///
/// Row-major: `rows[r][s]` is sample `s` of data row `r`. Which rows carry
/// EEG, accelerometer, timestamps etc. is board specific.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardData {
    rows: Vec<Vec<f64>>,
}

impl BoardData {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    /// A matrix with `num_rows` rows and no samples.
    #[must_use]
    pub fn empty(num_rows: usize) -> Self {
        Self {
            rows: vec![Vec::new(); num_rows],
        }
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Samples per row. Uses the first row; see [`is_rectangular`](Self::is_rectangular).
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// `true` when every row holds the same number of samples.
    #[must_use]
    pub fn is_rectangular(&self) -> bool {
        let width = self.num_samples();
        self.rows.iter().all(|row| row.len() == width)
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }
}

/// One board session handle.
///
/// Mirrors the board SDK's session API. Implementations block on I/O where
/// the SDK does (`prepare_session` may wait up to the configured timeout).
pub trait BoardShim: Send {
    /// Board identifier this handle was created for.
    fn board_id(&self) -> BoardId;

    /// Open the session with the device.
    fn prepare_session(&mut self) -> BoardResult<()>;

    /// Close the session and free SDK resources.
    fn release_session(&mut self) -> BoardResult<()>;

    fn is_prepared(&self) -> bool;

    /// Start acquiring samples into the SDK's ring buffer.
    fn start_stream(&mut self) -> BoardResult<()>;

    fn stop_stream(&mut self) -> BoardResult<()>;

    fn is_streaming(&self) -> bool;

    /// Take all samples currently buffered, removing them from the buffer.
    fn get_board_data(&mut self) -> BoardResult<BoardData>;

    /// Number of data rows this board declares for [`BoardData`].
    fn get_num_rows(&self) -> BoardResult<usize>;

    /// Declared sampling rate in Hz.
    fn get_sampling_rate(&self) -> BoardResult<u32>;

    /// Row indices carrying EEG channels.
    fn get_eeg_channels(&self) -> BoardResult<Vec<usize>>;
}

/// Factory for board handles.
///
/// Each lifecycle case asks for a fresh handle and drops it at teardown, so
/// a backend must tolerate many create/drop cycles.
pub trait BoardBackend: Send + Sync {
    /// Create a handle for `board_id`. Creating a handle does not open a
    /// session; that happens in [`BoardShim::prepare_session`].
    fn create(&self, board_id: BoardId, params: &InputParams) -> BoardResult<Box<dyn BoardShim>>;
}
