//! # Configuration
//!
//! [`AgingConfig`] holds everything an aging run needs: which board(s) to
//! drive, how long to keep going, which cases make up a round, and what the
//! cases should expect from the board.
//!
//! ## Loading Priority
//!
//! 1. TOML config file at an explicit path
//! 2. File named by the `BOARD_AGING_CONFIG` environment variable
//! 3. `./board-aging.toml` in the current directory
//! 4. Built-in defaults (synthetic board, half an hour, the six core cases)
//!
//! `BOARD_AGING_ADDRESS`, `BOARD_AGING_BOARD_ID` and `BOARD_AGING_HOURS`
//! override the loaded values. Command-line flags are applied on top by the
//! caller.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::{BoardId, InputParams};
use crate::cases::CaseKind;
use crate::error::{HarnessError, HarnessResult};

/// Config file looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "board-aging.toml";

/// Environment variable naming a config file.
pub const CONFIG_PATH_ENV: &str = "BOARD_AGING_CONFIG";

const ADDRESS_ENV: &str = "BOARD_AGING_ADDRESS";
const BOARD_ID_ENV: &str = "BOARD_AGING_BOARD_ID";
const HOURS_ENV: &str = "BOARD_AGING_HOURS";

/// Default `prepare_session` timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default aging duration in hours.
const DEFAULT_AGING_HOURS: f64 = 0.5;

const DEFAULT_STREAM_SETTLE_MS: u64 = 3_000;
const DEFAULT_STOP_SETTLE_MS: u64 = 5_000;
const DEFAULT_RELEASE_SETTLE_MS: u64 = 3_000;

const DEFAULT_MIN_EEG_CHANNELS: usize = 1;

/// Configuration for an aging run.
///
/// ```
/// use board_aging::config::AgingConfig;
///
/// let config = AgingConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.cases.len(), 6);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingConfig {
    /// Board under test.
    #[serde(default)]
    pub board: BoardConfig,

    /// Second board for the two-board cases. Those cases are skipped when
    /// this is absent.
    #[serde(default)]
    pub secondary: Option<BoardConfig>,

    /// Wall-clock length of the run in hours. Fractions are allowed.
    #[serde(default = "default_aging_hours")]
    pub aging_hours: f64,

    /// Cases executed each round, in order.
    #[serde(default = "default_cases")]
    pub cases: Vec<CaseKind>,

    #[serde(default)]
    pub expectations: Expectations,

    #[serde(default)]
    pub timing: TimingConfig,

    /// Directory for run log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

/// One board: SDK identifier plus connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_board_id")]
    pub board_id: BoardId,

    /// Device address (Bluetooth MAC). Empty for the synthetic board.
    #[serde(default)]
    pub address: String,

    /// `prepare_session` timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// What the lifecycle cases expect from the board(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectations {
    /// Minimum number of EEG channels the primary board must report.
    #[serde(default = "default_min_eeg_channels")]
    pub min_eeg_channels: usize,

    /// Exact sampling rate the primary board must report, in Hz.
    #[serde(default)]
    pub sampling_rate: Option<u32>,

    #[serde(default = "default_min_eeg_channels")]
    pub secondary_min_eeg_channels: usize,

    #[serde(default)]
    pub secondary_sampling_rate: Option<u32>,

    /// What data reads must look like once a stream is stopped.
    #[serde(default)]
    pub post_stop: PostStopPolicy,
}

/// Post-stop data check applied by the stop-stream cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStopPolicy {
    /// The first read drains what was buffered; the next read is empty.
    #[default]
    DrainedEmpty,
    /// A read after stop must not return the board's full row count.
    RowMismatch,
    /// No data check after stop.
    Unchecked,
}

/// Settle waits inside the cases, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after `start_stream` before reading data.
    #[serde(default = "default_stream_settle")]
    pub stream_settle_ms: u64,

    /// Wait after `stop_stream` before reading data.
    #[serde(default = "default_stop_settle")]
    pub stop_settle_ms: u64,

    /// Wait between prepare and release in the release case.
    #[serde(default = "default_release_settle")]
    pub release_settle_ms: u64,
}

// ─── Default value functions ────────────────────────────────────────────

fn default_board_id() -> BoardId {
    BoardId::SYNTHETIC
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_aging_hours() -> f64 {
    DEFAULT_AGING_HOURS
}

fn default_cases() -> Vec<CaseKind> {
    CaseKind::CORE.to_vec()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_min_eeg_channels() -> usize {
    DEFAULT_MIN_EEG_CHANNELS
}

fn default_stream_settle() -> u64 {
    DEFAULT_STREAM_SETTLE_MS
}

fn default_stop_settle() -> u64 {
    DEFAULT_STOP_SETTLE_MS
}

fn default_release_settle() -> u64 {
    DEFAULT_RELEASE_SETTLE_MS
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            board: BoardConfig::default(),
            secondary: None,
            aging_hours: DEFAULT_AGING_HOURS,
            cases: default_cases(),
            expectations: Expectations::default(),
            timing: TimingConfig::default(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            board_id: BoardId::SYNTHETIC,
            address: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for Expectations {
    fn default() -> Self {
        Self {
            min_eeg_channels: DEFAULT_MIN_EEG_CHANNELS,
            sampling_rate: None,
            secondary_min_eeg_channels: DEFAULT_MIN_EEG_CHANNELS,
            secondary_sampling_rate: None,
            post_stop: PostStopPolicy::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stream_settle_ms: DEFAULT_STREAM_SETTLE_MS,
            stop_settle_ms: DEFAULT_STOP_SETTLE_MS,
            release_settle_ms: DEFAULT_RELEASE_SETTLE_MS,
        }
    }
}

impl BoardConfig {
    pub fn new(board_id: BoardId, address: impl Into<String>) -> Self {
        Self {
            board_id,
            address: address.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Connection parameters for a new handle on this board.
    #[must_use]
    pub fn input_params(&self) -> InputParams {
        InputParams::new(self.address.clone(), self.timeout_secs)
    }
}

impl TimingConfig {
    /// No settle waits at all. Handy for tests against in-process boards.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            stream_settle_ms: 0,
            stop_settle_ms: 0,
            release_settle_ms: 0,
        }
    }

    #[must_use]
    pub fn stream_settle(&self) -> Duration {
        Duration::from_millis(self.stream_settle_ms)
    }

    #[must_use]
    pub fn stop_settle(&self) -> Duration {
        Duration::from_millis(self.stop_settle_ms)
    }

    #[must_use]
    pub fn release_settle(&self) -> Duration {
        Duration::from_millis(self.release_settle_ms)
    }
}

// ─── AgingConfig impl ───────────────────────────────────────────────────

impl AgingConfig {
    /// Config for one board, everything else default.
    pub fn new(board_id: BoardId, address: impl Into<String>) -> Self {
        Self {
            board: BoardConfig::new(board_id, address),
            ..Self::default()
        }
    }

    /// Load config from a TOML file, with environment variable overrides.
    #[cfg(feature = "config-toml")]
    pub fn from_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        Self::from_file_with(path.as_ref(), env_lookup)
    }

    /// Discover and load config from the standard search path:
    ///
    /// 1. Explicit path (if `Some`)
    /// 2. `BOARD_AGING_CONFIG` environment variable
    /// 3. `./board-aging.toml`
    ///
    /// Falls back to defaults (plus environment overrides) if no file is found.
    #[cfg(feature = "config-toml")]
    pub fn discover(explicit_path: Option<&Path>) -> HarnessResult<Self> {
        Self::discover_in(explicit_path, Path::new("."), env_lookup)
    }

    /// Defaults plus environment overrides, without touching the filesystem.
    pub fn from_env() -> HarnessResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(env_lookup)?;
        Ok(config)
    }

    #[cfg(feature = "config-toml")]
    fn from_file_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> HarnessResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| HarnessError::ConfigError {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    #[cfg(feature = "config-toml")]
    fn discover_in(
        explicit_path: Option<&Path>,
        cwd: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> HarnessResult<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file_with(path, lookup);
        }

        if let Some(path) = lookup(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::from_file_with(&path, lookup);
            }
            tracing::warn!(path = %path.display(), "{CONFIG_PATH_ENV} points to a missing file");
        }

        let local_path = cwd.join(DEFAULT_CONFIG_FILE);
        if local_path.exists() {
            return Self::from_file_with(&local_path, lookup);
        }

        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Apply `BOARD_AGING_*` overrides read through `lookup`.
    ///
    /// `lookup` returns the value for a variable name, e.g.
    /// `|key| std::env::var(key).ok()`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> HarnessResult<()> {
        if let Some(address) = lookup(ADDRESS_ENV) {
            self.board.address = address;
        }
        if let Some(raw) = lookup(BOARD_ID_ENV) {
            let id: i32 = raw.trim().parse().map_err(|_| HarnessError::ConfigError {
                reason: format!("{BOARD_ID_ENV} must be an integer board id, got '{raw}'"),
            })?;
            self.board.board_id = BoardId(id);
        }
        if let Some(raw) = lookup(HOURS_ENV) {
            self.aging_hours = raw.trim().parse().map_err(|_| HarnessError::ConfigError {
                reason: format!("{HOURS_ENV} must be a number of hours, got '{raw}'"),
            })?;
        }
        Ok(())
    }

    /// Reject values the aging loop cannot run with.
    pub fn validate(&self) -> HarnessResult<()> {
        if !self.aging_hours.is_finite() || self.aging_hours < 0.0 {
            return Err(HarnessError::ConfigError {
                reason: format!(
                    "aging_hours must be a finite, non-negative number, got {}",
                    self.aging_hours
                ),
            });
        }
        if self.cases.is_empty() {
            return Err(HarnessError::ConfigError {
                reason: "cases must name at least one case".into(),
            });
        }
        if self.board.timeout_secs == 0 {
            return Err(HarnessError::ConfigError {
                reason: "board.timeout_secs must be at least 1".into(),
            });
        }
        if let Some(secondary) = &self.secondary {
            if secondary.timeout_secs == 0 {
                return Err(HarnessError::ConfigError {
                    reason: "secondary.timeout_secs must be at least 1".into(),
                });
            }
        }
        Ok(())
    }

    /// Total run length as a [`Duration`].
    pub fn aging_duration(&self) -> HarnessResult<Duration> {
        Duration::try_from_secs_f64(self.aging_hours * 3600.0).map_err(|e| {
            HarnessError::ConfigError {
                reason: format!("aging_hours {} is not a usable duration: {e}", self.aging_hours),
            }
        })
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
