//! # Error Types
//!
//! Two families of errors live here:
//!
//! - [`BoardError`]: everything a board SDK call can fail with. Declared
//!   device errors carry the vendor's machine-readable [`ExitCode`], which the
//!   lifecycle cases use to tell an *expected* failure (a timeout test that
//!   times out) from a real one.
//! - [`HarnessError`]: failures in the harness's own bookkeeping (config,
//!   report files). These are the only errors allowed to end an aging run.
//!
//! ## Exit Code Mapping
//!
//! Board SDKs report failures as small integers. [`BoardError::from_exit_code`]
//! maps known codes to [`ExitCode`] and keeps unknown ones verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenient Result alias for board SDK operations.
pub type BoardResult<T> = std::result::Result<T, BoardError>;

/// Convenient Result alias for harness operations.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Exit codes declared by the board SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    PortAlreadyOpen = 1,
    UnableToOpenPort = 2,
    SetPort = 3,
    BoardWrite = 4,
    IncomingMessage = 5,
    InitialMessage = 6,
    /// The board did not answer within the caller-supplied timeout.
    BoardNotReady = 7,
    StreamAlreadyRun = 8,
    InvalidBufferSize = 9,
    StreamThread = 10,
    StreamThreadIsNotRunning = 11,
    EmptyBuffer = 12,
    InvalidArguments = 13,
    UnsupportedBoard = 14,
    /// No session exists for this handle (never prepared, or bad address).
    BoardNotCreated = 15,
    AnotherBoardIsCreated = 16,
    General = 17,
    SyncTimeout = 18,
}

impl ExitCode {
    const ALL: [ExitCode; 18] = [
        ExitCode::PortAlreadyOpen,
        ExitCode::UnableToOpenPort,
        ExitCode::SetPort,
        ExitCode::BoardWrite,
        ExitCode::IncomingMessage,
        ExitCode::InitialMessage,
        ExitCode::BoardNotReady,
        ExitCode::StreamAlreadyRun,
        ExitCode::InvalidBufferSize,
        ExitCode::StreamThread,
        ExitCode::StreamThreadIsNotRunning,
        ExitCode::EmptyBuffer,
        ExitCode::InvalidArguments,
        ExitCode::UnsupportedBoard,
        ExitCode::BoardNotCreated,
        ExitCode::AnotherBoardIsCreated,
        ExitCode::General,
        ExitCode::SyncTimeout,
    ];

    /// Look up a raw SDK exit code. `0` (status ok) and unknown values
    /// return `None`.
    #[must_use]
    pub fn from_raw(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_raw() == code)
    }

    /// The raw integer the SDK uses for this code.
    #[must_use]
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// SDK-style constant name, as it shows up in vendor logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ExitCode::PortAlreadyOpen => "PORT_ALREADY_OPEN_ERROR",
            ExitCode::UnableToOpenPort => "UNABLE_TO_OPEN_PORT_ERROR",
            ExitCode::SetPort => "SET_PORT_ERROR",
            ExitCode::BoardWrite => "BOARD_WRITE_ERROR",
            ExitCode::IncomingMessage => "INCOMMING_MSG_ERROR",
            ExitCode::InitialMessage => "INITIAL_MSG_ERROR",
            ExitCode::BoardNotReady => "BOARD_NOT_READY_ERROR",
            ExitCode::StreamAlreadyRun => "STREAM_ALREADY_RUN_ERROR",
            ExitCode::InvalidBufferSize => "INVALID_BUFFER_SIZE_ERROR",
            ExitCode::StreamThread => "STREAM_THREAD_ERROR",
            ExitCode::StreamThreadIsNotRunning => "STREAM_THREAD_IS_NOT_RUNNING",
            ExitCode::EmptyBuffer => "EMPTY_BUFFER_ERROR",
            ExitCode::InvalidArguments => "INVALID_ARGUMENTS_ERROR",
            ExitCode::UnsupportedBoard => "UNSUPPORTED_BOARD_ERROR",
            ExitCode::BoardNotCreated => "BOARD_NOT_CREATED_ERROR",
            ExitCode::AnotherBoardIsCreated => "ANOTHER_BOARD_IS_CREATED_ERROR",
            ExitCode::General => "GENERAL_ERROR",
            ExitCode::SyncTimeout => "SYNC_TIMEOUT_ERROR",
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name(), self.as_raw())
    }
}

/// All errors a board SDK call can produce.
#[derive(Error, Debug)]
pub enum BoardError {
    // ─── Declared device errors ─────────────────────────────────────
    /// A device error declared by the SDK, with its exit code.
    #[error("{message} ({code})")]
    Device { code: ExitCode, message: String },

    /// The SDK reported an exit code this harness does not know.
    #[error("{message} (unknown exit code {code})")]
    UnknownExitCode { code: i32, message: String },

    // ─── Everything else ────────────────────────────────────────────
    /// The backend failed outside the SDK's declared error contract.
    #[error("Board backend failure: {reason}")]
    Backend { reason: String },

    /// Filesystem or I/O error raised by a backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoardError {
    /// Build a declared device error.
    pub fn device(code: ExitCode, message: impl Into<String>) -> Self {
        BoardError::Device {
            code,
            message: message.into(),
        }
    }

    /// Map a raw SDK exit code + message to the most specific variant.
    pub fn from_exit_code(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match ExitCode::from_raw(code) {
            Some(code) => BoardError::Device { code, message },
            None => BoardError::UnknownExitCode { code, message },
        }
    }

    /// The declared exit code, if this is a device error with a known code.
    #[must_use]
    pub fn code(&self) -> Option<ExitCode> {
        match self {
            BoardError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` for errors the SDK declares as device/business errors.
    /// Cases turn these into `Failed`; anything else becomes `Errored`.
    #[must_use]
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            BoardError::Device { .. } | BoardError::UnknownExitCode { .. }
        )
    }
}

/// Failures in the harness itself. These abort an aging run.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration file error (missing, malformed, or invalid values).
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    /// Writing or finalizing a run report failed.
    #[error("Report error: {reason}")]
    ReportError { reason: String },

    /// Filesystem or I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "config-toml")]
impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::ConfigError {
            reason: err.to_string(),
        }
    }
}
