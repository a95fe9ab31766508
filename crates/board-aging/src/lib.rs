//! # board-aging
//!
//! Aging and regression harness for EEG board SDKs.
//!
//! The harness opens, streams from, stops and releases a board over and over
//! for a configured wall-clock duration. Every cycle is a *round* of short
//! lifecycle cases. Each case checks what the board reports and lands as
//! passed, failed, errored or skipped. Rounds and the whole run are summarised
//! in the log and, optionally, in a JSON-lines report.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use board_aging::{AgingConfig, AgingLoop, RoundExecutor, SyntheticBackend};
//!
//! fn main() -> board_aging::HarnessResult<()> {
//!     let config = AgingConfig::discover(None)?;
//!     config.validate()?;
//!     let duration = config.aging_duration()?;
//!
//!     let executor = RoundExecutor::from_config(Arc::new(SyntheticBackend::default()), config);
//!     let report = AgingLoop::new(executor, duration).run()?;
//!     println!("{} rounds, verdict {}", report.summary.rounds(), report.summary.verdict());
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`board`] | `BoardShim` session handle and `BoardBackend` factory traits |
//! | [`synthetic`] | In-process board emulating the SDK's session rules |
//! | [`cases`] | Lifecycle cases, session guard, outcome classification |
//! | [`runner`] | One round: every configured case, in order |
//! | [`aging`] | Rounds until the duration runs out, then a run summary |
//! | [`report`] | Result records and report sinks |
//!
//! Real hardware plugs in by implementing [`BoardBackend`] over the vendor
//! SDK bindings.

pub mod aging;
pub mod board;
pub mod cases;
pub mod config;
pub mod error;
pub mod report;
pub mod runner;
pub mod synthetic;

// ─── Public re-exports ──────────────────────────────────────────────────

pub use aging::{AgingLoop, AgingState};
pub use board::{BoardBackend, BoardData, BoardId, BoardShim, InputParams};
pub use cases::{CaseKind, LifecycleDriver, SessionGuard};
pub use config::{AgingConfig, BoardConfig, Expectations, PostStopPolicy, TimingConfig};
pub use error::{BoardError, BoardResult, ExitCode, HarnessError, HarnessResult};
pub use report::{
    AgingReport, AgingRunSummary, JsonLinesReport, Outcome, ReportSink, RoundSummary,
    TestCaseResult, Verdict,
};
pub use runner::{RoundExecutor, RoundReport};
pub use synthetic::{BoardDescription, SyntheticBackend};
