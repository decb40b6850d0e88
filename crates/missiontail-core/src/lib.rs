//! missiontail-core: Core library for missiontail
//!
//! This crate watches an append-only application log for "mission" intervals,
//! correlates each completed interval with an eventually-consistent external
//! counter, and reports how much the counter moved.
//!
//! # Architecture
//!
//! ```text
//! OffsetTailer → MissionSegmenter → ConvergencePoller → ReportSink
//!                  │  ├─ BackwardMarkerScanner
//!                  │  ├─ IntervalCounter
//!                  │  └─ DedupGuard
//!                  └─ EligibilityPolicy
//! ```
//!
//! # Modules
//!
//! - `tailer`: Incremental offset-tracked log tailing with rotation detection
//! - `scanner`: Bounded backward search for the most recent start marker
//! - `interval`: Event-line counting inside a byte range
//! - `policy`: Query-eligibility policies for completed missions
//! - `dedup`: Processed end-timestamp guard
//! - `segmenter`: Mission state machine over tailed lines
//! - `convergence`: Fixed-interval polling of the external counter
//! - `payload`: Typed tree walker for counter payloads
//! - `identity`: One-shot identifier resolution from historical log content
//! - `report`: Report events and the console/file sink
//! - `watcher`: The cooperative control loop
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod convergence;
pub mod dedup;
pub mod error;
pub mod identity;
pub mod interval;
pub mod logging;
pub mod payload;
pub mod policy;
pub mod report;
pub mod scanner;
pub mod segmenter;
pub mod tailer;
pub mod timestamp;
pub mod watcher;

pub use error::{Error, Result};
