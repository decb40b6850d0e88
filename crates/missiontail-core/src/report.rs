//! User-facing mission reports.
//!
//! The watcher emits [`Report`] values; a [`ReportSink`] decides where they
//! go. [`ConsoleFileSink`] prints every report and appends the persistent
//! ones to an optional report file with a local timestamp.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::warn;

use crate::policy::SkipReason;
use crate::segmenter::{MissionCompleted, MissionInterval};

/// Something worth telling the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// An eligible mission ended; the first counter query is pending.
    Waiting { wait: Duration },
    /// A query saw no change and another one will follow.
    NoChangeYet {
        attempt: u32,
        max_attempts: u32,
        wait: Duration,
    },
    /// The counter caught up with the mission.
    Increased {
        mission: MissionCompleted,
        delta: i64,
        new_total: i64,
    },
    /// The attempt budget ran out without a change.
    NoChange { attempts: u32 },
    /// A mission was resolved but not queried.
    Skipped {
        interval: MissionInterval,
        reason: SkipReason,
    },
    /// An end marker had no start marker within the scan bound.
    StartNotFound { end_ts: f64 },
}

impl Report {
    /// Whether the report belongs in the report file as well as the console.
    /// Skip diagnostics are console-only.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Skipped { .. } | Self::StartNotFound { .. })
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Waiting { wait } => format!(
                "Waiting {} for the counter service to sync...",
                format_duration(wait.as_secs_f64())
            ),
            Self::NoChangeYet {
                attempt,
                max_attempts,
                wait,
            } => format!(
                "No change yet ({attempt}/{max_attempts}), waiting {} more...",
                format_duration(wait.as_secs_f64())
            ),
            Self::Increased {
                mission,
                delta,
                new_total,
            } => {
                let events = match (mission.event_count, mission.event_count_known) {
                    (Some(count), true) => format!("{} events", format_thousands_u64(count)),
                    (Some(count), false) => {
                        format!("an estimated {} events", format_thousands_u64(count))
                    }
                    (None, _) => format!("an estimated {} events", format_thousands(*delta)),
                };
                format!(
                    "Mission lasted {} with {events}; counter rose by {}, new total {}.",
                    format_duration(mission.duration_secs),
                    format_thousands(*delta),
                    format_thousands(*new_total)
                )
            }
            Self::NoChange { attempts } => format!(
                "Counter did not change after {attempts} queries; giving up on this mission."
            ),
            Self::Skipped { interval, reason } => {
                let why = match reason {
                    SkipReason::TooShort => "too short",
                    SkipReason::TooFewEvents => "too few events",
                };
                let count = interval
                    .event_count
                    .map(|c| format!(", {} events", format_thousands_u64(c)))
                    .unwrap_or_default();
                format!(
                    "Mission end detected; duration {:.1}s{count} ({why}). Skipping counter query.",
                    interval.duration_secs()
                )
            }
            Self::StartNotFound { end_ts } => {
                format!("Mission end detected at {end_ts:.3}, but couldn't find start marker.")
            }
        }
    }
}

/// Destination for reports.
pub trait ReportSink {
    fn report(&mut self, report: &Report);
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    fn report(&mut self, report: &Report) {
        (**self).report(report);
    }
}

/// Prints to stdout and appends persistent reports to a file.
#[derive(Debug, Default)]
pub struct ConsoleFileSink {
    report_file: Option<PathBuf>,
}

impl ConsoleFileSink {
    #[must_use]
    pub fn new(report_file: Option<PathBuf>) -> Self {
        Self { report_file }
    }

    #[must_use]
    pub fn report_file(&self) -> Option<&Path> {
        self.report_file.as_deref()
    }

    fn append(&self, path: &Path, message: &str) {
        let line = format_report_line(Local::now(), message);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to append report");
        }
    }
}

impl ReportSink for ConsoleFileSink {
    fn report(&mut self, report: &Report) {
        let message = report.message();
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{message}").and_then(|()| stdout.flush()) {
            warn!(error = %e, "Failed to print report");
        }
        if report.is_persistent() {
            if let Some(path) = &self.report_file {
                self.append(path, &message);
            }
        }
    }
}

/// `[YYYY-mm-dd HH:MM:SS] message\n`
#[must_use]
pub fn format_report_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {message}\n", at.format("%Y-%m-%d %H:%M:%S"))
}

/// Integer with comma thousands separators.
#[must_use]
pub fn format_thousands(value: i64) -> String {
    let digits = format_thousands_u64(value.unsigned_abs());
    if value < 0 { format!("-{digits}") } else { digits }
}

fn format_thousands_u64(value: u64) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, ch) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Compact duration: `45s`, `8m20s`, `1h02m03s`. Rounded to whole seconds.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_duration(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.round() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}
