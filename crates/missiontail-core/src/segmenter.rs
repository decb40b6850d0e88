//! Mission segmentation over tailed log lines.
//!
//! The segmenter only reacts to end-marker lines. For each new end marker it
//! looks backward for the start marker that opened the mission, optionally
//! counts event lines in between, and applies the eligibility policy once.
//!
//! ```text
//! line ─► has end marker? ─► parse end_ts ─► dedup ─► backward scan ─► count ─► policy
//!              │ no              │ fail        │ seen     │ none                  │
//!              ▼                 ▼             ▼          ▼                       ▼
//!            ignore            ignore        ignore   StartNotFound      Completed / Skipped
//! ```

use std::path::Path;

use memchr::memmem::Finder;
use tracing::{debug, warn};

use crate::config::Config;
use crate::dedup::DedupGuard;
use crate::error::Result;
use crate::interval::IntervalCounter;
use crate::policy::{Eligibility, EligibilityPolicy, SkipReason};
use crate::scanner::BackwardMarkerScanner;
use crate::tailer::TailedLine;
use crate::timestamp::parse_leading_timestamp;

/// A resolved mission span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionInterval {
    pub start_ts: f64,
    pub end_ts: f64,
    /// Offset of the start-marker line.
    pub start_offset: u64,
    /// Offset of the end-marker line.
    pub end_offset: u64,
    /// Event lines between the markers, when an event pattern is configured.
    pub event_count: Option<u64>,
}

impl MissionInterval {
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.end_ts - self.start_ts
    }
}

/// An eligible mission, handed to the convergence stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionCompleted {
    pub start_ts: f64,
    pub end_ts: f64,
    pub duration_secs: f64,
    pub event_count: Option<u64>,
    /// False when the count is missing or the mission qualified on duration
    /// alone, so the count should be presented as an estimate.
    pub event_count_known: bool,
}

/// Result of handling one end-marker line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentEvent {
    /// Eligible mission; query the counter.
    Completed(MissionCompleted),
    /// Mission resolved but not worth querying.
    Skipped {
        interval: MissionInterval,
        reason: SkipReason,
    },
    /// No start marker within the scan bound.
    StartNotFound { end_ts: f64, end_offset: u64 },
    /// Start timestamp is not before the end timestamp.
    Malformed { start_ts: f64, end_ts: f64 },
}

/// Mission state machine for one log file.
#[derive(Debug)]
pub struct MissionSegmenter {
    end_marker: Finder<'static>,
    scanner: BackwardMarkerScanner,
    counter: Option<IntervalCounter>,
    policy: EligibilityPolicy,
    processed: DedupGuard,
}

impl MissionSegmenter {
    /// Build a segmenter for `path` from the marker, scan and policy settings.
    #[must_use]
    pub fn new(path: &Path, config: &Config) -> Self {
        let markers = &config.markers;
        Self {
            end_marker: Finder::new(markers.end.as_bytes()).into_owned(),
            scanner: BackwardMarkerScanner::new(path, &markers.start, config.scan),
            counter: markers
                .event_pattern
                .as_deref()
                .map(|pattern| IntervalCounter::new(path, pattern)),
            policy: config.policy,
            processed: DedupGuard::new(),
        }
    }

    /// Processed end timestamps.
    #[must_use]
    pub fn processed(&self) -> &DedupGuard {
        &self.processed
    }

    /// Handle one tailed line. Returns `Ok(None)` for lines that are not new
    /// end markers.
    ///
    /// An end marker is recorded as processed before the backward scan, so a
    /// scan failure does not cause the same end to be retried.
    pub fn process_line(&mut self, line: &TailedLine) -> Result<Option<SegmentEvent>> {
        if self.end_marker.find(line.text.as_bytes()).is_none() {
            return Ok(None);
        }

        let end_ts = match parse_leading_timestamp(&line.text) {
            Ok(ts) => ts,
            Err(err) => {
                warn!(offset = line.start_offset, error = %err, "End marker without timestamp; ignoring");
                return Ok(None);
            }
        };

        if !self.processed.mark_seen(end_ts) {
            debug!(end_ts, offset = line.start_offset, "End marker already processed");
            return Ok(None);
        }

        let Some(start) = self.scanner.find_last_marker_before(line.start_offset)? else {
            return Ok(Some(SegmentEvent::StartNotFound {
                end_ts,
                end_offset: line.start_offset,
            }));
        };

        if end_ts <= start.timestamp {
            return Ok(Some(SegmentEvent::Malformed {
                start_ts: start.timestamp,
                end_ts,
            }));
        }

        let event_count = match &self.counter {
            Some(counter) => Some(counter.count_between(start.offset, line.start_offset)?),
            None => None,
        };

        let interval = MissionInterval {
            start_ts: start.timestamp,
            end_ts,
            start_offset: start.offset,
            end_offset: line.start_offset,
            event_count,
        };

        let duration_secs = interval.duration_secs();
        debug!(
            start_ts = interval.start_ts,
            end_ts,
            duration_secs,
            event_count = ?event_count,
            policy = self.policy.kind(),
            "Mission interval resolved"
        );

        let event = match self.policy.evaluate(duration_secs, event_count) {
            Eligibility::Eligible { count_known } => SegmentEvent::Completed(MissionCompleted {
                start_ts: interval.start_ts,
                end_ts,
                duration_secs,
                event_count,
                event_count_known: count_known,
            }),
            Eligibility::Skip(reason) => SegmentEvent::Skipped { interval, reason },
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tailer::OffsetTailer;
    use std::io::Write;

    const START: &str = "GameRulesImpl::StartRound()";
    const END: &str = "Game [Info]: CommitInventoryChangesToDB";

    fn config(policy: EligibilityPolicy, event_pattern: Option<&str>) -> Config {
        let mut config = Config::default();
        config.policy = policy;
        config.markers.event_pattern = event_pattern.map(str::to_string);
        config.scan.chunk_size = 64;
        config
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn run(segmenter: &mut MissionSegmenter, tailer: &mut OffsetTailer) -> Vec<SegmentEvent> {
        tailer
            .read_new()
            .unwrap()
            .iter()
            .filter_map(|line| segmenter.process_line(line).unwrap())
            .collect()
    }

    #[test]
    fn completed_mission_with_event_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut text = format!("1000.0 Script [Info]: {START}\n");
        for i in 0..20 {
            text.push_str(&format!("{}.0 AI [Info]: SpawnEnemy drone\n", 1001 + i));
        }
        text.push_str(&format!("1500.0 {END}\n"));
        append(&path, &text);

        let policy = EligibilityPolicy::CountOrFallback {
            count_threshold: 15,
            fallback_duration_secs: 360.0,
        };
        let mut segmenter = MissionSegmenter::new(&path, &config(policy, Some("SpawnEnemy")));
        let mut tailer = OffsetTailer::new(&path);
        let events = run(&mut segmenter, &mut tailer);

        assert_eq!(
            events,
            vec![SegmentEvent::Completed(MissionCompleted {
                start_ts: 1000.0,
                end_ts: 1500.0,
                duration_secs: 500.0,
                event_count: Some(20),
                event_count_known: true,
            })]
        );
    }

    #[test]
    fn repeated_end_marker_is_processed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, &format!("100.0 {START}\n600.0 {END}\n600.0 {END}\n"));

        let mut segmenter =
            MissionSegmenter::new(&path, &config(EligibilityPolicy::default(), None));
        let mut tailer = OffsetTailer::new(&path);
        let events = run(&mut segmenter, &mut tailer);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SegmentEvent::Completed(_)));

        // Re-delivery after a truncate-and-rewrite is absorbed as well.
        std::fs::write(&path, format!("100.0 {START}\n600.0 {END}\n")).unwrap();
        assert!(run(&mut segmenter, &mut tailer).is_empty());
        assert_eq!(segmenter.processed().len(), 1);
    }

    #[test]
    fn short_mission_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, &format!("100.0 {START}\n200.0 {END}\n"));

        let mut segmenter =
            MissionSegmenter::new(&path, &config(EligibilityPolicy::default(), None));
        let mut tailer = OffsetTailer::new(&path);
        let events = run(&mut segmenter, &mut tailer);
        assert!(matches!(
            events.as_slice(),
            [SegmentEvent::Skipped {
                reason: SkipReason::TooShort,
                ..
            }]
        ));
    }

    #[test]
    fn end_without_start_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, &format!("50.0 boot\n900.0 {END}\n"));

        let mut segmenter =
            MissionSegmenter::new(&path, &config(EligibilityPolicy::default(), None));
        let mut tailer = OffsetTailer::new(&path);
        let events = run(&mut segmenter, &mut tailer);
        assert_eq!(
            events,
            vec![SegmentEvent::StartNotFound {
                end_ts: 900.0,
                end_offset: 10
            }]
        );
    }

    #[test]
    fn end_before_start_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, &format!("900.0 {START}\n800.0 {END}\n"));

        let mut segmenter =
            MissionSegmenter::new(&path, &config(EligibilityPolicy::default(), None));
        let mut tailer = OffsetTailer::new(&path);
        assert_eq!(
            run(&mut segmenter, &mut tailer),
            vec![SegmentEvent::Malformed {
                start_ts: 900.0,
                end_ts: 800.0
            }]
        );
    }

    #[test]
    fn end_marker_without_timestamp_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, &format!("100.0 {START}\n{END}\n"));

        let mut segmenter =
            MissionSegmenter::new(&path, &config(EligibilityPolicy::default(), None));
        let mut tailer = OffsetTailer::new(&path);
        assert!(run(&mut segmenter, &mut tailer).is_empty());
        assert!(segmenter.processed().is_empty());
    }

    #[test]
    fn start_marker_on_end_line_is_not_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, &format!("100.0 {START}\n700.0 {END} {START}\n"));

        let mut segmenter =
            MissionSegmenter::new(&path, &config(EligibilityPolicy::default(), None));
        let mut tailer = OffsetTailer::new(&path);
        let events = run(&mut segmenter, &mut tailer);
        let [SegmentEvent::Completed(done)] = events.as_slice() else {
            panic!("expected one completed mission, got {events:?}");
        };
        assert_eq!(done.start_ts, 100.0);
        assert!(!done.event_count_known);
    }
}
