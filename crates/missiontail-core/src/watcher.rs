//! The cooperative control loop.
//!
//! One loop owns every piece of state: it polls the log size on a fixed
//! interval, feeds new lines through the [`MissionSegmenter`], and for each
//! eligible mission blocks in the [`ConvergencePoller`] until the counter
//! catches up. Lines appended during a convergence wait are picked up by the
//! next read.
//!
//! Both suspension points (the idle tick and the convergence wait) race the
//! shutdown signal, so Ctrl+C is observed within one poll interval.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::convergence::{
    AttemptStatus, ConvergencePoller, CounterSource, SyncOutcome, shutdown_requested,
};
use crate::error::Result;
use crate::report::{Report, ReportSink};
use crate::segmenter::{MissionCompleted, MissionSegmenter, SegmentEvent};
use crate::tailer::OffsetTailer;

/// Counters accumulated over one watcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub lines_read: u64,
    pub missions_completed: u64,
    pub missions_skipped: u64,
    pub counter_increases: u64,
    pub read_errors: u64,
}

/// Whether the loop should keep going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Log watcher bound to one counter source and one report sink.
pub struct MissionWatcher<C, R> {
    tailer: OffsetTailer,
    segmenter: MissionSegmenter,
    poller: ConvergencePoller,
    source: C,
    sink: R,
    baseline: i64,
    poll_interval: Duration,
    debug: bool,
    last_size: u64,
    stats: WatcherStats,
}

impl<C, R> MissionWatcher<C, R>
where
    C: CounterSource,
    R: ReportSink,
{
    /// Build a watcher for `config.general.log_path`, starting from a
    /// confirmed counter `baseline`.
    pub fn new(config: &Config, source: C, sink: R, baseline: i64) -> Self {
        let path = &config.general.log_path;
        Self {
            tailer: OffsetTailer::new(path),
            segmenter: MissionSegmenter::new(path, config),
            poller: ConvergencePoller::from_config(&config.sync),
            source,
            sink,
            baseline,
            poll_interval: config.watch.poll_interval(),
            debug: config.general.debug,
            last_size: 0,
            stats: WatcherStats::default(),
        }
    }

    /// Last confirmed counter value.
    #[must_use]
    pub fn baseline(&self) -> i64 {
        self.baseline
    }

    #[must_use]
    pub fn stats(&self) -> WatcherStats {
        self.stats
    }

    /// Mark existing log content as seen. Returns the offset primed to.
    pub fn prime(&mut self) -> Result<u64> {
        let offset = self.tailer.prime_to_end()?;
        self.last_size = offset;
        Ok(offset)
    }

    /// Run until shutdown is requested.
    ///
    /// Call [`Self::prime`] first; otherwise the whole existing log is
    /// processed on the first tick.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> WatcherStats {
        info!(
            path = %self.tailer.path().display(),
            offset = self.tailer.position(),
            poll_ms = self.poll_interval.as_millis() as u64,
            baseline = self.baseline,
            "Watching log"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            let stop = tokio::select! {
                _ = ticker.tick() => false,
                () = shutdown_requested(&mut shutdown) => true,
            };
            if stop || self.tick(&mut shutdown).await == Flow::Stop {
                break;
            }
        }

        info!(stats = ?self.stats, "Watcher stopped");
        self.stats
    }

    /// One poll step: read if the size changed, then handle every new line.
    async fn tick(&mut self, shutdown: &mut watch::Receiver<bool>) -> Flow {
        let size = match self.tailer.file_size() {
            Ok(size) => size,
            Err(e) => {
                self.stats.read_errors += 1;
                warn!(error = %e, "Failed to stat log; treating as no new data");
                return Flow::Continue;
            }
        };
        if size == self.last_size {
            return Flow::Continue;
        }

        // A failed read leaves `last_size` alone so the next tick retries.
        let lines = match self.tailer.read_new() {
            Ok(lines) => lines,
            Err(e) => {
                self.stats.read_errors += 1;
                warn!(error = %e, "Failed to read log; treating as no new data");
                return Flow::Continue;
            }
        };
        self.last_size = size;
        self.stats.lines_read += lines.len() as u64;

        for line in &lines {
            let event = match self.segmenter.process_line(line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!(offset = line.start_offset, error = %e, "Failed to resolve mission");
                    continue;
                }
            };
            if self.handle(event, shutdown).await == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    async fn handle(&mut self, event: SegmentEvent, shutdown: &mut watch::Receiver<bool>) -> Flow {
        match event {
            SegmentEvent::Completed(mission) => {
                self.stats.missions_completed += 1;
                return self.converge(mission, shutdown).await;
            }
            SegmentEvent::Skipped { interval, reason } => {
                self.stats.missions_skipped += 1;
                debug!(duration_secs = interval.duration_secs(), ?reason, "Mission skipped");
                if self.debug {
                    self.sink.report(&Report::Skipped { interval, reason });
                }
            }
            SegmentEvent::StartNotFound { end_ts, end_offset } => {
                debug!(end_ts, end_offset, "Start marker not found");
                if self.debug {
                    self.sink.report(&Report::StartNotFound { end_ts });
                }
            }
            SegmentEvent::Malformed { start_ts, end_ts } => {
                warn!(start_ts, end_ts, "Mission end precedes its start; ignoring");
            }
        }
        Flow::Continue
    }

    async fn converge(
        &mut self,
        mission: MissionCompleted,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Flow {
        let wait = self.poller.wait();
        self.sink.report(&Report::Waiting { wait });

        let sink = &mut self.sink;
        let outcome = self
            .poller
            .await_increase_with(&self.source, self.baseline, shutdown, |status: &AttemptStatus| {
                if status.will_retry() {
                    sink.report(&Report::NoChangeYet {
                        attempt: status.attempt,
                        max_attempts: status.max_attempts,
                        wait,
                    });
                }
            })
            .await;

        match outcome {
            SyncOutcome::Increased {
                delta,
                new_value,
                attempts,
            } => {
                info!(delta, new_value, attempts, "Counter converged");
                self.baseline = new_value;
                self.stats.counter_increases += 1;
                self.sink.report(&Report::Increased {
                    mission,
                    delta,
                    new_total: new_value,
                });
                Flow::Continue
            }
            SyncOutcome::NoChange { attempts } => {
                self.sink.report(&Report::NoChange { attempts });
                Flow::Continue
            }
            SyncOutcome::Cancelled { .. } => Flow::Stop,
        }
    }
}
