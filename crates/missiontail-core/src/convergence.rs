//! Fixed-interval polling of an eventually-consistent counter.
//!
//! The counter service is known to lag behind the application by a roughly
//! constant few minutes. Each attempt therefore waits first and queries
//! second, with no backoff growth, until the value exceeds the baseline or the
//! attempt budget runs out. Failed queries are transient and simply use up an
//! attempt.
//!
//! # Usage
//!
//! ```rust,ignore
//! let poller = ConvergencePoller::new(config.sync.max_attempts, config.sync.wait());
//! match poller.await_increase(&source, baseline, &mut shutdown).await {
//!     SyncOutcome::Increased { delta, new_value, .. } => { /* report */ }
//!     SyncOutcome::NoChange { .. } | SyncOutcome::Cancelled { .. } => {}
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::CounterError;

/// Boxed future returned by [`CounterSource::fetch`].
pub type CounterFuture<'a> = Pin<Box<dyn Future<Output = Result<i64, CounterError>> + Send + 'a>>;

/// Capability to read the current external counter value.
pub trait CounterSource {
    fn fetch(&self) -> CounterFuture<'_>;
}

/// Final result of one convergence wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The counter moved above the baseline.
    Increased {
        delta: i64,
        new_value: i64,
        attempts: u32,
    },
    /// Every attempt observed the baseline (or failed).
    NoChange { attempts: u32 },
    /// Shutdown was requested during a wait.
    Cancelled { attempts: u32 },
}

/// What a single attempt observed; passed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptStatus {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Fetched value, or the transient error that replaced it.
    pub observed: Result<i64, CounterError>,
}

impl AttemptStatus {
    /// Whether another attempt will follow this unsuccessful one.
    #[must_use]
    pub fn will_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// Bounded fixed-interval poller.
#[derive(Debug, Clone, Copy)]
pub struct ConvergencePoller {
    max_attempts: u32,
    wait: Duration,
}

impl ConvergencePoller {
    #[must_use]
    pub fn new(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
        }
    }

    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.max_attempts, config.wait())
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll until the counter exceeds `baseline`.
    pub async fn await_increase<S>(
        &self,
        source: &S,
        baseline: i64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SyncOutcome
    where
        S: CounterSource + ?Sized,
    {
        self.await_increase_with(source, baseline, shutdown, |_| {})
            .await
    }

    /// Like [`Self::await_increase`], reporting every unsuccessful attempt to
    /// `on_attempt`.
    pub async fn await_increase_with<S, F>(
        &self,
        source: &S,
        baseline: i64,
        shutdown: &mut watch::Receiver<bool>,
        mut on_attempt: F,
    ) -> SyncOutcome
    where
        S: CounterSource + ?Sized,
        F: FnMut(&AttemptStatus),
    {
        for attempt in 1..=self.max_attempts {
            if sleep_or_shutdown(self.wait, shutdown).await {
                info!(attempt, "Convergence wait cancelled");
                return SyncOutcome::Cancelled {
                    attempts: attempt - 1,
                };
            }

            let observed = source.fetch().await;
            match &observed {
                Ok(value) if *value > baseline => {
                    debug!(attempt, baseline, new_value = value, "Counter increased");
                    return SyncOutcome::Increased {
                        delta: value.saturating_sub(baseline),
                        new_value: *value,
                        attempts: attempt,
                    };
                }
                Ok(value) => {
                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        baseline,
                        observed = value,
                        "Counter unchanged"
                    );
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Counter query failed; counting as no change"
                    );
                }
            }

            on_attempt(&AttemptStatus {
                attempt,
                max_attempts: self.max_attempts,
                observed,
            });
        }

        SyncOutcome::NoChange {
            attempts: self.max_attempts,
        }
    }
}

/// Resolve once shutdown is requested. Never resolves if the sender is
/// dropped without requesting it.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `true` when shutdown was requested.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = shutdown_requested(shutdown) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed sequence; repeats the last entry once exhausted.
    struct Scripted {
        values: Mutex<VecDeque<Result<i64, CounterError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(values: Vec<Result<i64, CounterError>>) -> Self {
            Self {
                values: Mutex::new(values.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CounterSource for Scripted {
        fn fetch(&self) -> CounterFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut values = self.values.lock().unwrap();
            let next = if values.len() > 1 {
                values.pop_front().unwrap()
            } else {
                values.front().cloned().unwrap()
            };
            Box::pin(async move { next })
        }
    }

    fn poller(max_attempts: u32) -> ConvergencePoller {
        ConvergencePoller::new(max_attempts, Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn increase_on_third_attempt() {
        let source = Scripted::new(vec![Ok(100), Ok(100), Ok(130)]);
        let (_tx, mut rx) = watch::channel(false);
        let started = tokio::time::Instant::now();

        let outcome = poller(3).await_increase(&source, 100, &mut rx).await;

        assert_eq!(
            outcome,
            SyncOutcome::Increased {
                delta: 30,
                new_value: 130,
                attempts: 3
            }
        );
        assert_eq!(source.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn constant_value_is_no_change() {
        let source = Scripted::new(vec![Ok(100)]);
        let (_tx, mut rx) = watch::channel(false);
        let outcome = poller(3).await_increase(&source, 100, &mut rx).await;
        assert_eq!(outcome, SyncOutcome::NoChange { attempts: 3 });
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_on_first_increase() {
        let source = Scripted::new(vec![Ok(101), Ok(500)]);
        let (_tx, mut rx) = watch::channel(false);
        let outcome = poller(5).await_increase(&source, 100, &mut rx).await;
        assert_eq!(
            outcome,
            SyncOutcome::Increased {
                delta: 1,
                new_value: 101,
                attempts: 1
            }
        );
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_consume_attempts() {
        let source = Scripted::new(vec![
            Err(CounterError::Network("timeout".into())),
            Err(CounterError::Parse("missing".into())),
            Ok(120),
        ]);
        let (_tx, mut rx) = watch::channel(false);
        let mut seen = Vec::new();
        let outcome = poller(3)
            .await_increase_with(&source, 100, &mut rx, |status| {
                seen.push((status.attempt, status.observed.is_err(), status.will_retry()));
            })
            .await;
        assert_eq!(
            outcome,
            SyncOutcome::Increased {
                delta: 20,
                new_value: 120,
                attempts: 3
            }
        );
        assert_eq!(seen, vec![(1, true, true), (2, true, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn extreme_values_saturate_delta() {
        let source = Scripted::new(vec![Ok(i64::MAX)]);
        let (_tx, mut rx) = watch::channel(false);
        let outcome = poller(1).await_increase(&source, -10, &mut rx).await;
        assert_eq!(
            outcome,
            SyncOutcome::Increased {
                delta: i64::MAX,
                new_value: i64::MAX,
                attempts: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn decrease_is_not_an_increase() {
        let source = Scripted::new(vec![Ok(90)]);
        let (_tx, mut rx) = watch::channel(false);
        let outcome = poller(2).await_increase(&source, 100, &mut rx).await;
        assert_eq!(outcome, SyncOutcome::NoChange { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_wait_without_fetching() {
        let source = Scripted::new(vec![Ok(200)]);
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            tx.send(true).unwrap();
        });

        let outcome = poller(3).await_increase(&source, 100, &mut rx).await;
        assert_eq!(outcome, SyncOutcome::Cancelled { attempts: 0 });
        assert_eq!(source.calls(), 0);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_does_not_cut_sleep_short() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let started = tokio::time::Instant::now();
        assert!(!sleep_or_shutdown(Duration::from_secs(5), &mut rx).await);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(ConvergencePoller::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
