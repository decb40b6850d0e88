//! Query-eligibility policies for completed missions.
//!
//! Querying the counter service is slow (it lags by minutes), so only missions
//! that plausibly moved the counter are worth waiting for. Two policy shapes
//! are supported and chosen in configuration:
//!
//! - `duration_only`: the mission must have lasted at least a minimum time.
//! - `count_or_fallback`: the mission must have produced more than a number of
//!   tracked events; if it didn't (or the count is unavailable), a long enough
//!   mission still qualifies, with its count reported as estimated.
//!
//! Evaluation is a pure function of `(duration, event_count)`.

use serde::{Deserialize, Serialize};

/// Default minimum duration for `duration_only` (6 minutes).
pub const DEFAULT_MIN_DURATION_SECS: f64 = 360.0;

/// Default event threshold for `count_or_fallback`.
pub const DEFAULT_COUNT_THRESHOLD: u64 = 15;

fn default_min_duration_secs() -> f64 {
    DEFAULT_MIN_DURATION_SECS
}

fn default_count_threshold() -> u64 {
    DEFAULT_COUNT_THRESHOLD
}

/// Eligibility policy, selected by `kind` in the `[policy]` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EligibilityPolicy {
    /// Proceed iff `duration >= min_duration_secs`.
    DurationOnly {
        #[serde(default = "default_min_duration_secs")]
        min_duration_secs: f64,
    },
    /// Proceed with a known count iff `event_count > count_threshold`,
    /// otherwise proceed with an estimated count iff
    /// `duration >= fallback_duration_secs`.
    CountOrFallback {
        #[serde(default = "default_count_threshold")]
        count_threshold: u64,
        #[serde(default = "default_min_duration_secs")]
        fallback_duration_secs: f64,
    },
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self::DurationOnly {
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
        }
    }
}

/// Outcome of evaluating a policy against one mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Query the counter; `count_known` is false when the event count is
    /// missing or was not what qualified the mission.
    Eligible { count_known: bool },
    /// Do not query the counter.
    Skip(SkipReason),
}

/// Why a mission was not queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Mission was shorter than the required duration.
    TooShort,
    /// Too few events and too short for the fallback.
    TooFewEvents,
}

impl Eligibility {
    #[must_use]
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible { .. })
    }
}

impl EligibilityPolicy {
    /// Evaluate the policy for a mission of `duration_secs` with an optional
    /// event count.
    #[must_use]
    pub fn evaluate(&self, duration_secs: f64, event_count: Option<u64>) -> Eligibility {
        match *self {
            Self::DurationOnly { min_duration_secs } => {
                if duration_secs >= min_duration_secs {
                    Eligibility::Eligible {
                        count_known: event_count.is_some(),
                    }
                } else {
                    Eligibility::Skip(SkipReason::TooShort)
                }
            }
            Self::CountOrFallback {
                count_threshold,
                fallback_duration_secs,
            } => {
                if event_count.is_some_and(|count| count > count_threshold) {
                    Eligibility::Eligible { count_known: true }
                } else if duration_secs >= fallback_duration_secs {
                    Eligibility::Eligible { count_known: false }
                } else {
                    Eligibility::Skip(SkipReason::TooFewEvents)
                }
            }
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DurationOnly { .. } => "duration_only",
            Self::CountOrFallback { .. } => "count_or_fallback",
        }
    }

    /// Whether the policy needs an event count to be useful.
    #[must_use]
    pub fn uses_event_count(&self) -> bool {
        matches!(self, Self::CountOrFallback { .. })
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let duration = match *self {
            Self::DurationOnly { min_duration_secs } => min_duration_secs,
            Self::CountOrFallback {
                fallback_duration_secs,
                ..
            } => fallback_duration_secs,
        };
        if duration.is_finite() && duration >= 0.0 {
            Ok(())
        } else {
            Err(format!(
                "policy duration threshold must be a non-negative number, got {duration}"
            ))
        }
    }
}
