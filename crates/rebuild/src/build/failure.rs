// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::timestamp;

/// Persisted recovery state claims more attempts than its cap allows.
#[ohno::error]
#[display("recovery attempt {attempt} exceeds the cap of {attempt_max}")]
pub struct AttemptOverflow {
    attempt: u32,
    attempt_max: u32,
}

/// A failure episode of a build.
///
/// Created the first time a build is observed in [`Failed`][super::BuildPhase::Failed]
/// without failure information. The `reason` and `time` of an episode never change;
/// only the [`FailureRecovery`] bookkeeping advances as retries are approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    reason: String,
    #[serde(with = "timestamp")]
    time: SystemTime,
    recovery: FailureRecovery,
}

impl Failure {
    /// Starts a new failure episode observed at `time` with no retries spent yet.
    #[must_use]
    pub fn new(reason: impl Into<String>, time: SystemTime, attempt_max: u32) -> Self {
        Self {
            reason: reason.into(),
            time,
            recovery: FailureRecovery::new(attempt_max),
        }
    }

    /// Reassembles a failure episode from previously persisted parts.
    #[must_use]
    pub fn with_recovery(reason: impl Into<String>, time: SystemTime, recovery: FailureRecovery) -> Self {
        Self {
            reason: reason.into(),
            time,
            recovery,
        }
    }

    /// The cause recorded when the episode started.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// When the episode was first observed.
    #[must_use]
    pub fn time(&self) -> SystemTime {
        self.time
    }

    /// Retry bookkeeping of the episode.
    #[must_use]
    pub fn recovery(&self) -> &FailureRecovery {
        &self.recovery
    }

    /// The baseline for the next backoff window: the last approved retry, or the
    /// start of the episode when no retry happened yet.
    #[must_use]
    pub fn last_attempt(&self) -> SystemTime {
        self.recovery.attempt_time.unwrap_or(self.time)
    }

    /// Time elapsed since [`last_attempt`][Self::last_attempt] as of `now`.
    ///
    /// A `now` earlier than the baseline (clock skew between workers) counts as no time elapsed.
    #[must_use]
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_attempt()).unwrap_or(Duration::ZERO)
    }

    pub(crate) fn recovery_mut(&mut self) -> &mut FailureRecovery {
        &mut self.recovery
    }
}

/// Retry bookkeeping of a failure episode.
///
/// `attempt` starts at 0 and grows by exactly one per approved retry; it never exceeds
/// `attempt_max`. Deserializing a state that violates this is rejected with [`AttemptOverflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRecovery")]
pub struct FailureRecovery {
    attempt: u32,
    attempt_max: u32,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    attempt_time: Option<SystemTime>,
}

impl FailureRecovery {
    /// Creates bookkeeping with no retries spent.
    #[must_use]
    pub fn new(attempt_max: u32) -> Self {
        Self {
            attempt: 0,
            attempt_max,
            attempt_time: None,
        }
    }

    /// Restores bookkeeping from persisted values.
    ///
    /// # Errors
    ///
    /// Returns [`AttemptOverflow`] when `attempt` is greater than `attempt_max`.
    pub fn restore(attempt: u32, attempt_max: u32, attempt_time: Option<SystemTime>) -> Result<Self, AttemptOverflow> {
        if attempt > attempt_max {
            return Err(AttemptOverflow::new(attempt, attempt_max));
        }

        Ok(Self {
            attempt,
            attempt_max,
            attempt_time,
        })
    }

    /// Number of retries approved so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Number of retries the episode may spend.
    #[must_use]
    pub fn attempt_max(&self) -> u32 {
        self.attempt_max
    }

    /// When the most recent retry was approved.
    #[must_use]
    pub fn attempt_time(&self) -> Option<SystemTime> {
        self.attempt_time
    }

    /// Returns `true` once every retry has been spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.attempt_max
    }

    /// Spends one retry at `now`. Returns `false` and leaves the state untouched when
    /// the episode is already exhausted.
    pub(crate) fn record_attempt(&mut self, now: SystemTime) -> bool {
        if self.is_exhausted() {
            return false;
        }

        self.attempt += 1;
        self.attempt_time = Some(now);
        true
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecovery {
    #[serde(default)]
    attempt: u32,
    attempt_max: u32,
    #[serde(default, with = "timestamp::option")]
    attempt_time: Option<SystemTime>,
}

impl TryFrom<RawRecovery> for FailureRecovery {
    type Error = AttemptOverflow;

    fn try_from(raw: RawRecovery) -> Result<Self, Self::Error> {
        Self::restore(raw.attempt, raw.attempt_max, raw.attempt_time)
    }
}
