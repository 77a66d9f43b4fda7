// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recovery of failed builds.
//!
//! [`ErrorRecovery`] handles builds in [`BuildPhase::Failed`]. Each invocation takes exactly
//! one of four decisions:
//!
//! 1. **Record**: the build has no failure episode yet. One is created with the current
//!    error as its reason and the current time as its start; the phase stays `Failed`.
//! 2. **Give up**: every retry of the episode is spent. The build moves to the terminal
//!    [`BuildPhase::Error`] phase and nothing else changes.
//! 3. **Wait**: less time than the backoff delay of the current attempt has passed since the
//!    last retry (or since the episode started). The action returns [`Outcome::Pending`].
//! 4. **Retry**: the build re-enters [`BuildPhase::Initialization`], the attempt counter grows
//!    by one and the retry time is stamped.
//!
//! The delay for a decision is taken from the attempt count *before* it is incremented, so
//! the first retry waits [`Backoff::min`], the second waits twice as long, and so on.
//!
//! With jitter enabled, the delay of an attempt is drawn from a seed derived from the episode
//! start and the attempt count, so every poll of the same record waits for the same delay.
//!
//! Decisions only depend on the record and a single reading of the clock. Re-running the
//! action on the same record at the same instant yields the same result, which makes it safe
//! under at-least-once delivery from the reconciliation loop.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use rebuild::action::{Action, Outcome};
//! use rebuild::build::{Build, BuildPhase};
//! use rebuild::recovery::ErrorRecovery;
//! use tick::ClockControl;
//!
//! let control = ClockControl::new();
//! let recovery = ErrorRecovery::new(&control.to_clock());
//!
//! // the first pass records the failure episode
//! let build = Build::failed("app", "registry unreachable");
//! let Ok(Outcome::Updated(build)) = recovery.handle(&build) else { unreachable!() };
//! assert_eq!(build.phase(), BuildPhase::Failed);
//!
//! // too early to retry
//! assert_eq!(recovery.handle(&build)?, Outcome::Pending);
//!
//! // once the minimum delay passed, the build restarts
//! control.advance(Duration::from_secs(5));
//! let Ok(Outcome::Updated(build)) = recovery.handle(&build) else { unreachable!() };
//! assert_eq!(build.phase(), BuildPhase::Initialization);
//! # Ok::<(), rebuild::action::ActionError>(())
//! ```

mod policy;

use std::time::SystemTime;

pub use policy::RecoveryPolicy;
use tick::Clock;

use crate::action::{Action, ActionError, Outcome};
use crate::backoff::{Backoff, ConfigError};
use crate::build::{Build, BuildPhase, Failure};
use crate::constants::DEFAULT_ATTEMPT_MAX;
use crate::rnd::episode_seed;

/// Restarts failed builds with exponential backoff until their retries are exhausted.
///
/// See the [module documentation][self] for the decision procedure.
#[derive(Debug, Clone)]
pub struct ErrorRecovery {
    backoff: Backoff,
    attempt_max: u32,
    clock: Clock,
}

impl ErrorRecovery {
    /// Identifier of the action.
    pub const NAME: &'static str = "error-recovery";

    /// Creates the action with the default policy: 5 retries, delays from 5s doubling up to 1m.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            backoff: Backoff::default(),
            attempt_max: DEFAULT_ATTEMPT_MAX,
            clock: clock.clone(),
        }
    }

    /// Creates the action from a policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the backoff options of the policy are invalid.
    pub fn from_policy(policy: &RecoveryPolicy, clock: &Clock) -> Result<Self, ConfigError> {
        Ok(Self {
            backoff: policy.backoff()?,
            attempt_max: policy.attempt_max,
            clock: clock.clone(),
        })
    }

    /// Replaces the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the number of retries granted to new failure episodes.
    ///
    /// Episodes that already exist keep the cap they were created with.
    #[must_use]
    pub fn with_attempt_max(mut self, attempt_max: u32) -> Self {
        self.attempt_max = attempt_max;
        self
    }

    /// The backoff schedule used between retries.
    #[must_use]
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// The retry cap stamped on new failure episodes.
    #[must_use]
    pub fn attempt_max(&self) -> u32 {
        self.attempt_max
    }

    fn decide(&self, build: &Build, now: SystemTime) -> Outcome {
        let Some(failure) = &build.status.failure else {
            let reason = build.status.error.clone().unwrap_or_default();
            let mut updated = build.clone();
            updated.status.failure = Some(Failure::new(reason, now, self.attempt_max));

            tracing::event!(
                name: "rebuild.recovery",
                tracing::Level::INFO,
                build.name = %build.name,
                recovery.decision = "failure_recorded",
                recovery.attempt = 0,
                recovery.attempt_max = self.attempt_max,
            );
            return Outcome::Updated(updated);
        };

        let recovery = failure.recovery();

        if recovery.is_exhausted() {
            let mut updated = build.clone();
            updated.status.phase = BuildPhase::Error;

            tracing::event!(
                name: "rebuild.recovery",
                tracing::Level::WARN,
                build.name = %build.name,
                recovery.decision = "exhausted",
                recovery.attempt = recovery.attempt(),
                recovery.attempt_max = recovery.attempt_max(),
            );
            return Outcome::Updated(updated);
        }

        let elapsed = failure.elapsed(now);
        let seed = episode_seed(failure.time(), recovery.attempt());
        let required = self.backoff.delay_for(recovery.attempt(), seed);

        if elapsed < required {
            tracing::event!(
                name: "rebuild.recovery",
                tracing::Level::DEBUG,
                build.name = %build.name,
                recovery.decision = "pending",
                recovery.attempt = recovery.attempt(),
                recovery.attempt_max = recovery.attempt_max(),
                recovery.remaining = required.saturating_sub(elapsed).as_secs_f32(),
            );
            return Outcome::Pending;
        }

        let mut failure = failure.clone();
        failure.recovery_mut().record_attempt(now);

        tracing::event!(
            name: "rebuild.recovery",
            tracing::Level::INFO,
            build.name = %build.name,
            recovery.decision = "retry",
            recovery.attempt = failure.recovery().attempt(),
            recovery.attempt_max = failure.recovery().attempt_max(),
            recovery.waited = elapsed.as_secs_f32(),
        );

        let mut updated = build.clone();
        updated.status.phase = BuildPhase::Initialization;
        updated.status.failure = Some(failure);
        Outcome::Updated(updated)
    }
}

impl Action for ErrorRecovery {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, build: &Build) -> bool {
        build.status.phase == BuildPhase::Failed
    }

    fn handle(&self, build: &Build) -> Result<Outcome, ActionError> {
        Ok(self.decide(build, self.clock.system_time()))
    }
}
