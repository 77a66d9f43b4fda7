// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo, RecoveryKind};
use tick::Clock;

use crate::action::{Action, BuildAction, Outcome};
use crate::build::BuildPhase;
use crate::constants::DEFAULT_STEP_RETRY_LIMIT;
use crate::store::BuildStore;

/// A reconciliation step could not complete.
///
/// Carries the [`RecoveryInfo`] of its cause: a step that failed on a store conflict can be
/// repeated, since the actions decide again from the freshly read record.
#[ohno::error]
#[display("failed to reconcile build '{name}'")]
pub struct ReconcileError {
    name: String,
    recovery: RecoveryInfo,
}

impl Recovery for ReconcileError {
    fn recovery(&self) -> RecoveryInfo {
        self.recovery.clone()
    }
}

/// What a single reconciliation step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// An action changed the build and the change was persisted.
    Updated {
        /// The action that ran.
        action: &'static str,
        /// Phase of the persisted build.
        phase: BuildPhase,
        /// Version of the persisted build.
        version: u64,
    },

    /// An action is responsible for the build but is not ready to act.
    Pending {
        /// The action that was consulted.
        action: &'static str,
    },

    /// No registered action is responsible for the build.
    Idle {
        /// Phase of the build.
        phase: BuildPhase,
    },
}

/// Drives builds through their lifecycle by dispatching them to registered actions.
///
/// Each step fetches the current record, selects the first eligible action, lets it handle the
/// record and persists the result when the action produced one. A step never sleeps; waiting
/// is left to [`run`][Self::run] or to the caller.
///
/// # Examples
///
/// ```
/// use rebuild::build::{Build, BuildPhase};
/// use rebuild::recovery::ErrorRecovery;
/// use rebuild::store::InMemoryStore;
/// use rebuild::{Reconciled, Reconciler};
/// use tick::ClockControl;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), rebuild::ReconcileError> {
/// let clock = ClockControl::new().to_clock();
/// let store = InMemoryStore::new();
/// store.insert(Build::failed("app", "registry unreachable"));
///
/// let reconciler = Reconciler::new(store, &clock).with_action(ErrorRecovery::new(&clock));
///
/// let step = reconciler.reconcile("app").await?;
/// assert_eq!(
///     step,
///     Reconciled::Updated {
///         action: "error-recovery",
///         phase: BuildPhase::Failed,
///         version: 2
///     }
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    actions: Vec<BuildAction>,
    clock: Clock,
    retry_limit: u32,
}

impl<S: BuildStore> Reconciler<S> {
    /// Creates a reconciler with no registered actions.
    #[must_use]
    pub fn new(store: S, clock: &Clock) -> Self {
        Self {
            store,
            actions: Vec::new(),
            clock: clock.clone(),
            retry_limit: DEFAULT_STEP_RETRY_LIMIT,
        }
    }

    /// Registers an action. Actions registered earlier take precedence.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<BuildAction>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Sets how many consecutive retryable failures [`run`][Self::run] tolerates. Defaults to 10.
    ///
    /// A successful step resets the count.
    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// The store the reconciler reads from and writes to.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The registered actions, in precedence order.
    #[must_use]
    pub fn actions(&self) -> &[BuildAction] {
        &self.actions
    }

    /// Performs one reconciliation step for the build named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the record cannot be read or written, or when the selected
    /// action fails. A pending action is not an error.
    pub async fn reconcile(&self, name: &str) -> Result<Reconciled, ReconcileError> {
        let stored = self
            .store
            .fetch(name)
            .await
            .map_err(|e| ReconcileError::caused_by(name.to_owned(), e.recovery(), e))?;

        let Some(action) = BuildAction::select(&self.actions, &stored.build) else {
            return Ok(Reconciled::Idle {
                phase: stored.build.phase(),
            });
        };

        let outcome = action
            .handle(&stored.build)
            .map_err(|e| ReconcileError::caused_by(name.to_owned(), RecoveryInfo::never(), e))?;

        let Outcome::Updated(build) = outcome else {
            return Ok(Reconciled::Pending { action: action.name() });
        };

        let phase = build.phase();
        let version = self
            .store
            .update(build, stored.version)
            .await
            .map_err(|e| ReconcileError::caused_by(name.to_owned(), e.recovery(), e))?;

        tracing::event!(
            name: "rebuild.reconcile",
            tracing::Level::DEBUG,
            build.name = name,
            build.phase = %phase,
            build.version = version,
            reconcile.action = action.name(),
        );

        Ok(Reconciled::Updated {
            action: action.name(),
            phase,
            version,
        })
    }

    /// Reconciles the build named `name` every `interval` until it settles.
    ///
    /// The build settles when no registered action is responsible for it any more, or when it
    /// reaches a terminal phase. Steps that fail with a retryable error are logged and repeated
    /// on the next tick, up to the [retry limit][Self::with_retry_limit] in a row. Returns the
    /// phase the build settled in.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReconcileError`] that is not retryable, or the retryable error that
    /// exceeded the retry limit.
    pub async fn run(&self, name: &str, interval: Duration) -> Result<BuildPhase, ReconcileError> {
        let mut failures = 0_u32;

        loop {
            match self.reconcile(name).await {
                Ok(Reconciled::Idle { phase }) => return Ok(phase),
                Ok(Reconciled::Updated { phase, .. }) if phase.is_terminal() => return Ok(phase),
                Ok(_) => failures = 0,
                Err(error) if error.recovery().kind() == RecoveryKind::Retry && failures < self.retry_limit => {
                    failures += 1;
                    tracing::event!(
                        name: "rebuild.reconcile",
                        tracing::Level::WARN,
                        build.name = name,
                        reconcile.failures = failures,
                        reconcile.retry_limit = self.retry_limit,
                        error = %error,
                    );
                }
                Err(error) => return Err(error),
            }

            self.clock.delay(interval).await;
        }
    }
}
