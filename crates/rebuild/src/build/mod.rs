// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The reconciled build record and its failure bookkeeping.
//!
//! Records serialize with camelCase field names so that they round-trip through the
//! control plane unchanged:
//!
//! ```json
//! {
//!   "name": "app-image",
//!   "status": {
//!     "phase": "Failed",
//!     "error": "registry unreachable",
//!     "failure": {
//!       "reason": "registry unreachable",
//!       "time": "2024-08-06T21:30:00Z",
//!       "recovery": { "attempt": 1, "attemptMax": 5, "attemptTime": "2024-08-06T21:30:06Z" }
//!     }
//!   }
//! }
//! ```

mod failure;
mod phase;
mod timestamp;

use serde::{Deserialize, Serialize};

pub use failure::{AttemptOverflow, Failure, FailureRecovery};
pub use phase::BuildPhase;

/// A build tracked by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Unique name of the build.
    pub name: String,

    /// Observed state of the build.
    #[serde(default)]
    pub status: BuildStatus,
}

impl Build {
    /// Creates a build in its initial phase.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: BuildStatus::default(),
        }
    }

    /// Creates a build that failed with `error` and has not been seen by recovery yet.
    #[must_use]
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        let mut build = Self::new(name);
        build.status.fail(error);
        build
    }

    /// Shorthand for `self.status.phase`.
    #[must_use]
    pub fn phase(&self) -> BuildPhase {
        self.status.phase
    }
}

/// Observed state of a [`Build`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    /// Current lifecycle phase.
    #[serde(default)]
    pub phase: BuildPhase,

    /// Cause reported by the action that detected the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The current failure episode, if the build has failed at least once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl BuildStatus {
    /// Moves the build to [`BuildPhase::Failed`] with the given cause.
    ///
    /// An ongoing failure episode is kept, so retries already spent still count.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.phase = BuildPhase::Failed;
        self.error = Some(error.into());
    }

    /// Ends the current failure episode.
    ///
    /// Called by whichever action re-initializes a build after it succeeded; the next
    /// failure then starts a fresh episode with a full retry budget.
    pub fn clear_failure(&mut self) -> Option<Failure> {
        self.error = None;
        self.failure.take()
    }
}
