// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The protocol every phase action implements, and the registry of actions.
//!
//! An action inspects a [`Build`], declares whether it is responsible for the build's
//! current state through [`Action::can_handle`], and advances the build through
//! [`Action::handle`]. Handling produces one of three results:
//!
//! - `Ok(Outcome::Updated(build))`: the caller persists the new record.
//! - `Ok(Outcome::Pending)`: nothing to do yet; the caller persists nothing and re-invokes later.
//! - `Err(ActionError)`: the action itself could not run.

mod registry;

pub use registry::BuildAction;

use crate::build::Build;

/// Result of handling a build.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// The build changed and must be persisted.
    Updated(Build),

    /// The action is not ready to act yet. The record must not be persisted, and this is not a failure.
    Pending,
}

impl Outcome {
    /// Returns the updated build, if any.
    #[must_use]
    pub fn into_updated(self) -> Option<Build> {
        match self {
            Self::Updated(build) => Some(build),
            Self::Pending => None,
        }
    }

    /// Returns `true` for [`Outcome::Pending`].
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// An action could not handle a build.
#[ohno::error]
#[display("action '{action}' failed")]
pub struct ActionError {
    action: String,
}

/// A step of the build lifecycle.
pub trait Action {
    /// Stable identifier of the action, used in logs.
    fn name(&self) -> &'static str;

    /// Returns `true` when this action is responsible for the build in its current state.
    fn can_handle(&self, build: &Build) -> bool;

    /// Advances the build.
    ///
    /// The input record is never modified; changes are returned through [`Outcome::Updated`].
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] when the action cannot run at all. Build-level failures are
    /// expressed as phase transitions, not as errors.
    fn handle(&self, build: &Build) -> Result<Outcome, ActionError>;
}
