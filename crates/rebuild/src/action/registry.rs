// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{Action, ActionError, Outcome};
use crate::build::Build;
use crate::recovery::ErrorRecovery;

/// The set of actions a reconciler can dispatch to.
///
/// Each registered action is a variant; dispatch is a `match`, and selection picks the first
/// registered action whose [`can_handle`][Action::can_handle] accepts the build.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BuildAction {
    /// Restarts failed builds. See [`ErrorRecovery`].
    ErrorRecovery(ErrorRecovery),
}

impl BuildAction {
    /// Returns the first action in `actions` eligible to handle `build`.
    #[must_use]
    pub fn select<'a>(actions: &'a [Self], build: &Build) -> Option<&'a Self> {
        actions.iter().find(|action| action.can_handle(build))
    }
}

impl From<ErrorRecovery> for BuildAction {
    fn from(action: ErrorRecovery) -> Self {
        Self::ErrorRecovery(action)
    }
}

impl Action for BuildAction {
    fn name(&self) -> &'static str {
        match self {
            Self::ErrorRecovery(action) => action.name(),
        }
    }

    fn can_handle(&self, build: &Build) -> bool {
        match self {
            Self::ErrorRecovery(action) => action.can_handle(build),
        }
    }

    fn handle(&self, build: &Build) -> Result<Outcome, ActionError> {
        match self {
            Self::ErrorRecovery(action) => action.handle(build),
        }
    }
}

#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;
    use crate::build::BuildPhase;

    fn registry() -> Vec<BuildAction> {
        vec![ErrorRecovery::new(&ClockControl::new().to_clock()).into()]
    }

    #[test]
    fn selects_recovery_for_failed_builds() {
        let actions = registry();
        let build = Build::failed("app", "boom");

        let action = BuildAction::select(&actions, &build).unwrap();
        assert_eq!(action.name(), ErrorRecovery::NAME);
        assert!(action.handle(&build).unwrap().into_updated().is_some());
    }

    #[test]
    fn nothing_selected_for_other_phases() {
        let actions = registry();
        let mut build = Build::new("app");

        for phase in [BuildPhase::Initialization, BuildPhase::Running, BuildPhase::Error, BuildPhase::Completed] {
            build.status.phase = phase;
            assert!(BuildAction::select(&actions, &build).is_none(), "{phase}");
        }
    }

    #[test]
    fn empty_registry_selects_nothing() {
        assert!(BuildAction::select(&[], &Build::failed("app", "boom")).is_none());
    }
}
