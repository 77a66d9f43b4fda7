// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a build.
///
/// `Failed` is transient: the recovery action may still restart the build. `Error` is the
/// terminal phase a build reaches once its retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildPhase {
    /// The build is being prepared. Restarted builds re-enter the pipeline here.
    #[default]
    Initialization,

    /// The build is waiting for a slot to run in.
    Scheduling,

    /// The build has been handed to the executor but has not started.
    Pending,

    /// The build is executing.
    Running,

    /// The build was stopped before completing.
    Interrupted,

    /// The build finished successfully.
    Completed,

    /// The build failed and may be retried.
    Failed,

    /// The build failed permanently.
    Error,
}

impl BuildPhase {
    /// Returns the wire name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialization => "Initialization",
            Self::Scheduling => "Scheduling",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Interrupted => "Interrupted",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Error => "Error",
        }
    }

    /// Returns `true` for phases no action moves a build out of.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Interrupted | Self::Completed | Self::Error)
    }
}

impl Display for BuildPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BuildPhase::Initialization, false)]
    #[case(BuildPhase::Scheduling, false)]
    #[case(BuildPhase::Pending, false)]
    #[case(BuildPhase::Running, false)]
    #[case(BuildPhase::Failed, false)]
    #[case(BuildPhase::Interrupted, true)]
    #[case(BuildPhase::Completed, true)]
    #[case(BuildPhase::Error, true)]
    fn terminal_phases(#[case] phase: BuildPhase, #[case] terminal: bool) {
        assert_eq!(phase.is_terminal(), terminal);
    }

    #[test]
    fn wire_name_matches_display() {
        for phase in [BuildPhase::Failed, BuildPhase::Error, BuildPhase::Initialization] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
        }
    }

    #[test]
    fn default_is_initialization() {
        assert_eq!(BuildPhase::default(), BuildPhase::Initialization);
    }
}
