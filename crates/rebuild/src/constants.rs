// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Delay before the first retry of a failed build: 5 seconds.
///
/// Short enough that a flaky registry push or a preempted pod is retried quickly,
/// long enough that the control plane is not hammered by a build that fails instantly.
pub(crate) const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for the delay between two retries: 1 minute.
pub(crate) const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Multiplicative growth of the delay per attempt.
///
/// With the default minimum this yields `5s, 10s, 20s, 40s, 60s`.
pub(crate) const DEFAULT_FACTOR: f64 = 2.0;

/// Jitter is disabled so that retries follow the plain exponential schedule.
pub(crate) const DEFAULT_USE_JITTER: bool = false;

/// Number of retries granted to a failure episode before the build is moved to `Error`.
pub(crate) const DEFAULT_ATTEMPT_MAX: u32 = 5;

/// Consecutive retryable reconciliation failures tolerated before the driver gives up.
pub(crate) const DEFAULT_STEP_RETRY_LIMIT: u32 = 10;
