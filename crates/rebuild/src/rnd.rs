// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{SystemTime, UNIX_EPOCH};

/// Golden-ratio increment, spreads consecutive attempt numbers across the seed space.
const ATTEMPT_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

/// Derives the jitter seed of one retry of a failure episode.
///
/// The seed only depends on persisted values, so every worker polling the same record draws
/// the same sample and the jittered delay stays fixed for the lifetime of that attempt.
pub(crate) fn episode_seed(started: SystemTime, attempt: u32) -> u64 {
    let nanos = started.duration_since(UNIX_EPOCH).map_or(0, |since| since.as_nanos());

    #[expect(clippy::cast_possible_truncation, reason = "folding into a 64-bit seed")]
    let folded = (nanos as u64) ^ ((nanos >> 64) as u64);

    folded ^ u64::from(attempt).wrapping_mul(ATTEMPT_SPREAD)
}

/// Source of the uniform samples used to spread jittered backoff delays.
///
/// Samples are drawn from a generator seeded per call, never from shared state.
/// Not cryptographically secure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) enum Rnd {
    #[default]
    Seeded,

    #[cfg(test)]
    Fixed(f64),
}

impl Rnd {
    /// Returns the sample in `[0.0, 1.0]` belonging to `seed`.
    pub fn sample(self, seed: u64) -> f64 {
        let sample = match self {
            Self::Seeded => fastrand::Rng::with_seed(seed).f64(),
            #[cfg(test)]
            Self::Fixed(value) => value,
        };

        sample.clamp(0.0, 1.0)
    }
}
