// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::{Backoff, ConfigError};
use crate::constants::{DEFAULT_ATTEMPT_MAX, DEFAULT_FACTOR, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_USE_JITTER};

/// Options of the failure recovery policy.
///
/// Every field is optional in serialized form and falls back to its default:
///
/// | field        | default |
/// |--------------|---------|
/// | `min`        | `5s`    |
/// | `max`        | `1m`    |
/// | `factor`     | `2.0`   |
/// | `jitter`     | `false` |
/// | `attemptMax` | `5`     |
///
/// Durations accept the friendly (`"5s"`, `"1m 30s"`) and the ISO 8601 (`"PT5S"`) formats.
///
/// The policy is validated when it is turned into a [`Backoff`] or an
/// [`ErrorRecovery`][super::ErrorRecovery], never while a retry is being decided.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rebuild::recovery::RecoveryPolicy;
///
/// let policy = RecoveryPolicy::from_json(r#"{ "min": "2s", "attemptMax": 3 }"#)?;
///
/// assert_eq!(policy.min, Duration::from_secs(2));
/// assert_eq!(policy.max, Duration::from_secs(60));
/// assert_eq!(policy.attempt_max, 3);
/// # Ok::<(), rebuild::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryPolicy {
    /// Delay before the first retry.
    #[serde(with = "duration")]
    pub min: Duration,

    /// Upper bound of any delay.
    #[serde(with = "duration")]
    pub max: Duration,

    /// Multiplicative growth of the delay per attempt.
    pub factor: f64,

    /// Randomizes delays between `min` and the computed delay.
    pub jitter: bool,

    /// Retries granted to a failure episode.
    pub attempt_max: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_DELAY,
            max: DEFAULT_MAX_DELAY,
            factor: DEFAULT_FACTOR,
            jitter: DEFAULT_USE_JITTER,
            attempt_max: DEFAULT_ATTEMPT_MAX,
        }
    }
}

impl RecoveryPolicy {
    /// Parses a policy from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is malformed or its values are invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_str(json).map_err(|e| ConfigError::caused_by("malformed policy document".to_owned(), e))?;
        policy.backoff()?;
        Ok(policy)
    }

    /// Validates the backoff options of the policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] under the conditions documented on [`Backoff::new`].
    pub fn backoff(&self) -> Result<Backoff, ConfigError> {
        Ok(Backoff::new(self.min, self.max, self.factor)?.with_jitter(self.jitter))
    }
}

mod duration {
    use std::time::Duration;

    use jiff::SignedDuration;
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        SignedDuration::try_from(*duration).map_err(S::Error::custom)?.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let signed = SignedDuration::deserialize(deserializer)?;
        Duration::try_from(signed).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = RecoveryPolicy::default();

        assert_eq!(policy.min, Duration::from_secs(5));
        assert_eq!(policy.max, Duration::from_secs(60));
        assert!((policy.factor - 2.0).abs() < f64::EPSILON);
        assert!(!policy.jitter);
        assert_eq!(policy.attempt_max, 5);
    }

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(RecoveryPolicy::from_json("{}").unwrap(), RecoveryPolicy::default());
    }

    #[test]
    fn parses_every_option() {
        let policy = RecoveryPolicy::from_json(
            r#"{
                "min": "500ms",
                "max": "PT2M",
                "factor": 3.0,
                "jitter": true,
                "attemptMax": 8
            }"#,
        )
        .unwrap();

        assert_eq!(policy.min, Duration::from_millis(500));
        assert_eq!(policy.max, Duration::from_secs(120));
        assert!((policy.factor - 3.0).abs() < f64::EPSILON);
        assert!(policy.jitter);
        assert_eq!(policy.attempt_max, 8);

        let backoff = policy.backoff().unwrap();
        assert!(backoff.jitter());
        assert_eq!(backoff.max(), Duration::from_secs(120));
    }

    #[test]
    fn round_trips() {
        let policy = RecoveryPolicy {
            min: Duration::from_secs(1),
            max: Duration::from_secs(90),
            factor: 1.5,
            jitter: false,
            attempt_max: 2,
        };

        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(RecoveryPolicy::from_json(&json).unwrap(), policy);
    }

    #[test]
    fn rejects_invalid_values() {
        let error = RecoveryPolicy::from_json(r#"{ "min": "1m", "max": "10s" }"#).unwrap_err();
        assert!(error.to_string().contains("smaller than minimum"), "{error}");

        let error = RecoveryPolicy::from_json(r#"{ "factor": 1.0 }"#).unwrap_err();
        assert!(error.to_string().contains("growth factor"), "{error}");

        let error = RecoveryPolicy::from_json(r#"{ "min": "0s" }"#).unwrap_err();
        assert!(error.to_string().contains("must be positive"), "{error}");
    }

    #[test]
    fn rejects_negative_and_malformed_durations() {
        let error = RecoveryPolicy::from_json(r#"{ "min": "-5s" }"#).unwrap_err();
        assert!(error.to_string().contains("malformed policy document"), "{error}");

        RecoveryPolicy::from_json(r#"{ "min": "soon" }"#).unwrap_err();
        RecoveryPolicy::from_json("not json").unwrap_err();
    }
}
