// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Serde adapters that persist [`SystemTime`] as RFC 3339 strings in UTC,
//! e.g. `2024-08-06T21:30:00Z`.

use std::time::SystemTime;

use jiff::Timestamp;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub(crate) fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    Timestamp::try_from(*time).map_err(S::Error::custom)?.serialize(serializer)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
    Timestamp::deserialize(deserializer).map(SystemTime::from)
}

/// Optional variant, for timestamps that are absent until some event happens.
pub(crate) mod option {
    use super::*;

    #[expect(clippy::ref_option, reason = "signature is dictated by serde's `with` attribute")]
    pub(crate) fn serialize<S: Serializer>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => serializer.serialize_some(&Timestamp::try_from(*time).map_err(S::Error::custom)?),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SystemTime>, D::Error> {
        Option::<Timestamp>::deserialize(deserializer).map(|time| time.map(SystemTime::from))
    }
}
