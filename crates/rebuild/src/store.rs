// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistence of build records.
//!
//! The control plane owns the records; [`BuildStore`] is the seam the reconciler talks to.
//! Writes use optimistic concurrency: every record carries a version, and an update is only
//! accepted against the version it was derived from.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::future::{Future, ready};

use parking_lot::Mutex;
use recoverable::{Recovery, RecoveryInfo};

use crate::build::Build;

/// A build record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBuild {
    /// The record.
    pub build: Build,

    /// Version of the record; changes on every accepted update.
    pub version: u64,
}

/// Why a store operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// No record with the requested name exists.
    NotFound,

    /// The record changed since it was read.
    Conflict,
}

impl Display for StoreErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Conflict => f.write_str("version conflict"),
        }
    }
}

/// A store operation failed.
///
/// Conflicts are transient: re-reading the record and deciding again is safe. Missing records
/// are not recoverable.
#[ohno::error]
#[display("build '{name}': {kind}")]
pub struct StoreError {
    name: String,
    kind: StoreErrorKind,
}

impl StoreError {
    /// Creates an error for a missing record.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::new(name.into(), StoreErrorKind::NotFound)
    }

    /// Creates an error for a stale write.
    #[must_use]
    pub fn conflict(name: impl Into<String>) -> Self {
        Self::new(name.into(), StoreErrorKind::Conflict)
    }

    /// The kind of failure.
    #[must_use]
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }
}

impl Recovery for StoreError {
    fn recovery(&self) -> RecoveryInfo {
        match self.kind {
            StoreErrorKind::Conflict => RecoveryInfo::retry(),
            StoreErrorKind::NotFound => RecoveryInfo::never(),
        }
    }
}

/// Storage of build records.
pub trait BuildStore {
    /// Reads the current record named `name`.
    fn fetch(&self, name: &str) -> impl Future<Output = Result<StoredBuild, StoreError>> + Send;

    /// Replaces the record with `build`, provided it is still at `expected_version`.
    ///
    /// Returns the new version.
    fn update(&self, build: Build, expected_version: u64) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// A [`BuildStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, StoredBuild>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, bypassing version checks. Returns the new version.
    pub fn insert(&self, build: Build) -> u64 {
        let mut records = self.records.lock();
        let version = records.get(&build.name).map_or(1, |stored| stored.version + 1);

        records.insert(build.name.clone(), StoredBuild { build, version });
        version
    }

    /// Returns a snapshot of the record named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<StoredBuild> {
        self.records.lock().get(name).cloned()
    }

    fn compare_and_swap(&self, build: Build, expected_version: u64) -> Result<u64, StoreError> {
        let mut records = self.records.lock();
        let Some(stored) = records.get_mut(&build.name) else {
            return Err(StoreError::not_found(build.name));
        };

        if stored.version != expected_version {
            return Err(StoreError::conflict(build.name));
        }

        stored.version += 1;
        stored.build = build;
        Ok(stored.version)
    }
}

impl BuildStore for InMemoryStore {
    fn fetch(&self, name: &str) -> impl Future<Output = Result<StoredBuild, StoreError>> + Send {
        ready(self.get(name).ok_or_else(|| StoreError::not_found(name)))
    }

    fn update(&self, build: Build, expected_version: u64) -> impl Future<Output = Result<u64, StoreError>> + Send {
        ready(self.compare_and_swap(build, expected_version))
    }
}

#[cfg(test)]
mod tests {
    use recoverable::RecoveryKind;

    use super::*;
    use crate::build::BuildPhase;

    #[tokio::test]
    async fn fetch_returns_inserted_record() {
        let store = InMemoryStore::new();
        assert_eq!(store.insert(Build::failed("app", "boom")), 1);

        let stored = store.fetch("app").await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.build.phase(), BuildPhase::Failed);
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = InMemoryStore::new();
        store.insert(Build::failed("app", "boom"));

        let mut build = store.fetch("app").await.unwrap().build;
        build.status.phase = BuildPhase::Initialization;

        assert_eq!(store.update(build, 1).await.unwrap(), 2);
        assert_eq!(store.get("app").unwrap().build.phase(), BuildPhase::Initialization);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = InMemoryStore::new();
        store.insert(Build::failed("app", "boom"));
        store.insert(Build::failed("app", "boom again"));

        let error = store.update(Build::new("app"), 1).await.unwrap_err();

        assert_eq!(error.kind(), StoreErrorKind::Conflict);
        assert_eq!(error.recovery().kind(), RecoveryKind::Retry);
        assert!(error.to_string().starts_with("build 'app': version conflict"), "{error}");
        assert_eq!(store.get("app").unwrap().build.status.error.as_deref(), Some("boom again"));
    }

    #[tokio::test]
    async fn missing_record_is_not_recoverable() {
        let store = InMemoryStore::new();

        let error = store.fetch("ghost").await.unwrap_err();
        assert_eq!(error.kind(), StoreErrorKind::NotFound);
        assert_eq!(error.recovery().kind(), RecoveryKind::Never);

        let error = store.update(Build::new("ghost"), 1).await.unwrap_err();
        assert_eq!(error.kind(), StoreErrorKind::NotFound);
    }
}
