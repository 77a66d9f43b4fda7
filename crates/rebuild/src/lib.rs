// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Build lifecycle orchestration with automatic recovery of failed builds.
//!
//! A container image build moves through a sequence of phases. A reconciliation loop
//! repeatedly hands each build to the first registered action that is responsible for the
//! build's current phase, and persists whatever the action produces. This crate provides the
//! pieces of that loop:
//!
//! - [`build`]: the persisted build record and its status, including the failure bookkeeping.
//! - [`action`]: the protocol actions implement and the registry the loop dispatches through.
//! - [`recovery`]: [`ErrorRecovery`][recovery::ErrorRecovery], which restarts failed builds with
//!   exponential backoff until a retry cap is reached.
//! - [`store`]: the storage seam, with an in-memory implementation.
//! - [`Reconciler`]: the loop itself.
//!
//! Time is always read through a [`tick::Clock`], so the whole lifecycle can be driven
//! deterministically in tests with [`tick::ClockControl`].
//!
//! # Recovery in a Nutshell
//!
//! A build that fails is restarted after 5s, 10s, 20s, 40s and 60s. After the fifth retry it
//! is marked as [`BuildPhase::Error`][build::BuildPhase::Error] and left alone. Both the delays
//! and the cap are configurable through [`RecoveryPolicy`][recovery::RecoveryPolicy].
//!
//! ```
//! use std::time::Duration;
//!
//! use rebuild::build::{Build, BuildPhase};
//! use rebuild::recovery::{ErrorRecovery, RecoveryPolicy};
//! use rebuild::store::InMemoryStore;
//! use rebuild::Reconciler;
//! use tick::ClockControl;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = ClockControl::new().auto_advance_timers(true).to_clock();
//! let policy = RecoveryPolicy::from_json(r#"{ "min": "1s", "attemptMax": 2 }"#)?;
//!
//! let reconciler = Reconciler::new(InMemoryStore::new(), &clock)
//!     .with_action(ErrorRecovery::from_policy(&policy, &clock)?);
//! reconciler.store().insert(Build::failed("app", "registry unreachable"));
//!
//! // runs until the build restarts
//! let phase = reconciler.run("app", Duration::from_millis(500)).await?;
//! assert_eq!(phase, BuildPhase::Initialization);
//! # Ok(())
//! # }
//! ```

pub mod action;
mod backoff;
pub mod build;
mod constants;
mod reconciler;
pub mod recovery;
mod rnd;
pub mod store;

pub use backoff::{Backoff, ConfigError};
pub use reconciler::{ReconcileError, Reconciled, Reconciler};
pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};
