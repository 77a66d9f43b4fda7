// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reconciles a build whose pipeline keeps failing until its retries are exhausted.
//!
//! Every recovery decision is logged to stdout.

use std::time::Duration;

use ohno::AppError;
use rebuild::Reconciler;
use rebuild::build::{Build, BuildPhase};
use rebuild::recovery::{ErrorRecovery, RecoveryPolicy};
use rebuild::store::InMemoryStore;
use tick::Clock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const POLICY: &str = r#"{
    "min": "100ms",
    "max": "400ms",
    "factor": 2.0,
    "jitter": true,
    "attemptMax": 3
}"#;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).init();

    let clock = Clock::new_tokio();
    let policy = RecoveryPolicy::from_json(POLICY)?;
    let reconciler = Reconciler::new(InMemoryStore::new(), &clock).with_action(ErrorRecovery::from_policy(&policy, &clock)?);

    reconciler.store().insert(Build::failed("web-frontend", "registry unreachable"));

    loop {
        let phase = reconciler.run("web-frontend", Duration::from_millis(50)).await?;
        println!("build settled in phase {phase}");

        if phase == BuildPhase::Error {
            break;
        }

        // simulate the restarted pipeline failing again
        let Some(stored) = reconciler.store().get("web-frontend") else {
            break;
        };
        let mut build = stored.build;
        build.status.fail("registry unreachable");
        reconciler.store().insert(build);
    }

    if let Some(stored) = reconciler.store().get("web-frontend") {
        println!("final record: {}", serde_json::to_string_pretty(&stored.build)?);
    }

    Ok(())
}
