// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test execution.
//!
//! Two runners share the outcome model: [`AsyncTestRunner`] executes cases
//! whose phases defer asynchronous steps, [`SyncTestRunner`] executes plain
//! cases and is the fallback for anything else. [`run_configurations`] drives
//! both over a selected configuration list.

mod asynchronous;
mod synchronous;

pub use asynchronous::AsyncTestRunner;
pub use synchronous::SyncTestRunner;

use crate::{
    config::{PacingStrategy, RunnerOptions},
    list::RunConfiguration,
    reporter::OutcomeSink,
};
use tracing::debug;

/// Executes every configuration in order, delivering outcomes to `sink` as
/// they are produced and declaring the run complete exactly once at the end.
///
/// Asynchronous cases go to the asynchronous runner; everything else falls
/// back to the synchronous runner.
pub async fn run_configurations(
    configurations: &[RunConfiguration],
    options: RunnerOptions,
    pacing: PacingStrategy,
    sink: &mut dyn OutcomeSink,
) {
    debug!(configurations = configurations.len(), "starting run");
    let async_runner = AsyncTestRunner::new(options.clone());
    let sync_runner = SyncTestRunner::new(options, pacing);
    for configuration in configurations {
        if !async_runner.run_configuration(configuration, sink).await {
            sync_runner.run_configuration(configuration, sink).await;
        }
    }
    sink.report_run_complete();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        list::{AsyncTestCase, SyncTestCase, TestCaseDescriptor, TestCaseTemplate},
        reporter::{CollectingSink, TestResultKind},
    };

    #[tokio::test]
    async fn mixed_kinds_run_in_order_with_one_completion() {
        let sync_descriptor = TestCaseDescriptor::new(
            "sync.FirstTest",
            TestCaseTemplate::new_sync(|| SyncTestCase::new().method("testSync", |_| {})),
        );
        let async_descriptor = TestCaseDescriptor::new(
            "async.SecondTest",
            TestCaseTemplate::new_async(|| {
                AsyncTestCase::new().method("testAsync", |cx, _, _| cx.assert_that(true, "ok"))
            }),
        );
        let configurations = [
            RunConfiguration::new(sync_descriptor, vec!["testSync".into()]),
            RunConfiguration::new(async_descriptor, vec!["testAsync".into()]),
        ];

        let mut sink = CollectingSink::new();
        run_configurations(
            &configurations,
            RunnerOptions::default(),
            PacingStrategy::Continuous,
            &mut sink,
        )
        .await;

        let ids: Vec<_> = sink.outcomes.iter().map(|outcome| outcome.id()).collect();
        assert_eq!(ids, ["sync.FirstTest#testSync", "async.SecondTest#testAsync"]);
        assert!(
            sink.outcomes
                .iter()
                .all(|outcome| outcome.result == TestResultKind::Passed)
        );
        assert_eq!(sink.runs_completed, 1);
    }

    #[tokio::test]
    async fn empty_selection_still_completes_the_run() {
        let mut sink = CollectingSink::new();
        run_configurations(
            &[],
            RunnerOptions::default(),
            PacingStrategy::Continuous,
            &mut sink,
        )
        .await;
        assert!(sink.outcomes.is_empty());
        assert_eq!(sink.runs_completed, 1);
    }
}
