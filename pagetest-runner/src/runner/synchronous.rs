// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The synchronous test runner.

use crate::{
    config::{PacingStrategy, RunnerOptions},
    context::TestContext,
    errors::PhaseError,
    list::{RunConfiguration, SyncPhase, SyncTestCase, TemplateFactory},
    reporter::{OutcomeSink, TestOutcome, TestResultKind},
    time::stopwatch,
};
use smol_str::SmolStr;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    rc::Rc,
};
use tracing::debug;

/// Executes ordinary test cases whose phases complete within their body.
///
/// Also the fallback of last resort: handed a configuration of a kind it
/// does not recognize, it reports one error outcome per selected method
/// instead of running anything.
#[derive(Debug)]
pub struct SyncTestRunner {
    options: RunnerOptions,
    pacing: PacingStrategy,
}

impl SyncTestRunner {
    /// Creates a runner with the given options and pacing.
    pub fn new(options: RunnerOptions, pacing: PacingStrategy) -> Self {
        Self { options, pacing }
    }

    /// Runs every selected method of `configuration`, delivering one outcome
    /// per method.
    pub async fn run_configuration(
        &self,
        configuration: &RunConfiguration,
        sink: &mut dyn OutcomeSink,
    ) {
        let TemplateFactory::Sync(factory) = configuration.descriptor().template().factory()
        else {
            self.report_unhandled(configuration, sink);
            return;
        };
        let factory = Rc::clone(factory);
        match self.pacing {
            PacingStrategy::Continuous => {
                for method_name in configuration.tests() {
                    sink.report_outcome(self.run_test(configuration, &factory, method_name));
                }
            }
            PacingStrategy::TimeSliced { budget, rest } => {
                let mut method_names = configuration.tests().iter().peekable();
                // Every slice, the first included, is scheduled after a rest
                // so the page's event loop gets a turn before any test runs.
                while method_names.peek().is_some() {
                    debug!(rest_ms = rest.as_millis() as u64, "yielding before slice");
                    tokio::time::sleep(rest).await;
                    let slice_start = tokio::time::Instant::now();
                    // At least one test runs per slice, however long it takes.
                    loop {
                        let Some(method_name) = method_names.next() else {
                            break;
                        };
                        sink.report_outcome(self.run_test(configuration, &factory, method_name));
                        if slice_start.elapsed() >= budget {
                            break;
                        }
                    }
                }
            }
        }
    }

    fn run_test(
        &self,
        configuration: &RunConfiguration,
        factory: &Rc<dyn Fn() -> SyncTestCase>,
        method_name: &SmolStr,
    ) -> TestOutcome {
        let case_name = configuration.descriptor().case_name();
        debug!(test = %format_args!("{case_name}#{method_name}"), "starting test");
        let context = TestContext::new();
        let watch = stopwatch();

        let instance = match catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(instance) => instance,
            Err(_) => {
                // The constructor's own panic is unlikely to be useful here;
                // the case itself is malformed.
                return self.outcome(
                    configuration,
                    method_name,
                    &context,
                    TestResultKind::Error,
                    format!("{case_name} is not a test case"),
                    watch,
                );
            }
        };

        let mut errors = Vec::new();
        let primary = (|| -> Result<(), PhaseError> {
            if let Some(set_up) = instance.set_up_phase() {
                run_caught(set_up, &context)?;
            }
            let method = instance.method_phase(method_name).ok_or_else(|| {
                PhaseError::Unexpected {
                    message: format!("'{method_name}' not found in '{case_name}'"),
                }
            })?;
            run_caught(method, &context)?;
            if let Some(mismatch) = context.assertion_mismatch() {
                return Err(mismatch);
            }
            Ok(())
        })();
        let mut result = TestResultKind::Passed;
        if let Err(error) = primary {
            result = if error.is_failure() {
                TestResultKind::Failed
            } else {
                TestResultKind::Error
            };
            errors.push(error);
        }

        // tearDown runs whatever happened before it. Its own error only
        // worsens a pass; it never upgrades a failure.
        if let Some(tear_down) = instance.tear_down_phase() {
            if let Err(error) = run_caught(tear_down, &context) {
                if result == TestResultKind::Passed {
                    result = TestResultKind::Error;
                }
                errors.push(error);
            }
        }

        let message = if errors.is_empty() {
            String::new()
        } else {
            self.options.encode(&errors)
        };
        self.outcome(configuration, method_name, &context, result, message, watch)
    }

    fn report_unhandled(&self, configuration: &RunConfiguration, sink: &mut dyn OutcomeSink) {
        let descriptor = configuration.descriptor();
        debug!(
            case = descriptor.case_name(),
            kind = %descriptor.kind(),
            "unhandled test case kind",
        );
        for method_name in configuration.tests() {
            let outcome = self.outcome(
                configuration,
                method_name,
                &TestContext::new(),
                TestResultKind::Error,
                format!(
                    "{} is an unhandled test case: {}",
                    descriptor.case_name(),
                    descriptor.kind()
                ),
                stopwatch(),
            );
            sink.report_outcome(outcome);
        }
    }

    fn outcome(
        &self,
        configuration: &RunConfiguration,
        method_name: &SmolStr,
        context: &TestContext,
        result: TestResultKind,
        message: String,
        watch: crate::time::StopwatchStart,
    ) -> TestOutcome {
        (self.options.clear_page.0)();
        let snapshot = watch.snapshot();
        let case_name = configuration.descriptor().case_name();
        debug!(
            test = %format_args!("{case_name}#{method_name}"),
            %result,
            "test finished",
        );
        TestOutcome {
            case_name: case_name.into(),
            method_name: method_name.clone(),
            result,
            message,
            log: context.take_log(),
            start_time: snapshot.start_time,
            duration: snapshot.duration,
        }
    }
}

fn run_caught(phase: &SyncPhase, context: &TestContext) -> Result<(), PhaseError> {
    catch_unwind(AssertUnwindSafe(|| phase(context))).map_err(PhaseError::from_panic)
}
