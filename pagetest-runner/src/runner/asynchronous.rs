// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The asynchronous test runner.

use crate::{
    config::RunnerOptions,
    context::TestContext,
    errors::PhaseError,
    list::{AsyncTestCase, RunConfiguration, TemplateFactory},
    phase::stage::TestStage,
    reporter::{OutcomeSink, TestOutcome, TestResultKind},
    time::stopwatch,
};
use smol_str::SmolStr;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    rc::Rc,
};
use tracing::debug;

// The lifecycle of one asynchronous test method. setUp errors skip the
// method; tearDown always runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TestPhase {
    SetUp,
    Method,
    TearDown,
    Done,
}

/// Executes asynchronous test cases: each phase may defer steps whose
/// callback obligations are awaited before the next phase starts.
#[derive(Debug)]
pub struct AsyncTestRunner {
    options: RunnerOptions,
}

impl AsyncTestRunner {
    /// Creates a runner with the given options.
    pub fn new(options: RunnerOptions) -> Self {
        Self { options }
    }

    /// Runs every selected method of `configuration`, delivering one outcome
    /// per method.
    ///
    /// Returns false without side effects if the configuration's case is not
    /// asynchronous; the caller then falls back to the synchronous runner.
    pub async fn run_configuration(
        &self,
        configuration: &RunConfiguration,
        sink: &mut dyn OutcomeSink,
    ) -> bool {
        let TemplateFactory::Async(factory) = configuration.descriptor().template().factory()
        else {
            return false;
        };
        let factory = Rc::clone(factory);
        for method_name in configuration.tests() {
            let outcome = self.run_test(configuration, &factory, method_name).await;
            sink.report_outcome(outcome);
        }
        true
    }

    async fn run_test(
        &self,
        configuration: &RunConfiguration,
        factory: &Rc<dyn Fn() -> AsyncTestCase>,
        method_name: &SmolStr,
    ) -> TestOutcome {
        let case_name = configuration.descriptor().case_name();
        debug!(test = %format_args!("{case_name}#{method_name}"), "starting async test");
        let context = TestContext::new();
        let watch = stopwatch();
        let mut errors = Vec::new();

        // A fresh instance per method; a panicking constructor produces an
        // outcome with no phases executed.
        let instance = match catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(instance) => Some(instance),
            Err(payload) => {
                errors.push(PhaseError::from_panic(payload));
                None
            }
        };

        if let Some(instance) = &instance {
            let argument = configuration.argument_for(method_name);
            let mut phase = TestPhase::SetUp;
            while phase != TestPhase::Done {
                debug!(test = %format_args!("{case_name}#{method_name}"), ?phase, "entering phase");
                phase = match phase {
                    TestPhase::SetUp => {
                        let stage_errors = TestStage {
                            phase: instance.set_up_phase(),
                            context: &context,
                            argument: None,
                            options: &self.options,
                        }
                        .execute()
                        .await;
                        let failed = !stage_errors.is_empty();
                        errors.extend(stage_errors);
                        if failed {
                            TestPhase::TearDown
                        } else {
                            TestPhase::Method
                        }
                    }
                    TestPhase::Method => {
                        match instance.method_phase(method_name) {
                            Some(method) => {
                                let stage_errors = TestStage {
                                    phase: Some(method),
                                    context: &context,
                                    argument,
                                    options: &self.options,
                                }
                                .execute()
                                .await;
                                errors.extend(stage_errors);
                            }
                            None => errors.push(PhaseError::Unexpected {
                                message: format!("'{method_name}' not found in '{case_name}'"),
                            }),
                        }
                        TestPhase::TearDown
                    }
                    TestPhase::TearDown => {
                        let stage_errors = TestStage {
                            phase: instance.tear_down_phase(),
                            context: &context,
                            argument: None,
                            options: &self.options,
                        }
                        .execute()
                        .await;
                        errors.extend(stage_errors);
                        TestPhase::Done
                    }
                    TestPhase::Done => TestPhase::Done,
                };
            }
        }

        (self.options.clear_page.0)();
        self.build_outcome(case_name, method_name, &context, errors, watch)
    }

    fn build_outcome(
        &self,
        case_name: &str,
        method_name: &SmolStr,
        context: &TestContext,
        mut errors: Vec<PhaseError>,
        watch: crate::time::StopwatchStart,
    ) -> TestOutcome {
        if errors.is_empty()
            && let Some(mismatch) = context.assertion_mismatch()
        {
            errors.push(mismatch);
        }
        let result = if errors.is_empty() {
            TestResultKind::Passed
        } else if errors.iter().all(PhaseError::is_failure) {
            TestResultKind::Failed
        } else {
            TestResultKind::Error
        };
        let message = if errors.is_empty() {
            String::new()
        } else {
            self.options.encode(&errors)
        };
        let snapshot = watch.snapshot();
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
