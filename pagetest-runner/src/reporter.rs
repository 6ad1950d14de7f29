// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test outcomes and where they are delivered.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, time::Duration};

/// How an executed test method ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResultKind {
    /// The method ran to completion with no errors and a matching assert
    /// count.
    Passed,
    /// An assertion failed, a callback expired, or an errback fired.
    Failed,
    /// Something outside the test's own checks went wrong: a construction
    /// panic, a missing method, or an unexpected panic.
    Error,
}

impl fmt::Display for TestResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The result of executing one test method. Exactly one of these is
/// produced per selected method, whatever went wrong along the way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// The owning case's name.
    pub case_name: SmolStr,
    /// The executed method's name.
    pub method_name: SmolStr,
    /// How the method ended.
    pub result: TestResultKind,
    /// The encoded error list; empty for a pass.
    pub message: String,
    /// Everything the test logged through its context.
    pub log: String,
    /// Wall-clock time at which the method started.
    pub start_time: DateTime<Local>,
    /// How long the method took, from the monotonic clock.
    pub duration: Duration,
}

impl TestOutcome {
    /// `"case#method"`, the id the selector filters on.
    pub fn id(&self) -> String {
        format!("{}#{}", self.case_name, self.method_name)
    }
}

/// Where runners deliver outcomes as they are produced.
pub trait OutcomeSink {
    /// Delivers one finished outcome.
    fn report_outcome(&mut self, outcome: TestOutcome);

    /// Signals that every selected configuration has been executed. Called
    /// exactly once per run, after the last outcome.
    fn report_run_complete(&mut self);
}

/// A sink that collects everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Delivered outcomes, in delivery order.
    pub outcomes: Vec<TestOutcome>,
    /// How many times the run has been declared complete.
    pub runs_completed: usize,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutcomeSink for CollectingSink {
    fn report_outcome(&mut self, outcome: TestOutcome) {
        self.outcomes.push(outcome);
    }

    fn report_run_complete(&mut self) {
        self.runs_completed += 1;
    }
}
