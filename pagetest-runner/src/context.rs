// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-test-invocation context.
//!
//! One [`TestContext`] is created for each executed test method and threaded
//! through every phase of that test. It carries the observed and expected
//! assertion counts and the captured log, so no state ever leaks between
//! tests.

use crate::errors::{AssertionFailure, PhaseError};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

/// A cheap-to-clone handle to one test invocation's mutable state.
///
/// Cloning shares the underlying state; closures that outlive the phase body
/// (callbacks, deferred steps) should capture a clone.
#[derive(Clone, Debug, Default)]
pub struct TestContext {
    inner: Rc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    assert_count: Cell<u32>,
    expected_asserts: Cell<Option<u32>>,
    log: RefCell<String>,
}

impl TestContext {
    /// Creates a fresh context with zeroed counters and an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one assertion and raises an [`AssertionFailure`] if the
    /// condition is false.
    pub fn assert_that(&self, condition: bool, message: impl Into<String>) {
        self.inner.assert_count.set(self.inner.assert_count.get() + 1);
        if !condition {
            AssertionFailure::raise(message);
        }
    }

    /// Unconditionally fails the current phase.
    pub fn fail(&self, message: impl Into<String>) -> ! {
        AssertionFailure::raise(message)
    }

    /// Declares how many assertions this test expects to observe.
    ///
    /// Checked once per test, at outcome-building time.
    pub fn expect_assert_count(&self, expected: u32) {
        self.inner.expected_asserts.set(Some(expected));
    }

    /// The number of assertions observed so far.
    pub fn assert_count(&self) -> u32 {
        self.inner.assert_count.get()
    }

    /// Appends one line to the test's captured log.
    pub fn log(&self, line: impl AsRef<str>) {
        let mut log = self.inner.log.borrow_mut();
        if !log.is_empty() {
            log.push('\n');
        }
        log.push_str(line.as_ref());
    }

    /// Returns the assertion-count mismatch error, if a count was declared
    /// and not met.
    pub(crate) fn assertion_mismatch(&self) -> Option<PhaseError> {
        let expected = self.inner.expected_asserts.get()?;
        let observed = self.inner.assert_count.get();
        (expected != observed).then(|| PhaseError::Assertion {
            message: format!("Expected '{expected}' asserts but '{observed}' encountered."),
        })
    }

    /// Drains the captured log.
    pub(crate) fn take_log(&self) -> String {
        self.inner.log.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn assertion_counting() {
        let cx = TestContext::new();
        cx.assert_that(true, "fine");
        cx.assert_that(true, "also fine");
        assert_eq!(cx.assert_count(), 2);
        assert!(cx.assertion_mismatch().is_none());

        cx.expect_assert_count(3);
        let mismatch = cx.assertion_mismatch().expect("two observed, three expected");
        assert_eq!(
            mismatch,
            PhaseError::Assertion {
                message: "Expected '3' asserts but '2' encountered.".to_owned()
            }
        );
    }

    #[test]
    fn failed_assertion_still_counts() {
        let cx = TestContext::new();
        let payload = catch_unwind(AssertUnwindSafe(|| {
            cx.assert_that(false, "nope");
        }))
        .expect_err("assertion fails");
        assert_eq!(
            PhaseError::from_panic(payload),
            PhaseError::Assertion {
                message: "nope".to_owned()
            }
        );
        assert_eq!(cx.assert_count(), 1);
    }

    #[test]
    fn log_capture() {
        let cx = TestContext::new();
        cx.log("first");
        cx.log("second");
        assert_eq!(cx.take_log(), "first\nsecond");
        assert_eq!(cx.take_log(), "");
    }
}
