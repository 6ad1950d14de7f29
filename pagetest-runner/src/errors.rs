// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the execution engine.
//!
//! Nothing here ever propagates out of the engine: errors raised inside a
//! phase body, step function or callback are caught at the nearest boundary
//! and accumulated into the owning test's error list, then encoded into the
//! test's outcome.

use std::any::Any;
use std::panic::panic_any;
use thiserror::Error;

/// The panic payload raised by test-author assertions.
///
/// Panics carrying this payload are classified as FAILED when caught at an
/// engine boundary; any other payload is classified as ERROR.
#[derive(Clone, Debug)]
pub struct AssertionFailure {
    /// The assertion message.
    pub message: String,
}

impl AssertionFailure {
    /// Raises an assertion failure with the given message.
    pub fn raise(message: impl Into<String>) -> ! {
        panic_any(Self {
            message: message.into(),
        })
    }
}

/// An error accumulated while executing one phase of a test.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PhaseError {
    /// A test-author assertion failed.
    #[error("{message}")]
    Assertion {
        /// The assertion message.
        message: String,
    },

    /// Any other exception: a panic with a non-assertion payload, a malformed
    /// test case, a missing method.
    #[error("{message}")]
    Unexpected {
        /// A description of what went wrong.
        message: String,
    },

    /// An armed callback obligation was never invoked within its allotted
    /// delay.
    #[error("Callback '{callback}' expired after {delay_ms} ms during test step '{step}'")]
    CallbackTimeout {
        /// The callback's description.
        callback: String,
        /// The description of the step the callback belongs to.
        step: String,
        /// The expiry delay in milliseconds.
        delay_ms: u64,
    },

    /// An errback registered with a pool was invoked.
    #[error("Errback {message} called with: {detail}")]
    Errback {
        /// The message supplied when the errback was registered.
        message: String,
        /// A rendering of the invocation arguments.
        detail: String,
    },
}

impl PhaseError {
    /// Classifies a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        if let Some(failure) = payload.downcast_ref::<AssertionFailure>() {
            return Self::Assertion {
                message: failure.message.clone(),
            };
        }
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panic with a non-string payload".to_owned()
        };
        Self::Unexpected { message }
    }

    /// Returns true if this error is a test failure rather than an
    /// unexpected runner error.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Unexpected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn panic_classification() {
        let payload = catch_unwind(AssertUnwindSafe(|| AssertionFailure::raise("expected 1")))
            .expect_err("assertion raises");
        assert_eq!(
            PhaseError::from_panic(payload),
            PhaseError::Assertion {
                message: "expected 1".to_owned()
            }
        );

        let payload =
            catch_unwind(|| panic!("boom {}", 42)).expect_err("panic! with formatting raises");
        assert_eq!(
            PhaseError::from_panic(payload),
            PhaseError::Unexpected {
                message: "boom 42".to_owned()
            }
        );
    }

    #[test]
    fn failure_classification() {
        assert!(
            PhaseError::Assertion {
                message: "m".to_owned()
            }
            .is_failure()
        );
        assert!(
            PhaseError::CallbackTimeout {
                callback: "#1".to_owned(),
                step: "#1".to_owned(),
                delay_ms: 10,
            }
            .is_failure()
        );
        assert!(
            !PhaseError::Unexpected {
                message: "m".to_owned()
            }
            .is_failure()
        );
    }
}
