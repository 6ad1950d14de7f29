// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine configuration.
//!
//! Capabilities that the original design injected through constructor
//! arguments travel here as ordinary values with defaults: the error
//! encoder, the page-clearing hook, the default callback expiry and the
//! synchronous runner's pacing.

use crate::errors::PhaseError;
use debug_ignore::DebugIgnore;
use std::{rc::Rc, time::Duration};

/// The default delay before an armed callback obligation expires.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Encodes a phase error list into an outcome message.
pub type ErrorEncoder = Rc<dyn Fn(&[PhaseError]) -> String>;

/// Options shared by both runners.
#[derive(Clone, Debug)]
pub struct RunnerOptions {
    /// The expiry applied to callback obligations registered without an
    /// explicit timeout.
    pub default_callback_timeout: Duration,

    /// Encodes a test's accumulated errors into its outcome message.
    ///
    /// The default renders the error display strings as a JSON array.
    pub encode_errors: DebugIgnore<ErrorEncoder>,

    /// Invoked once per completed test to clear any transient page state the
    /// test mutated. The default does nothing.
    pub clear_page: DebugIgnore<Rc<dyn Fn()>>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            default_callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            encode_errors: DebugIgnore(Rc::new(encode_errors_json)),
            clear_page: DebugIgnore(Rc::new(|| {})),
        }
    }
}

impl RunnerOptions {
    pub(crate) fn encode(&self, errors: &[PhaseError]) -> String {
        (self.encode_errors.0)(errors)
    }
}

fn encode_errors_json(errors: &[PhaseError]) -> String {
    let messages: Vec<serde_json::Value> = errors
        .iter()
        .map(|error| serde_json::Value::String(error.to_string()))
        .collect();
    serde_json::Value::Array(messages).to_string()
}

/// How the synchronous runner paces its loop over test methods.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PacingStrategy {
    /// Run every method in one synchronous pass.
    #[default]
    Continuous,

    /// Run methods until `budget` has elapsed, then yield to the scheduler
    /// for `rest` before continuing, so a long test case doesn't starve the
    /// page's event loop.
    TimeSliced {
        /// How long to run before pausing.
        budget: Duration,
        /// How long to pause between slices.
        rest: Duration,
    },
}

impl PacingStrategy {
    /// The time-sliced strategy with its customary 50ms budget and 25ms
    /// rest.
    pub fn time_sliced() -> Self {
        Self::TimeSliced {
            budget: Duration::from_millis(50),
            rest: Duration::from_millis(25),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_encoder_is_a_json_array() {
        let options = RunnerOptions::default();
        assert_eq!(options.encode(&[]), "[]");
        let encoded = options.encode(&[
            PhaseError::Assertion {
                message: "expected true".to_owned(),
            },
            PhaseError::Errback {
                message: "onFailure".to_owned(),
                detail: "503".to_owned(),
            },
        ]);
        assert_eq!(
            encoded,
            r#"["expected true","Errback onFailure called with: 503"]"#
        );
    }
}
