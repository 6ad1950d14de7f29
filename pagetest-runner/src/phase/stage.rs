// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::RunnerOptions,
    context::TestContext,
    errors::PhaseError,
    list::AsyncPhase,
    phase::queue::{StageQueue, drain_queue},
};
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// One phase of an asynchronous test: setUp, a method, or tearDown.
///
/// Runs the body synchronously, then drains the steps it deferred. A panic
/// in the body is recorded, but deferred steps still drain; a missing body
/// is a trivially successful stage.
pub(crate) struct TestStage<'a> {
    pub(crate) phase: Option<&'a AsyncPhase>,
    pub(crate) context: &'a TestContext,
    pub(crate) argument: Option<&'a Value>,
    pub(crate) options: &'a RunnerOptions,
}

impl TestStage<'_> {
    pub(crate) async fn execute(self) -> Vec<PhaseError> {
        let queue = StageQueue::new();
        let mut errors = Vec::new();
        if let Some(phase) = self.phase {
            let result = catch_unwind(AssertUnwindSafe(|| {
                phase(self.context, &queue, self.argument)
            }));
            if let Err(payload) = result {
                errors.push(PhaseError::from_panic(payload));
            }
        }
        errors.extend(drain_queue(queue, self.options.clone()).await);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    #[tokio::test(start_paused = true)]
    async fn missing_phase_succeeds() {
        let context = TestContext::default();
        let options = RunnerOptions::default();
        let stage = TestStage {
            phase: None,
            context: &context,
            argument: None,
            options: &options,
        };
        assert_eq!(stage.execute().await, []);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_body_still_drains_deferred_steps() {
        let context = TestContext::default();
        let options = RunnerOptions::default();
        let drained = Rc::new(Cell::new(false));
        let phase: AsyncPhase = {
            let drained = Rc::clone(&drained);
            Rc::new(move |_, queue, _| {
                let drained = Rc::clone(&drained);
                queue.then(move |_| drained.set(true));
                panic!("body failed");
            })
        };
        let stage = TestStage {
            phase: Some(&phase),
            context: &context,
            argument: None,
            options: &options,
        };
        let errors = stage.execute().await;
        assert_eq!(
            errors,
            [PhaseError::Unexpected {
                message: "body failed".to_owned(),
            }]
        );
        assert!(drained.get());
    }

    #[tokio::test(start_paused = true)]
    async fn argument_reaches_the_body() {
        let context = TestContext::default();
        let options = RunnerOptions::default();
        let seen = Rc::new(Cell::new(false));
        let phase: AsyncPhase = {
            let seen = Rc::clone(&seen);
            Rc::new(move |_, _, argument| {
                seen.set(argument == Some(&Value::from("payload")));
            })
        };
        let argument = Value::from("payload");
        let stage = TestStage {
            phase: Some(&phase),
            context: &context,
            argument: Some(&argument),
            options: &options,
        };
        assert_eq!(stage.execute().await, []);
        assert!(seen.get());
    }
}
