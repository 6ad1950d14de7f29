// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deferred-step queues.

use crate::{
    config::RunnerOptions,
    errors::PhaseError,
    phase::pool::{CallbackHandle, CallbackOptions, CallbackPool, ErrbackHandle},
};
use futures::future::LocalBoxFuture;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    rc::Rc,
};
use tracing::debug;

type StepFn = Box<dyn FnOnce(&StepContext)>;

/// An ordered queue of deferred steps.
///
/// A phase body defers steps onto its stage's queue; each step may in turn
/// defer more steps onto its own child queue, which drains to completion
/// before the parent's next step starts. The first step error abandons every
/// step still queued, all the way up.
#[derive(Clone, Default)]
pub struct StageQueue {
    inner: Rc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    steps: RefCell<VecDeque<(String, StepFn)>>,
    step_index: Cell<u32>,
}

impl StageQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Defers a described step. Returns `&self` so deferrals chain.
    pub fn call(
        &self,
        description: impl Into<String>,
        step: impl FnOnce(&StepContext) + 'static,
    ) -> &Self {
        self.inner
            .steps
            .borrow_mut()
            .push_back((description.into(), Box::new(step)));
        self.inner.step_index.set(self.inner.step_index.get() + 1);
        self
    }

    /// Defers a step with a synthesized `#n` description, where `n` is the
    /// step's 1-based position among this queue's deferrals.
    pub fn then(&self, step: impl FnOnce(&StepContext) + 'static) -> &Self {
        let description = format!("#{}", self.deferred() + 1);
        self.call(description, step)
    }

    // The number of steps deferred so far, drained or not.
    pub(crate) fn deferred(&self) -> u32 {
        self.inner.step_index.get()
    }

    fn pop(&self) -> Option<(String, StepFn)> {
        self.inner.steps.borrow_mut().pop_front()
    }
}

impl fmt::Debug for StageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps = self.inner.steps.borrow();
        f.debug_struct("StageQueue")
            .field("deferred", &self.deferred())
            .field(
                "queued",
                &steps.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// The execution context handed to a running step.
///
/// Wraps the step's own [`CallbackPool`] and child [`StageQueue`].
#[derive(Clone, Debug)]
pub struct StepContext {
    pool: CallbackPool,
    queue: StageQueue,
}

impl StepContext {
    /// Registers a single-use callback obligation on the step's pool.
    pub fn add_callback(&self, f: impl FnMut() + 'static) -> CallbackHandle {
        self.pool.add_callback(f)
    }

    /// Registers a callback obligation with explicit options.
    pub fn add_callback_with(
        &self,
        f: impl FnMut() + 'static,
        options: CallbackOptions,
    ) -> CallbackHandle {
        self.pool.add_callback_with(f, options)
    }

    /// Registers an empty single-use callback obligation.
    pub fn noop(&self) -> CallbackHandle {
        self.pool.noop()
    }

    /// Registers an empty callback obligation with explicit options.
    pub fn noop_with(&self, options: CallbackOptions) -> CallbackHandle {
        self.pool.noop_with(options)
    }

    /// Creates an error-reporting handle on the step's pool.
    pub fn add_errback(&self, message: impl Into<String>) -> ErrbackHandle {
        self.pool.add_errback(message)
    }

    /// Defers a described sub-step; it runs after this step completes and
    /// before the parent queue's next step.
    pub fn call(
        &self,
        description: impl Into<String>,
        step: impl FnOnce(&StepContext) + 'static,
    ) -> &Self {
        self.queue.call(description, step);
        self
    }

    /// Defers a sub-step with a synthesized description.
    pub fn then(&self, step: impl FnOnce(&StepContext) + 'static) -> &Self {
        self.queue.then(step);
        self
    }

    /// The step's child queue.
    pub fn queue(&self) -> &StageQueue {
        &self.queue
    }
}

/// Drains `queue` to completion, returning every error recorded.
///
/// Steps run strictly sequentially; a step's child queue drains before the
/// next sibling starts, and the first error abandons everything still
/// queued. Boxed because the child-queue drain recurses.
pub(crate) fn drain_queue(
    queue: StageQueue,
    options: RunnerOptions,
) -> LocalBoxFuture<'static, Vec<PhaseError>> {
    Box::pin(async move {
        let mut errors = Vec::new();
        while let Some((description, step)) = queue.pop() {
            debug!(step = %description, "starting step");
            errors.extend(run_step(description, step, &options).await);
            if !errors.is_empty() {
                debug!(abandoned = queue.inner.steps.borrow().len(), "abandoning queued steps");
                break;
            }
        }
        errors
    })
}

async fn run_step(description: String, step: StepFn, options: &RunnerOptions) -> Vec<PhaseError> {
    let pool = CallbackPool::new(description, options.default_callback_timeout);
    let child = StageQueue::new();
    let step_cx = StepContext {
        pool: pool.clone(),
        queue: child.clone(),
    };
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| step(&step_cx))) {
        pool.on_error(PhaseError::from_panic(payload));
    }
    pool.activate();
    let mut errors = pool.completion().await;
    if errors.is_empty() {
        errors = drain_queue(child, options.clone()).await;
    }
    errors
}
