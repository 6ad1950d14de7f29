// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outstanding-callback tracking for one deferred step.

use crate::{errors::PhaseError, time::Timeout};
use std::{
    cell::RefCell,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    pin::pin,
    rc::Rc,
    time::Duration,
};
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, trace};

/// Options for registering a callback with a [`CallbackPool`].
#[derive(Clone, Debug)]
pub struct CallbackOptions {
    invocations: u32,
    timeout: Option<Duration>,
    description: Option<String>,
}

impl Default for CallbackOptions {
    fn default() -> Self {
        Self {
            invocations: 1,
            timeout: None,
            description: None,
        }
    }
}

impl CallbackOptions {
    /// Creates the default options: a single-use callback with the pool's
    /// default expiry and a synthesized description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the callback to be invoked `n` times before its obligation
    /// is depleted. Values below 1 are treated as 1.
    pub fn invocations(mut self, n: u32) -> Self {
        self.invocations = n.max(1);
        self
    }

    /// Overrides the pool's default expiry delay for this callback.
    pub fn timeout(mut self, delay: Duration) -> Self {
        self.timeout = Some(delay);
        self
    }

    /// Names the callback in timeout diagnostics. Unnamed callbacks get a
    /// `#n` description from the pool's registration counter.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// One registered callback's bookkeeping, shared between the pool (for expiry
// scanning) and the handle (for invocation counting).
#[derive(Debug)]
struct Obligation {
    description: String,
    remaining_uses: u32,
    uses_allowed: u32,
    deadline: Instant,
    delay: Duration,
    // Cleared on depletion or expiry; a disarmed obligation is inert.
    armed: bool,
}

#[derive(Debug)]
struct PoolState {
    step_description: String,
    outstanding: u32,
    errors: Vec<PhaseError>,
    active: bool,
    callback_index: u32,
    default_timeout: Duration,
    obligations: Vec<Rc<RefCell<Obligation>>>,
}

/// Tracks the outstanding callback obligations of one deferred step.
///
/// The pool counts obligations, not invocations: registering a callback adds
/// its allowed-use count to `outstanding`, and depleting it subtracts the
/// same amount. A step completes once the pool is active and the count is
/// zero; completion is observed one scheduler tick later, so a step whose
/// callbacks all fire synchronously still completes asynchronously.
///
/// Any recorded error zeroes the count, aborting the step immediately.
#[derive(Clone)]
pub struct CallbackPool {
    state: Rc<RefCell<PoolState>>,
    notify: Rc<Notify>,
}

impl CallbackPool {
    /// Creates an inactive pool for the step named `step_description`.
    pub fn new(step_description: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            state: Rc::new(RefCell::new(PoolState {
                step_description: step_description.into(),
                outstanding: 0,
                errors: Vec::new(),
                active: false,
                callback_index: 0,
                default_timeout,
                obligations: Vec::new(),
            })),
            notify: Rc::new(Notify::new()),
        }
    }

    /// Registers a single-use callback with default options.
    pub fn add_callback(&self, f: impl FnMut() + 'static) -> CallbackHandle {
        self.add_callback_with(f, CallbackOptions::default())
    }

    /// Registers a callback, adding its allowed-use count to the pool.
    ///
    /// The returned handle wraps `f`; the obligation is only discharged by
    /// invoking the handle the required number of times before it expires.
    pub fn add_callback_with(
        &self,
        f: impl FnMut() + 'static,
        options: CallbackOptions,
    ) -> CallbackHandle {
        let obligation = {
            let mut state = self.state.borrow_mut();
            state.callback_index += 1;
            let description = options
                .description
                .unwrap_or_else(|| format!("#{}", state.callback_index));
            let delay = options.timeout.unwrap_or(state.default_timeout);
            let uses = options.invocations;
            state.outstanding += uses;
            trace!(
                step = %state.step_description,
                callback = %description,
                uses,
                outstanding = state.outstanding,
                "callback registered",
            );
            let obligation = Rc::new(RefCell::new(Obligation {
                description,
                remaining_uses: uses,
                uses_allowed: uses,
                deadline: Instant::now() + delay,
                delay,
                armed: true,
            }));
            state.obligations.push(Rc::clone(&obligation));
            obligation
        };
        self.notify.notify_one();
        CallbackHandle {
            pool: self.clone(),
            obligation,
            wrapped: Rc::new(RefCell::new(Box::new(f))),
        }
    }

    /// Registers a callback with an empty body, useful when only the
    /// obligation matters.
    pub fn noop(&self) -> CallbackHandle {
        self.add_callback(|| {})
    }

    /// Like [`noop`](Self::noop), with explicit options.
    pub fn noop_with(&self, options: CallbackOptions) -> CallbackHandle {
        self.add_callback_with(|| {}, options)
    }

    /// Creates an error-reporting handle. Invoking it records an error on
    /// the pool; it carries no obligation.
    pub fn add_errback(&self, message: impl Into<String>) -> ErrbackHandle {
        ErrbackHandle {
            pool: self.clone(),
            message: message.into(),
        }
    }

    /// Records an error and aborts the step by zeroing the outstanding
    /// count.
    pub fn on_error(&self, error: PhaseError) {
        {
            let mut state = self.state.borrow_mut();
            debug!(step = %state.step_description, %error, "step error; aborting");
            state.errors.push(error);
            state.outstanding = 0;
        }
        self.notify.notify_one();
    }

    /// Manually discharges `n` obligations, e.g. when a registered callback
    /// turns out not to be needed. No-op once the count has reached zero.
    pub fn remove(&self, reason: &str, n: u32) {
        {
            let mut state = self.state.borrow_mut();
            if state.outstanding == 0 {
                return;
            }
            state.outstanding = state.outstanding.saturating_sub(n.max(1));
            trace!(
                step = %state.step_description,
                reason,
                outstanding = state.outstanding,
                "obligations removed",
            );
        }
        self.notify.notify_one();
    }

    /// Marks registration as finished. A pool never completes before
    /// activation, so callbacks registered while the step body runs cannot
    /// race a transient zero count.
    pub fn activate(&self) {
        self.state.borrow_mut().active = true;
        self.notify.notify_one();
    }

    /// The current outstanding-obligation count.
    pub fn outstanding(&self) -> u32 {
        self.state.borrow().outstanding
    }

    pub(crate) fn step_description(&self) -> String {
        self.state.borrow().step_description.clone()
    }

    /// Resolves once the pool is active and drained, yielding the errors
    /// recorded during the step. Completion is observed strictly after the
    /// tick that caused it, even for a pool with no callbacks.
    pub async fn completion(self) -> Vec<PhaseError> {
        let mut timeout = pin!(Timeout::new());
        loop {
            {
                let state = self.state.borrow();
                if state.active && state.outstanding == 0 {
                    break;
                }
            }
            match self.earliest_deadline() {
                Some(deadline) => timeout.as_mut().arm(deadline),
                None => timeout.as_mut().disarm(),
            }
            let notified = self.notify.notified();
            tokio::select! {
                () = timeout.as_mut() => self.expire_due(),
                () = notified => {}
            }
        }
        tokio::task::yield_now().await;
        let mut state = self.state.borrow_mut();
        trace!(step = %state.step_description, errors = state.errors.len(), "step complete");
        std::mem::take(&mut state.errors)
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        let state = self.state.borrow();
        state
            .obligations
            .iter()
            .filter_map(|obligation| {
                let obligation = obligation.borrow();
                obligation.armed.then_some(obligation.deadline)
            })
            .min()
    }

    // Expires every armed obligation whose deadline has passed, recording
    // one timeout error each.
    fn expire_due(&self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        {
            let state = self.state.borrow();
            for obligation in &state.obligations {
                let mut obligation = obligation.borrow_mut();
                if obligation.armed && obligation.deadline <= now {
                    obligation.armed = false;
                    obligation.remaining_uses = 0;
                    expired.push((
                        obligation.description.clone(),
                        obligation.delay.as_millis() as u64,
                    ));
                }
            }
        }
        for (callback, delay_ms) in expired {
            let step = self.step_description();
            self.on_error(PhaseError::CallbackTimeout {
                callback,
                step,
                delay_ms,
            });
        }
    }
}

impl fmt::Debug for CallbackPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("CallbackPool")
            .field("step_description", &state.step_description)
            .field("outstanding", &state.outstanding)
            .field("active", &state.active)
            .field("errors", &state.errors)
            .finish()
    }
}

/// A registered callback. Cloning shares the underlying obligation.
#[derive(Clone)]
pub struct CallbackHandle {
    pool: CallbackPool,
    obligation: Rc<RefCell<Obligation>>,
    wrapped: Rc<RefCell<Box<dyn FnMut()>>>,
}

impl CallbackHandle {
    /// Invokes the wrapped callback, counting one use.
    ///
    /// A panic in the callback is recorded as a step error but still counts
    /// as a use. Invoking a depleted or expired callback is ignored.
    pub fn invoke(&self) {
        {
            let obligation = self.obligation.borrow();
            if !obligation.armed {
                trace!(
                    callback = %obligation.description,
                    "invocation of a depleted callback ignored",
                );
                return;
            }
        }
        // No pool or obligation borrows may be held here: the callback may
        // re-enter the pool to register more callbacks or record errors.
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut wrapped = self.wrapped.borrow_mut();
            (**wrapped)()
        }));
        if let Err(payload) = result {
            self.pool.on_error(PhaseError::from_panic(payload));
        }
        let depleted_uses = {
            let mut obligation = self.obligation.borrow_mut();
            obligation.remaining_uses = obligation.remaining_uses.saturating_sub(1);
            if obligation.remaining_uses == 0 {
                obligation.armed = false;
                Some(obligation.uses_allowed)
            } else {
                None
            }
        };
        if let Some(uses) = depleted_uses {
            self.pool.remove("callback depleted", uses);
        }
    }

    /// The callback's description, as used in timeout diagnostics.
    pub fn description(&self) -> String {
        self.obligation.borrow().description.clone()
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let obligation = self.obligation.borrow();
        f.debug_struct("CallbackHandle")
            .field("description", &obligation.description)
            .field("remaining_uses", &obligation.remaining_uses)
            .field("armed", &obligation.armed)
            .finish()
    }
}

/// An error-reporting handle for failure paths of an asynchronous operation.
#[derive(Clone)]
pub struct ErrbackHandle {
    pool: CallbackPool,
    message: String,
}

impl ErrbackHandle {
    /// Records an errback error with no detail.
    pub fn invoke(&self) {
        self.invoke_with("");
    }

    /// Records an errback error carrying `detail`, e.g. the arguments the
    /// failure path was called with.
    pub fn invoke_with(&self, detail: impl fmt::Display) {
        self.pool.on_error(PhaseError::Errback {
            message: self.message.clone(),
            detail: detail.to_string(),
        });
    }
}

impl fmt::Debug for ErrbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrbackHandle")
            .field("message", &self.message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CALLBACK_TIMEOUT;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn empty_pool_completes_once_active() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        pool.activate();
        assert_eq!(pool.clone().completion().await, []);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_pool_never_completes() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        let completion = pool.clone().completion();
        tokio::pin!(completion);
        tokio::select! {
            _ = &mut completion => panic!("completed without activation"),
            () = tokio::time::sleep(Duration::from_millis(5)) => {}
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_only_after_every_callback() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        let fired = Rc::new(Cell::new(0));
        let first = {
            let fired = Rc::clone(&fired);
            pool.add_callback(move || fired.set(fired.get() + 1))
        };
        let second = {
            let fired = Rc::clone(&fired);
            pool.add_callback(move || fired.set(fired.get() + 1))
        };
        pool.activate();
        first.invoke();

        let completion = pool.clone().completion();
        tokio::pin!(completion);
        tokio::select! {
            _ = &mut completion => panic!("completed with an obligation outstanding"),
            () = tokio::time::sleep(Duration::from_millis(1)) => {}
        }

        second.invoke();
        assert_eq!(completion.await, []);
        assert_eq!(fired.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn multi_use_callback_counts_as_one_block_of_obligations() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        let handle = pool.add_callback_with(|| {}, CallbackOptions::new().invocations(3));
        pool.activate();
        assert_eq!(pool.outstanding(), 3);

        handle.invoke();
        handle.invoke();
        // The count only drops once the obligation is fully depleted.
        assert_eq!(pool.outstanding(), 3);

        handle.invoke();
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.clone().completion().await, []);

        // Extra invocations of a depleted callback are ignored.
        handle.invoke();
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_invoked_callback_expires() {
        let pool = CallbackPool::new("step two", DEFAULT_CALLBACK_TIMEOUT);
        let _handle = pool.add_callback_with(
            || {},
            CallbackOptions::new()
                .timeout(Duration::from_millis(10))
                .description("fetch reply"),
        );
        pool.activate();
        let start = Instant::now();
        let errors = pool.clone().completion().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(
            errors,
            [PhaseError::CallbackTimeout {
                callback: "fetch reply".to_owned(),
                step: "step two".to_owned(),
                delay_ms: 10,
            }]
        );
        assert_eq!(
            errors[0].to_string(),
            "Callback 'fetch reply' expired after 10 ms during test step 'step two'"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unnamed_callbacks_get_indexed_descriptions() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        let first = pool.noop();
        let named = pool.noop_with(CallbackOptions::new().description("named"));
        let third = pool.noop();
        assert_eq!(first.description(), "#1");
        assert_eq!(named.description(), "named");
        // Named callbacks still advance the registration counter.
        assert_eq!(third.description(), "#3");
    }

    #[tokio::test(start_paused = true)]
    async fn errback_aborts_the_step() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        let _never_invoked = pool.noop();
        let errback = pool.add_errback("load failed");
        pool.activate();
        errback.invoke_with("503");

        let errors = pool.clone().completion().await;
        assert_eq!(
            errors,
            [PhaseError::Errback {
                message: "load failed".to_owned(),
                detail: "503".to_owned(),
            }]
        );
        assert_eq!(errors[0].to_string(), "Errback load failed called with: 503");
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_records_an_error_and_counts_the_use() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        let handle = pool.add_callback(|| panic!("callback blew up"));
        pool.activate();
        handle.invoke();

        let errors = pool.clone().completion().await;
        assert_eq!(
            errors,
            [PhaseError::Unexpected {
                message: "callback blew up".to_owned(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn remove_discharges_obligations() {
        let pool = CallbackPool::new("#1", DEFAULT_CALLBACK_TIMEOUT);
        let _handle = pool.noop();
        pool.remove("no longer needed", 1);
        pool.activate();
        assert_eq!(pool.clone().completion().await, []);

        // Removal past zero is a no-op.
        pool.remove("again", 5);
        assert_eq!(pool.outstanding(), 0);
    }
}
