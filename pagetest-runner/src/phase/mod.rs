// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous phase execution.
//!
//! One test phase (setUp, the method, tearDown) is executed as a [`stage`],
//! which drains a [`queue`] of deferred steps; each step's outstanding
//! callback obligations are tracked by a [`pool`]. Steps within a phase run
//! strictly sequentially and the first error abandons the rest of the phase;
//! the phases themselves are chained by the runner regardless of failure.

pub mod pool;
pub mod queue;
pub(crate) mod stage;

pub use pool::{CallbackHandle, CallbackOptions, CallbackPool, ErrbackHandle};
pub use queue::{StageQueue, StepContext};
