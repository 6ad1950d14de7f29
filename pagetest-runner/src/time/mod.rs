// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod stopwatch;
mod timeout;

pub(crate) use stopwatch::{StopwatchStart, stopwatch};
pub(crate) use timeout::Timeout;
