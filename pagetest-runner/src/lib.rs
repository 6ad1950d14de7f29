// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core execution engine for pagetest: given a set of discovered test-case
//! descriptors, decide which methods run, execute each through its
//! setUp/method/tearDown lifecycle, and deliver one structured outcome per
//! executed method, in order.
//!
//! The engine is single-threaded and cooperative: all coordination happens
//! through tokio timers and task yields on a current-thread runtime, never
//! through parallel threads. Engine handles are deliberately `!Send`; test
//! code that needs to fire a callback later does so from a
//! [`tokio::task::spawn_local`] task or a timer on the same local set.

pub mod config;
pub mod context;
pub mod errors;
pub mod list;
pub mod phase;
pub mod reporter;
pub mod runner;
pub mod selector;
mod time;
