// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Expression-based filtering of in-page test methods, used by pagetest to
//! decide which `Case#method` pairs run for a given invocation.
//!
//! An expression list is a mix of inclusions and exclusions:
//!
//! - `all` — every test method.
//! - a regular expression, matched against the full `Case#method` id.
//! - `#methodName` — the method of that exact name, across every case.
//! - any of the above prefixed with `-` — an exclusion.
//!
//! If no inclusion is given, inclusion defaults to everything. A method runs
//! if it matches at least one inclusion and no exclusion.

pub mod errors;
mod expression;

pub use expression::{FilterExpression, RunFilter, TestMethodId};
