// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while compiling filter expressions.

use thiserror::Error;

/// An error that occurred while compiling a single filter expression.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilterParseError {
    /// The expression isn't a valid regular expression.
    #[error("invalid regex in filter expression `{expression}`")]
    InvalidRegex {
        /// The expression as written, including any leading `-`.
        expression: String,
        /// The underlying regex error.
        #[source]
        source: Box<regex::Error>,
    },

    /// A `#method` expression with nothing after the `#`.
    #[error("empty method name in filter expression `{expression}`")]
    EmptyMethodName {
        /// The expression as written.
        expression: String,
    },
}

impl FilterParseError {
    pub(crate) fn invalid_regex(expression: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidRegex {
            expression: expression.into(),
            source: Box::new(source),
        }
    }
}
