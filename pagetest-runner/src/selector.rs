// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns filter expressions plus discovered test cases into run
//! configurations.

use crate::list::{RunConfiguration, TestCaseDescriptor};
use pagetest_filtering::{RunFilter, TestMethodId, errors::FilterParseError};
use tracing::debug;

/// Selects the methods to run from `descriptors` according to filter
/// `expressions`, preserving descriptor and method declaration order.
///
/// A case whose methods are all filtered out contributes no configuration at
/// all. An empty expression list selects everything.
pub fn select_configurations<S: AsRef<str>>(
    descriptors: &[TestCaseDescriptor],
    expressions: &[S],
) -> Result<Vec<RunConfiguration>, FilterParseError> {
    let filter = RunFilter::compile(expressions)?;
    Ok(apply_filter(descriptors, &filter))
}

/// Like [`select_configurations`], with an already-compiled filter.
pub fn apply_filter(
    descriptors: &[TestCaseDescriptor],
    filter: &RunFilter,
) -> Vec<RunConfiguration> {
    let mut configurations = Vec::new();
    for descriptor in descriptors {
        let tests: Vec<_> = descriptor
            .test_method_names()
            .filter(|method_name| {
                filter.matches(&TestMethodId {
                    case_name: descriptor.case_name(),
                    method_name,
                })
            })
            .cloned()
            .collect();
        if tests.is_empty() {
            debug!(case = descriptor.case_name(), "no methods selected");
            continue;
        }
        debug!(
            case = descriptor.case_name(),
            selected = tests.len(),
            "case selected"
        );
        configurations.push(RunConfiguration::new(descriptor.clone(), tests));
    }
    configurations
}
