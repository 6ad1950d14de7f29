// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::FilterParseError;
use regex::Regex;
use smol_str::SmolStr;
use std::fmt;

/// The derived id of one test method: `"<CaseName>#<MethodName>"`.
///
/// Ids are only ever used for filter matching; they are never persisted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TestMethodId<'a> {
    /// The dotted-path case name, e.g. `"apps.AppsTest"`.
    pub case_name: &'a str,
    /// The bare method name, e.g. `"testLoad"`.
    pub method_name: &'a str,
}

impl TestMethodId<'_> {
    /// Returns the full `Case#method` form.
    pub fn full(&self) -> String {
        format!("{}#{}", self.case_name, self.method_name)
    }
}

impl fmt::Display for TestMethodId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.case_name, self.method_name)
    }
}

/// A single compiled filter expression.
#[derive(Clone, Debug)]
pub enum FilterExpression {
    /// Matches every test method.
    All,
    /// Matches the method of this exact name in every case (`#methodName`).
    Method(SmolStr),
    /// Matches ids containing this regular expression.
    Pattern(Regex),
}

impl FilterExpression {
    /// Compiles an inclusion expression (no leading `-`).
    ///
    /// `"all"` means match-everything; `"#name"` selects that method across
    /// every case; anything else is a regular expression tested against the
    /// full id.
    pub fn parse_inclusion(expression: &str) -> Result<Self, FilterParseError> {
        if expression == "all" {
            return Ok(Self::All);
        }
        Self::parse_common(expression)
    }

    /// Compiles the body of an exclusion expression (leading `-` already
    /// stripped).
    ///
    /// Unlike inclusions, a literal `"all"` is an ordinary regular expression
    /// here: the match-everything default only applies to inclusions.
    pub fn parse_exclusion(expression: &str) -> Result<Self, FilterParseError> {
        Self::parse_common(expression)
    }

    fn parse_common(expression: &str) -> Result<Self, FilterParseError> {
        if let Some(method) = expression.strip_prefix('#') {
            if method.is_empty() {
                return Err(FilterParseError::EmptyMethodName {
                    expression: expression.to_owned(),
                });
            }
            return Ok(Self::Method(method.into()));
        }
        let regex = Regex::new(expression)
            .map_err(|err| FilterParseError::invalid_regex(expression, err))?;
        Ok(Self::Pattern(regex))
    }

    /// Returns true if this expression matches the given method id.
    pub fn is_match(&self, id: &TestMethodId<'_>) -> bool {
        match self {
            Self::All => true,
            Self::Method(name) => id.method_name == name.as_str(),
            Self::Pattern(regex) => regex.is_match(&id.full()),
        }
    }
}

#[cfg(test)]
impl PartialEq for FilterExpression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::All, Self::All) => true,
            (Self::Method(m1), Self::Method(m2)) => m1 == m2,
            (Self::Pattern(r1), Self::Pattern(r2)) => r1.as_str() == r2.as_str(),
            _ => false,
        }
    }
}

/// A compiled list of filter expressions.
///
/// Expressions are partitioned into inclusions and exclusions at compile
/// time. A method id matches if at least one inclusion matches it and no
/// exclusion does; with no inclusions given, inclusion defaults to
/// everything.
#[derive(Clone, Debug)]
pub struct RunFilter {
    includes: Vec<FilterExpression>,
    excludes: Vec<FilterExpression>,
}

impl RunFilter {
    /// Compiles a list of expression strings.
    pub fn compile<S: AsRef<str>>(expressions: &[S]) -> Result<Self, FilterParseError> {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        for expression in expressions {
            let expression = expression.as_ref();
            match expression.strip_prefix('-') {
                Some(body) => excludes.push(FilterExpression::parse_exclusion(body)?),
                None => includes.push(FilterExpression::parse_inclusion(expression)?),
            }
        }
        if includes.is_empty() {
            includes.push(FilterExpression::All);
        }
        Ok(Self { includes, excludes })
    }

    /// Returns a filter that matches every test method.
    pub fn match_all() -> Self {
        Self {
            includes: vec![FilterExpression::All],
            excludes: Vec::new(),
        }
    }

    /// Returns true if the given method id is selected by this filter.
    ///
    /// Exclusion always wins over inclusion for the same id.
    pub fn matches(&self, id: &TestMethodId<'_>) -> bool {
        if self.excludes.iter().any(|expr| expr.is_match(id)) {
            return false;
        }
        self.includes.iter().any(|expr| expr.is_match(id))
    }
}
