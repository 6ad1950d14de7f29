// Copyright (c) The pagetest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test-case descriptors, templates and run configurations.
//!
//! A [`TestCaseTemplate`] is a factory producing one fresh test-case
//! instance per executed method. Instances come in two flavors matching the
//! two runners: [`SyncTestCase`] phases are plain functions,
//! [`AsyncTestCase`] phases receive a [`StageQueue`] through which they defer
//! asynchronous steps.

use crate::{context::TestContext, phase::StageQueue};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::{fmt, rc::Rc};

/// A synchronous phase body: setUp, a test method, or tearDown.
pub type SyncPhase = Rc<dyn Fn(&TestContext)>;

/// An asynchronous phase body.
///
/// Receives the test's context, the queue on which to defer steps, and the
/// phase argument from the run configuration, if any.
pub type AsyncPhase = Rc<dyn Fn(&TestContext, &StageQueue, Option<&Value>)>;

/// The execution type of a test case.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCaseKind {
    /// Ordinary, non-asynchronous phases; handled by the synchronous runner.
    Default,
    /// Phases that may complete asynchronously; handled by the async runner.
    Async,
}

impl fmt::Display for TestCaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Async => write!(f, "async"),
        }
    }
}

/// One synchronous test-case instance.
#[derive(Clone, Default)]
pub struct SyncTestCase {
    set_up: Option<SyncPhase>,
    tear_down: Option<SyncPhase>,
    methods: IndexMap<SmolStr, SyncPhase>,
}

impl SyncTestCase {
    /// Creates an empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the setUp phase.
    pub fn set_up(mut self, f: impl Fn(&TestContext) + 'static) -> Self {
        self.set_up = Some(Rc::new(f));
        self
    }

    /// Sets the tearDown phase.
    pub fn tear_down(mut self, f: impl Fn(&TestContext) + 'static) -> Self {
        self.tear_down = Some(Rc::new(f));
        self
    }

    /// Adds a named method. Declaration order is preserved; only names
    /// starting with `"test"` are selectable.
    pub fn method(mut self, name: impl Into<SmolStr>, f: impl Fn(&TestContext) + 'static) -> Self {
        self.methods.insert(name.into(), Rc::new(f));
        self
    }

    pub(crate) fn set_up_phase(&self) -> Option<&SyncPhase> {
        self.set_up.as_ref()
    }

    pub(crate) fn tear_down_phase(&self) -> Option<&SyncPhase> {
        self.tear_down.as_ref()
    }

    pub(crate) fn method_phase(&self, name: &str) -> Option<&SyncPhase> {
        self.methods.get(name)
    }

    fn method_names(&self) -> Vec<SmolStr> {
        self.methods.keys().cloned().collect()
    }
}

impl fmt::Debug for SyncTestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTestCase")
            .field("set_up", &self.set_up.is_some())
            .field("tear_down", &self.tear_down.is_some())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One asynchronous test-case instance.
#[derive(Clone, Default)]
pub struct AsyncTestCase {
    set_up: Option<AsyncPhase>,
    tear_down: Option<AsyncPhase>,
    methods: IndexMap<SmolStr, AsyncPhase>,
}

impl AsyncTestCase {
    /// Creates an empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the setUp phase.
    pub fn set_up(mut self, f: impl Fn(&TestContext, &StageQueue, Option<&Value>) + 'static) -> Self {
        self.set_up = Some(Rc::new(f));
        self
    }

    /// Sets the tearDown phase.
    pub fn tear_down(
        mut self,
        f: impl Fn(&TestContext, &StageQueue, Option<&Value>) + 'static,
    ) -> Self {
        self.tear_down = Some(Rc::new(f));
        self
    }

    /// Adds a named method. Declaration order is preserved; only names
    /// starting with `"test"` are selectable.
    pub fn method(
        mut self,
        name: impl Into<SmolStr>,
        f: impl Fn(&TestContext, &StageQueue, Option<&Value>) + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Rc::new(f));
        self
    }

    pub(crate) fn set_up_phase(&self) -> Option<&AsyncPhase> {
        self.set_up.as_ref()
    }

    pub(crate) fn tear_down_phase(&self) -> Option<&AsyncPhase> {
        self.tear_down.as_ref()
    }

    pub(crate) fn method_phase(&self, name: &str) -> Option<&AsyncPhase> {
        self.methods.get(name)
    }

    fn method_names(&self) -> Vec<SmolStr> {
        self.methods.keys().cloned().collect()
    }
}

impl fmt::Debug for AsyncTestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTestCase")
            .field("set_up", &self.set_up.is_some())
            .field("tear_down", &self.tear_down.is_some())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) enum TemplateFactory {
    Sync(Rc<dyn Fn() -> SyncTestCase>),
    Async(Rc<dyn Fn() -> AsyncTestCase>),
}

/// A constructible factory producing one test-case instance per executed
/// method.
///
/// The factory is invoked once at template-creation time to enumerate method
/// names (the enumeration order is stable), and then once per executed
/// method to obtain a fresh instance.
#[derive(Debug)]
pub struct TestCaseTemplate {
    kind: TestCaseKind,
    method_names: Vec<SmolStr>,
    factory: DebugIgnore<TemplateFactory>,
}

impl TestCaseTemplate {
    /// Creates a template for a synchronous test case.
    pub fn new_sync(factory: impl Fn() -> SyncTestCase + 'static) -> Self {
        let factory = Rc::new(factory);
        let method_names = factory().method_names();
        Self {
            kind: TestCaseKind::Default,
            method_names,
            factory: DebugIgnore(TemplateFactory::Sync(factory)),
        }
    }

    /// Creates a template for an asynchronous test case.
    pub fn new_async(factory: impl Fn() -> AsyncTestCase + 'static) -> Self {
        let factory = Rc::new(factory);
        let method_names = factory().method_names();
        Self {
            kind: TestCaseKind::Async,
            method_names,
            factory: DebugIgnore(TemplateFactory::Async(factory)),
        }
    }

    /// The execution type of cases produced by this template.
    pub fn kind(&self) -> TestCaseKind {
        self.kind
    }

    /// Every method name on the template, in declaration order.
    pub fn method_names(&self) -> &[SmolStr] {
        &self.method_names
    }

    pub(crate) fn factory(&self) -> &TemplateFactory {
        &self.factory.0
    }
}

/// A discovered test case: a dotted-path name plus the template producing
/// its instances.
///
/// Equality is by case name only.
#[derive(Clone, Debug)]
pub struct TestCaseDescriptor {
    case_name: SmolStr,
    template: Rc<TestCaseTemplate>,
}

impl TestCaseDescriptor {
    /// Creates a descriptor.
    pub fn new(case_name: impl Into<SmolStr>, template: TestCaseTemplate) -> Self {
        Self {
            case_name: case_name.into(),
            template: Rc::new(template),
        }
    }

    /// The case name, e.g. `"apps.AppsTest"`.
    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    /// The execution type of this case.
    pub fn kind(&self) -> TestCaseKind {
        self.template.kind()
    }

    /// The selectable method names: every template method whose name starts
    /// with `"test"`, in declaration order.
    pub fn test_method_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.template
            .method_names()
            .iter()
            .filter(|name| name.starts_with("test"))
    }

    pub(crate) fn template(&self) -> &TestCaseTemplate {
        &self.template
    }
}

impl PartialEq for TestCaseDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.case_name == other.case_name
    }
}

impl Eq for TestCaseDescriptor {}

/// The resolved set of methods to execute for one test case in one run.
///
/// Created by the selector; consumed exactly once by a runner.
#[derive(Clone, Debug)]
pub struct RunConfiguration {
    descriptor: TestCaseDescriptor,
    tests: Vec<SmolStr>,
    args: Option<serde_json::Map<String, Value>>,
}

impl RunConfiguration {
    /// Creates a configuration. `tests` must be non-empty; the selector
    /// never emits an empty configuration.
    pub fn new(descriptor: TestCaseDescriptor, tests: Vec<SmolStr>) -> Self {
        Self {
            descriptor,
            tests,
            args: None,
        }
    }

    /// Attaches a per-method argument map: the value keyed by a method name
    /// is passed to that method's phase body.
    pub fn with_args(mut self, args: serde_json::Map<String, Value>) -> Self {
        self.args = Some(args);
        self
    }

    /// The test case this configuration runs.
    pub fn descriptor(&self) -> &TestCaseDescriptor {
        &self.descriptor
    }

    /// The ordered method names to run.
    pub fn tests(&self) -> &[SmolStr] {
        &self.tests
    }

    /// The argument for one method, if an argument map was attached.
    pub fn argument_for(&self, method_name: &str) -> Option<&Value> {
        self.args.as_ref()?.get(method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_order_is_declaration_order() {
        let template = TestCaseTemplate::new_sync(|| {
            SyncTestCase::new()
                .method("testZeta", |_| {})
                .method("testAlpha", |_| {})
                .method("helper", |_| {})
                .method("testMid", |_| {})
        });
        let descriptor = TestCaseDescriptor::new("order.OrderTest", template);
        let names: Vec<_> = descriptor.test_method_names().collect();
        assert_eq!(names, ["testZeta", "testAlpha", "testMid"]);
    }

    #[test]
    fn descriptor_equality_is_by_name() {
        let a = TestCaseDescriptor::new(
            "apps.AppsTest",
            TestCaseTemplate::new_sync(|| SyncTestCase::new().method("testA", |_| {})),
        );
        let b = TestCaseDescriptor::new(
            "apps.AppsTest",
            TestCaseTemplate::new_async(|| AsyncTestCase::new().method("testB", |_, _, _| {})),
        );
        assert_eq!(a, b);
        assert_ne!(
            a,
            TestCaseDescriptor::new(
                "docs.DocsTest",
                TestCaseTemplate::new_sync(|| SyncTestCase::new().method("testA", |_| {})),
            )
        );
    }

    #[test]
    fn kind_display() {
        assert_eq!(TestCaseKind::Default.to_string(), "default");
        assert_eq!(TestCaseKind::Async.to_string(), "async");
    }

    #[test]
    fn argument_lookup() {
        let descriptor = TestCaseDescriptor::new(
            "args.ArgsTest",
            TestCaseTemplate::new_async(|| AsyncTestCase::new().method("testA", |_, _, _| {})),
        );
        let mut args = serde_json::Map::new();
        args.insert("testA".to_owned(), Value::from(7));
        let config =
            RunConfiguration::new(descriptor, vec!["testA".into()]).with_args(args);
        assert_eq!(config.argument_for("testA"), Some(&Value::from(7)));
        assert_eq!(config.argument_for("testB"), None);
    }
}
