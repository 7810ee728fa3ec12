//! Classifier rule definition

use crate::predicate::Predicate;
use logtriage_core::{LogLine, Test};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fallback for an unexplained test failure
pub const UNKNOWN: &str = "UNKNOWN";

/// Fallback for an unexplained teardown failure
pub const UNKNOWN_TD: &str = "UNKNOWN-TD";

/// Test failure after the run was tainted
pub const TAINT: &str = "TAINT";

/// Teardown failure after the run was tainted
pub const TAINT_TD: &str = "TAINT-TD";

/// Codes reserved for pseudo-classifiers
pub const PSEUDO_CODES: [&str; 4] = [UNKNOWN, UNKNOWN_TD, TAINT, TAINT_TD];

/// Key selecting the tests a classifier applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestKey {
    /// Test file path as reported by the runner
    pub file: String,

    /// Test function name
    pub name: String,
}

impl TestKey {
    /// Create a new test key
    pub fn new(file: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
        }
    }
}

/// Tests a classifier is evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestSelector {
    /// Every test
    Any,

    /// Only the listed tests
    Tests(Vec<TestKey>),
}

/// A failure classifier
///
/// Predicates are OR-ed: the first one returning a positive count decides
/// the match and supplies the matched lines.
#[derive(Debug, Clone)]
pub struct Classifier {
    code: String,
    message: String,
    selector: TestSelector,
    predicates: Vec<Predicate>,
    taints: bool,
    harmless: bool,
    only_once: bool,
    suppresses: BTreeSet<String>,
}

impl Classifier {
    /// Create a new classifier
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        selector: TestSelector,
        predicates: Vec<Predicate>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            selector,
            predicates,
            taints: false,
            harmless: false,
            only_once: false,
            suppresses: BTreeSet::new(),
        }
    }

    /// Create one of the built-in fallback classifiers
    pub(crate) fn pseudo(code: &str, message: &str) -> Self {
        Self::new(code, message, TestSelector::Any, Vec::new())
    }

    /// Mark the run as tainted when this classifier fires
    pub fn with_taints(mut self, taints: bool) -> Self {
        self.taints = taints;
        self
    }

    /// Do not count this classifier as explaining a failure
    pub fn with_harmless(mut self, harmless: bool) -> Self {
        self.harmless = harmless;
        self
    }

    /// Report at most once per run
    pub fn with_only_once(mut self, only_once: bool) -> Self {
        self.only_once = only_once;
        self
    }

    /// Silence the given classifiers for the rest of the run once matched
    pub fn with_suppresses<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suppresses.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Unique classifier code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Human-readable explanation
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Tests this classifier applies to
    pub fn selector(&self) -> &TestSelector {
        &self.selector
    }

    /// Predicates in evaluation order
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// A match marks the rest of the run as tainted
    pub fn taints(&self) -> bool {
        self.taints
    }

    /// Matches are reported without explaining the failure
    pub fn harmless(&self) -> bool {
        self.harmless
    }

    /// Reported at most once per run
    pub fn only_once(&self) -> bool {
        self.only_once
    }

    /// Codes silenced for the rest of the run once this one matches
    pub fn suppresses(&self) -> &BTreeSet<String> {
        &self.suppresses
    }

    /// Whether this is one of the built-in fallback classifiers
    pub fn is_pseudo(&self) -> bool {
        PSEUDO_CODES.contains(&self.code.as_str())
    }

    /// Evaluate against a test
    ///
    /// Returns the matched lines of the first positive predicate, or `None`.
    pub fn evaluate(&self, test: &Test) -> Option<Vec<LogLine>> {
        self.predicates.iter().find_map(|predicate| {
            let mut matched = Vec::new();
            (predicate.evaluate(test, &mut matched) > 0).then_some(matched)
        })
    }
}
